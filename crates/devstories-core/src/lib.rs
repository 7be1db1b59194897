//! devstories-core - documents, settings and validation for devstories
//!
//! A devstories workspace keeps one markdown file per story and per epic.
//! Each file starts with a YAML frontmatter block:
//!
//! ```markdown
//! ---
//! id: DS-001
//! title: Login page
//! type: feature
//! epic: EPIC-001
//! status: todo
//! size: M
//! created: 2025-01-15
//! ---
//!
//! Free-form body. Links look like [[DS-002]].
//! ```
//!
//! This crate is pure: it turns text into entities ([`parse`]), settings text
//! into a [`Settings`] snapshot ([`parse_settings`], [`merge_with_defaults`]),
//! and text into [`Diagnostic`]s ([`validate_frontmatter`],
//! [`validate_cross_file`]). File watching and indexing live in the
//! `devstories` crate.
//!
//! ```
//! use devstories_core::{EntityKind, Schemas, Settings, validate_frontmatter};
//!
//! let text = "---\nid: DS-001\ntitle: Login\ntype: feature\nepic: EPIC-INBOX\nstatus: blocked\nsize: M\ncreated: 2025-01-15\n---\n";
//! let diagnostics = validate_frontmatter(text, EntityKind::WorkItem, &Settings::default(), &Schemas::builtin());
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].field.as_deref(), Some("status"));
//! ```

mod diagnostic;
mod entity;
mod error;
pub mod frontmatter;
mod parser;
pub mod refs;
pub mod schema;
mod settings;
pub mod sort;
mod validate;

pub use diagnostic::{Diagnostic, Severity};
pub use entity::{
    CalendarDate, DATE_FORMAT, DEFAULT_PRIORITY, Entity, EntityKind, Grouping, INBOX_EPIC_ID,
    ItemType, WorkItem,
};
pub use error::{SettingsParseError, StructuralError};
pub use parser::{GROUPING_REQUIRED, WORK_ITEM_REQUIRED, parse, parse_file, parse_grouping, parse_work_item};
pub use refs::{Reference, find_references, reference_at};
pub use schema::Schemas;
pub use settings::{
    ActiveHours, IdPrefixSection, PartialSettings, ReminderSlot, Reminders, Settings,
    SprintSection, StatusDef, Template, UnlistedSprints, merge_with_defaults, parse_settings,
    parse_template,
};
pub use validate::{
    KnownIds, validate, validate_cross_file, validate_duplicate_id, validate_frontmatter,
};
