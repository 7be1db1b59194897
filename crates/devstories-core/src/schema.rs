//! Frontmatter schemas for stories and epics.
//!
//! Both schemas draw their field types from [`defs`], the shared definitions
//! (id shape, date shape, item types). The validator walks a schema; it does
//! not hardcode field names beyond the vocabulary checks.

use std::sync::LazyLock;

use regex::Regex;

use crate::entity::{EntityKind, INBOX_EPIC_ID};

static ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]+-\d+$").expect("id pattern is valid"));

static DATE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("date pattern is valid"));

/// Which id shape a field expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdShape {
    /// `PREFIX-NUMBER`
    Item,
    /// `PREFIX-NUMBER` or the inbox sentinel
    Epic,
}

impl IdShape {
    pub fn matches(&self, value: &str) -> bool {
        match self {
            IdShape::Item => ID_PATTERN.is_match(value),
            IdShape::Epic => value == INBOX_EPIC_ID || ID_PATTERN.is_match(value),
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            IdShape::Item => "PREFIX-NUMBER (e.g. DS-001)",
            IdShape::Epic => "PREFIX-NUMBER (e.g. EPIC-001) or EPIC-INBOX",
        }
    }
}

/// The type a frontmatter value must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Free text
    Text,
    /// Whole number
    Integer,
    /// `YYYY-MM-DD`
    Date,
    /// A single id
    Id(IdShape),
    /// One of a closed set of strings
    Enum(&'static [&'static str]),
    /// A list of ids
    IdList(IdShape),
}

/// Shared definitions used by both schemas.
pub mod defs {
    use super::{FieldType, IdShape};

    pub const ITEM_TYPES: &[&str] = &["feature", "bug", "task", "chore"];

    pub const ITEM_ID: FieldType = FieldType::Id(IdShape::Item);
    pub const EPIC_ID: FieldType = FieldType::Id(IdShape::Epic);
    pub const DATE: FieldType = FieldType::Date;
    pub const TEXT: FieldType = FieldType::Text;
    pub const PRIORITY: FieldType = FieldType::Integer;
    pub const ITEM_TYPE: FieldType = FieldType::Enum(ITEM_TYPES);
    pub const DEPENDENCIES: FieldType = FieldType::IdList(IdShape::Item);
}

/// Whether `value` is a `YYYY-MM-DD` date.
pub fn is_date(value: &str) -> bool {
    DATE_PATTERN.is_match(value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRule {
    pub name: &'static str,
    pub ty: FieldType,
    pub required: bool,
}

const fn required(name: &'static str, ty: FieldType) -> FieldRule {
    FieldRule {
        name,
        ty,
        required: true,
    }
}

const fn optional(name: &'static str, ty: FieldType) -> FieldRule {
    FieldRule {
        name,
        ty,
        required: false,
    }
}

/// Field rules for one document kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySchema {
    pub kind: EntityKind,
    pub fields: Vec<FieldRule>,
    /// Whether keys not listed in `fields` are allowed
    pub allow_extra: bool,
}

impl EntitySchema {
    pub fn rule(&self, name: &str) -> Option<&FieldRule> {
        self.fields.iter().find(|rule| rule.name == name)
    }

    pub fn required(&self) -> impl Iterator<Item = &FieldRule> {
        self.fields.iter().filter(|rule| rule.required)
    }

    pub fn work_item() -> Self {
        Self {
            kind: EntityKind::WorkItem,
            fields: vec![
                required("id", defs::ITEM_ID),
                required("title", defs::TEXT),
                required("type", defs::ITEM_TYPE),
                required("epic", defs::EPIC_ID),
                required("status", defs::TEXT),
                optional("sprint", defs::TEXT),
                required("size", defs::TEXT),
                optional("priority", defs::PRIORITY),
                optional("assignee", defs::TEXT),
                optional("dependencies", defs::DEPENDENCIES),
                required("created", defs::DATE),
                optional("updated", defs::DATE),
            ],
            allow_extra: false,
        }
    }

    pub fn grouping() -> Self {
        Self {
            kind: EntityKind::Grouping,
            fields: vec![
                required("id", defs::EPIC_ID),
                required("title", defs::TEXT),
                required("status", defs::TEXT),
                optional("sprint", defs::TEXT),
                optional("priority", defs::PRIORITY),
                required("created", defs::DATE),
                optional("updated", defs::DATE),
            ],
            allow_extra: false,
        }
    }
}

/// The schema source handed to the validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schemas {
    pub work_item: EntitySchema,
    pub grouping: EntitySchema,
}

impl Schemas {
    pub fn builtin() -> Self {
        Self {
            work_item: EntitySchema::work_item(),
            grouping: EntitySchema::grouping(),
        }
    }

    pub fn for_kind(&self, kind: EntityKind) -> &EntitySchema {
        match kind {
            EntityKind::WorkItem => &self.work_item,
            EntityKind::Grouping => &self.grouping,
        }
    }
}

impl Default for Schemas {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{GROUPING_REQUIRED, WORK_ITEM_REQUIRED};

    #[test]
    fn id_shapes() {
        assert!(IdShape::Item.matches("DS-001"));
        assert!(!IdShape::Item.matches("ds-001"));
        assert!(!IdShape::Item.matches("DS-1a"));
        assert!(!IdShape::Item.matches("EPIC-INBOX"));
        assert!(IdShape::Epic.matches("EPIC-INBOX"));
        assert!(IdShape::Epic.matches("EPIC-0007"));
    }

    #[test]
    fn date_shape_is_pattern_only() {
        assert!(is_date("2025-01-15"));
        assert!(is_date("2025-13-45"));
        assert!(!is_date("2025-1-15"));
        assert!(!is_date("15/01/2025"));
    }

    #[test]
    fn schemas_agree_with_parser_requirements() {
        let schemas = Schemas::builtin();
        let story: Vec<_> = schemas.work_item.required().map(|r| r.name).collect();
        let epic: Vec<_> = schemas.grouping.required().map(|r| r.name).collect();
        assert_eq!(story, WORK_ITEM_REQUIRED);
        assert_eq!(epic, GROUPING_REQUIRED);
    }
}
