//! Frontmatter validation.
//!
//! Validation never fails; every finding comes back as a [`Diagnostic`].
//!
//! - Schema violations (missing or malformed fields, unknown keys) are errors.
//! - Status and size values outside the configured vocabulary are warnings,
//!   so that files written under an older settings file stay usable.
//! - Cross-file checks (unknown epic, unknown dependency, duplicate id) are
//!   always warnings.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::diagnostic::Diagnostic;
use crate::entity::{EntityKind, INBOX_EPIC_ID};
use crate::error::StructuralError;
use crate::frontmatter::{
    FieldValue, Fields, HeaderBlock, line_col, parse_fields, read_frontmatter, split_header,
};
use crate::refs::{find_references, referenced_ids};
use crate::schema::{EntitySchema, FieldRule, FieldType, IdShape, Schemas, is_date};
use crate::settings::Settings;

// ============================================================================
// Known ids
// ============================================================================

/// Ids currently present in the workspace, with the file owning each.
#[derive(Debug, Clone, Default)]
pub struct KnownIds {
    work_items: HashMap<String, PathBuf>,
    groupings: HashMap<String, PathBuf>,
    /// Story ids linked from each epic's body
    members: HashMap<String, Vec<String>>,
}

impl KnownIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_work_item(&mut self, id: impl Into<String>, path: impl Into<PathBuf>) {
        self.work_items.insert(id.into(), path.into());
    }

    /// Record an epic and the story ids its body links to.
    pub fn insert_grouping(&mut self, id: impl Into<String>, path: impl Into<PathBuf>, body: &str) {
        let id = id.into();
        self.members.insert(id.clone(), referenced_ids(body));
        self.groupings.insert(id, path.into());
    }

    pub fn has_work_item(&self, id: &str) -> bool {
        self.work_items.contains_key(id)
    }

    /// The inbox epic always exists.
    pub fn has_grouping(&self, id: &str) -> bool {
        id == INBOX_EPIC_ID || self.groupings.contains_key(id)
    }

    pub fn owner(&self, kind: EntityKind, id: &str) -> Option<&Path> {
        let map = match kind {
            EntityKind::WorkItem => &self.work_items,
            EntityKind::Grouping => &self.groupings,
        };
        map.get(id).map(PathBuf::as_path)
    }

    /// Story ids linked from the body of `grouping_id`.
    pub fn members(&self, grouping_id: &str) -> &[String] {
        self.members.get(grouping_id).map_or(&[], Vec::as_slice)
    }

    /// Epics whose body links to `work_item_id`.
    pub fn groupings_listing(&self, work_item_id: &str) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .members
            .iter()
            .filter(|(_, members)| members.iter().any(|m| m == work_item_id))
            .map(|(id, _)| id.as_str())
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn work_item_count(&self) -> usize {
        self.work_items.len()
    }

    pub fn grouping_count(&self) -> usize {
        self.groupings.len()
    }
}

// ============================================================================
// Positions
// ============================================================================

/// Where a diagnostic about `field` goes: the value span if the key is found,
/// otherwise the opening delimiter.
fn field_position(header: &HeaderBlock<'_>, field: &str) -> (usize, usize, usize) {
    match header.locate_field(field) {
        Some(loc) => {
            let (start, end) = loc.value_span();
            (loc.line, start, end)
        }
        None => (header.open_line, 0, 3),
    }
}

fn key_position(header: &HeaderBlock<'_>, field: &str) -> (usize, usize, usize) {
    match header.locate_field(field) {
        Some(loc) => {
            let (start, end) = loc.key_span();
            (loc.line, start, end)
        }
        None => (header.open_line, 0, 3),
    }
}

fn item_position(header: &HeaderBlock<'_>, field: &str, item: &str) -> (usize, usize, usize) {
    header
        .locate_in_field(field, item)
        .unwrap_or_else(|| field_position(header, field))
}

fn error_at(pos: (usize, usize, usize), field: &str, message: String) -> Diagnostic {
    Diagnostic::error(pos.0, pos.1, pos.2, message).with_field(field)
}

fn warning_at(pos: (usize, usize, usize), field: &str, message: String) -> Diagnostic {
    Diagnostic::warning(pos.0, pos.1, pos.2, message).with_field(field)
}

// ============================================================================
// Schema and vocabulary passes
// ============================================================================

/// Validate a document's frontmatter against its schema and the settings
/// vocabulary.
///
/// Diagnostics are ordered schema errors first (by position), then
/// vocabulary warnings.
pub fn validate_frontmatter(
    text: &str,
    kind: EntityKind,
    settings: &Settings,
    schemas: &Schemas,
) -> Vec<Diagnostic> {
    let Some(header) = split_header(text) else {
        return vec![Diagnostic::error(
            1,
            0,
            text.lines().next().map_or(0, |l| l.chars().count()),
            "No frontmatter found. The file must start with a `---` delimited header block",
        )];
    };

    let fields = match parse_fields(header.yaml, header.open_line + 1) {
        Ok(fields) if fields.is_empty() => {
            return vec![Diagnostic::error(
                header.open_line,
                0,
                3,
                "Frontmatter is empty",
            )];
        }
        Ok(fields) => fields,
        Err(StructuralError::InvalidHeader { message, line }) => {
            let line = line.unwrap_or(header.open_line);
            return vec![Diagnostic::error(line, 0, 3, format!("Invalid frontmatter: {message}"))];
        }
        Err(err) => {
            return vec![Diagnostic::error(header.open_line, 0, 3, err.to_string())];
        }
    };

    let schema = schemas.for_kind(kind);
    let mut diagnostics = schema_pass(&header, &fields, schema);
    diagnostics.sort_by_key(|d| (d.line, d.column));
    diagnostics.extend(vocabulary_pass(&header, &fields, kind, settings));
    diagnostics
}

fn schema_pass(
    header: &HeaderBlock<'_>,
    fields: &Fields,
    schema: &EntitySchema,
) -> Vec<Diagnostic> {
    let mut out = Vec::new();

    for rule in schema.required() {
        if fields.get(rule.name).is_none_or(FieldValue::is_blank) {
            out.push(error_at(
                key_position(header, rule.name),
                rule.name,
                format!("Missing required field: {}", rule.name),
            ));
        }
    }

    for (key, value) in fields.iter() {
        match schema.rule(key) {
            Some(rule) => check_value(header, rule, value, &mut out),
            None if !schema.allow_extra => out.push(error_at(
                key_position(header, key),
                key,
                format!("Unknown field '{key}'"),
            )),
            None => {}
        }
    }

    out
}

fn check_value(
    header: &HeaderBlock<'_>,
    rule: &FieldRule,
    value: &FieldValue,
    out: &mut Vec<Diagnostic>,
) {
    // Blank values are either fine (optional) or already reported (required).
    if value.is_blank() {
        return;
    }

    let name = rule.name;
    let shown = value
        .scalar_text()
        .unwrap_or_else(|| value.type_name().to_string());

    match rule.ty {
        FieldType::Text => {
            if value.as_text().is_none() {
                out.push(error_at(
                    field_position(header, name),
                    name,
                    format!("Field '{name}' must be a string, found {}", value.type_name()),
                ));
            }
        }
        FieldType::Integer => {
            if !matches!(value, FieldValue::Integer(_)) {
                out.push(error_at(
                    field_position(header, name),
                    name,
                    format!("Field '{name}' must be an integer, found {}", value.type_name()),
                ));
            }
        }
        FieldType::Date => {
            if !value.as_text().is_some_and(|s| is_date(s.trim())) {
                out.push(error_at(
                    field_position(header, name),
                    name,
                    format!("Invalid date '{shown}' for '{name}': expected YYYY-MM-DD"),
                ));
            }
        }
        FieldType::Id(shape) => {
            if !value.as_text().is_some_and(|s| shape.matches(s.trim())) {
                out.push(error_at(
                    field_position(header, name),
                    name,
                    format!("Invalid {name} '{shown}': expected {}", shape.describe()),
                ));
            }
        }
        FieldType::Enum(options) => {
            if !value.as_text().is_some_and(|s| options.contains(&s.trim())) {
                out.push(error_at(
                    field_position(header, name),
                    name,
                    format!("Invalid {name} '{shown}': must be one of {}", options.join(", ")),
                ));
            }
        }
        FieldType::IdList(shape) => match value.id_list() {
            Err(reason) => out.push(error_at(
                field_position(header, name),
                name,
                format!("Field '{name}' must be a list of ids: {reason}"),
            )),
            Ok(ids) => {
                for id in ids.iter().filter(|id| !shape.matches(id)) {
                    out.push(error_at(
                        item_position(header, name, id),
                        name,
                        format!("Invalid id '{id}' in '{name}': expected {}", shape.describe()),
                    ));
                }
            }
        },
    }
}

fn vocabulary_pass(
    header: &HeaderBlock<'_>,
    fields: &Fields,
    kind: EntityKind,
    settings: &Settings,
) -> Vec<Diagnostic> {
    let mut out = Vec::new();

    if let Some(status) = fields.text("status") {
        if !settings.has_status(status) {
            let available: Vec<&str> = settings.status_ids().collect();
            out.push(warning_at(
                field_position(header, "status"),
                "status",
                format!(
                    "Status '{status}' is not defined in config. Available: {}",
                    available.join(", ")
                ),
            ));
        }
    }

    if kind == EntityKind::WorkItem {
        if let Some(size) = fields.text("size") {
            if !settings.has_size(size) {
                out.push(warning_at(
                    field_position(header, "size"),
                    "size",
                    format!(
                        "Size '{size}' is not defined in config. Available: {}",
                        settings.sizes.join(", ")
                    ),
                ));
            }
        }
    }

    out
}

// ============================================================================
// Cross-file pass
// ============================================================================

/// Check references from this document to other documents.
///
/// `self_id` defaults to the id declared in the document. Documents whose
/// frontmatter cannot be read produce no cross-file findings; the schema
/// pass already reports them.
pub fn validate_cross_file(
    text: &str,
    kind: EntityKind,
    self_id: Option<&str>,
    known: &KnownIds,
) -> Vec<Diagnostic> {
    let Ok(fm) = read_frontmatter(text) else {
        return Vec::new();
    };
    let header = &fm.header;
    let fields = &fm.fields;
    let self_id = self_id.or_else(|| fields.text("id"));
    let mut out = Vec::new();

    match kind {
        EntityKind::WorkItem => {
            if let Some(epic) = fields.text("epic") {
                if IdShape::Epic.matches(epic) && !known.has_grouping(epic) {
                    out.push(warning_at(
                        field_position(header, "epic"),
                        "epic",
                        format!("Epic '{epic}' not found"),
                    ));
                }
            }

            let deps = fields
                .get("dependencies")
                .and_then(|value| value.id_list().ok())
                .unwrap_or_default();
            for dep in deps.iter().filter(|dep| IdShape::Item.matches(dep)) {
                let message = if Some(dep.as_str()) == self_id {
                    "Story cannot depend on itself".to_string()
                } else if !known.has_work_item(dep) {
                    format!("Dependency '{dep}' not found")
                } else {
                    continue;
                };
                out.push(warning_at(
                    item_position(header, "dependencies", dep),
                    "dependencies",
                    message,
                ));
            }
        }
        EntityKind::Grouping => {
            for reference in find_references(header.body) {
                if known.has_work_item(&reference.id) || known.has_grouping(&reference.id) {
                    continue;
                }
                let (line, column) = line_col(text, header.body_offset + reference.start);
                let width = reference.end - reference.start;
                out.push(Diagnostic::warning(
                    line,
                    column,
                    column + width,
                    format!("Linked story '{}' not found", reference.id),
                ));
            }
        }
    }

    out
}

/// Warn when another file already owns the id this document declares.
pub fn validate_duplicate_id(
    text: &str,
    kind: EntityKind,
    path: &Path,
    known: &KnownIds,
) -> Vec<Diagnostic> {
    let Ok(fm) = read_frontmatter(text) else {
        return Vec::new();
    };
    let Some(id) = fm.fields.text("id") else {
        return Vec::new();
    };
    match known.owner(kind, id) {
        Some(owner) if owner != path => vec![warning_at(
            field_position(&fm.header, "id"),
            "id",
            format!("Duplicate id '{id}': also declared in {}", owner.display()),
        )],
        _ => Vec::new(),
    }
}

/// Schema, vocabulary and, when `known` is given, cross-file findings for
/// one document.
pub fn validate(
    text: &str,
    kind: EntityKind,
    settings: &Settings,
    schemas: &Schemas,
    known: Option<&KnownIds>,
) -> Vec<Diagnostic> {
    let mut diagnostics = validate_frontmatter(text, kind, settings, schemas);
    if let Some(known) = known {
        diagnostics.extend(validate_cross_file(text, kind, None, known));
    }
    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::Severity;

    const VALID: &str = "---
id: DS-001
title: Login page
type: feature
epic: EPIC-001
status: todo
size: M
created: 2025-01-15
---
Body
";

    fn check(text: &str) -> Vec<Diagnostic> {
        validate_frontmatter(text, EntityKind::WorkItem, &Settings::default(), &Schemas::builtin())
    }

    #[test]
    fn valid_story_has_no_findings() {
        assert!(check(VALID).is_empty());
    }

    #[test]
    fn missing_header_is_single_fatal() {
        let diags = check("# Just a heading\n");
        assert_eq!(diags.len(), 1);
        assert!(diags[0].is_error());
        assert_eq!((diags[0].line, diags[0].column, diags[0].end_column), (1, 0, 16));
    }

    #[test]
    fn empty_header_is_single_fatal() {
        let diags = check("---\n---\nbody");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].message, "Frontmatter is empty");
    }

    #[test]
    fn unknown_status_is_one_warning() {
        let diags = check(&VALID.replace("status: todo", "status: blocked"));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].severity, Severity::Warning);
        assert_eq!(diags[0].field.as_deref(), Some("status"));
        assert_eq!(
            diags[0].message,
            "Status 'blocked' is not defined in config. Available: todo, in_progress, review, done"
        );
        assert_eq!((diags[0].line, diags[0].column, diags[0].end_column), (6, 8, 15));
    }

    #[test]
    fn unknown_size_warns_only_for_stories() {
        let diags = check(&VALID.replace("size: M", "size: XXL"));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].field.as_deref(), Some("size"));

        let epic = "---\nid: EPIC-001\ntitle: Auth\nstatus: todo\ncreated: 2025-01-01\n---\n";
        let diags = validate_frontmatter(epic, EntityKind::Grouping, &Settings::default(), &Schemas::builtin());
        assert!(diags.is_empty());
    }

    #[test]
    fn schema_errors_are_positioned() {
        let text = VALID
            .replace("id: DS-001", "id: ds-1")
            .replace("type: feature", "type: story")
            .replace("created: 2025-01-15", "created: \"15/01/2025\"");
        let diags = check(&text);
        let fields: Vec<_> = diags.iter().map(|d| d.field.as_deref().unwrap()).collect();
        assert_eq!(fields, vec!["id", "type", "created"]);
        assert!(diags.iter().all(Diagnostic::is_error));
        // created: "15/01/2025" -> inside the quotes
        assert_eq!((diags[2].line, diags[2].column, diags[2].end_column), (8, 10, 20));
    }

    #[test]
    fn missing_required_field_points_at_delimiter() {
        let diags = check(&VALID.replace("size: M\n", ""));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].message, "Missing required field: size");
        assert_eq!(diags[0].line, 1);
    }

    #[test]
    fn blank_required_field_points_at_key() {
        let diags = check(&VALID.replace("title: Login page", "title:"));
        assert_eq!(diags.len(), 1);
        assert_eq!((diags[0].line, diags[0].column, diags[0].end_column), (3, 0, 5));
    }

    #[test]
    fn unknown_fields_are_errors() {
        let diags = check(&VALID.replace("size: M", "size: M\nestimate: 3"));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].message, "Unknown field 'estimate'");
    }

    #[test]
    fn inbox_epic_always_accepted() {
        assert!(check(&VALID.replace("EPIC-001", "EPIC-INBOX")).is_empty());
    }

    #[test]
    fn vocabulary_warning_survives_schema_errors() {
        let text = VALID
            .replace("status: todo", "status: blocked")
            .replace("created: 2025-01-15", "created: soon");
        let diags = check(&text);
        assert_eq!(diags.iter().filter(|d| d.is_error()).count(), 1);
        assert_eq!(diags.last().unwrap().field.as_deref(), Some("status"));
    }

    #[test]
    fn invalid_yaml_is_single_error() {
        let diags = check("---\nid: DS-001\ntitle: [oops\n---\n");
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.starts_with("Invalid frontmatter"));
    }

    fn known() -> KnownIds {
        let mut known = KnownIds::new();
        known.insert_work_item("DS-001", "stories/DS-001.md");
        known.insert_grouping("EPIC-001", "epics/EPIC-001.md", "[[DS-001]]");
        known
    }

    #[test]
    fn cross_file_flags_only_unknown_dependencies() {
        let text = "---\nid: DS-002\ntitle: T\ntype: task\nepic: EPIC-001\nstatus: todo\nsize: S\ndependencies:\n  - [[DS-001]]\n  - [[DS-999]]\ncreated: 2025-01-15\n---\n";
        let diags = validate_cross_file(text, EntityKind::WorkItem, Some("DS-002"), &known());
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("DS-999"));
        assert_eq!(diags[0].severity, Severity::Warning);
        assert_eq!(diags[0].line, 10);
    }

    #[test]
    fn cross_file_flags_unknown_epic_and_self_dependency() {
        let text = VALID
            .replace("EPIC-001", "EPIC-042")
            .replace("size: M", "size: M\ndependencies: [DS-001]");
        let diags = validate_cross_file(&text, EntityKind::WorkItem, None, &KnownIds::new());
        let messages: Vec<_> = diags.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(messages, vec!["Epic 'EPIC-042' not found", "Story cannot depend on itself"]);
    }

    #[test]
    fn cross_file_checks_epic_body_links() {
        let text = "---\nid: EPIC-001\ntitle: Auth\nstatus: todo\ncreated: 2025-01-01\n---\n- [[DS-001]]\n- [[DS-404]]\n";
        let diags = validate_cross_file(text, EntityKind::Grouping, None, &known());
        assert_eq!(diags.len(), 1);
        assert_eq!((diags[0].line, diags[0].column, diags[0].end_column), (8, 2, 12));
    }

    #[test]
    fn duplicate_id_is_reported_against_other_owner() {
        let known = known();
        let dup = validate_duplicate_id(VALID, EntityKind::WorkItem, Path::new("stories/copy.md"), &known);
        assert_eq!(dup.len(), 1);
        assert_eq!(dup[0].field.as_deref(), Some("id"));
        let own = validate_duplicate_id(VALID, EntityKind::WorkItem, Path::new("stories/DS-001.md"), &known);
        assert!(own.is_empty());
    }

    #[test]
    fn known_ids_track_epic_members() {
        let known = known();
        assert_eq!(known.members("EPIC-001"), ["DS-001".to_string()]);
        assert_eq!(known.groupings_listing("DS-001"), vec!["EPIC-001"]);
        assert!(known.has_grouping(INBOX_EPIC_ID));
    }
}
