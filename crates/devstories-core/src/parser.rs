//! Text to entity.
//!
//! Parsing only enforces what is needed to build an entity: a header block
//! and the required fields. Format checks (id shape, date shape, unknown
//! keys, vocabulary) belong to [`crate::validate`].

use std::path::Path;

use crate::entity::{
    CalendarDate, DEFAULT_PRIORITY, Entity, EntityKind, Grouping, ItemType, WorkItem,
};
use crate::error::StructuralError;
use crate::frontmatter::{FieldValue, Fields, read_frontmatter};

/// Required keys for a story, in the order they are checked.
pub const WORK_ITEM_REQUIRED: [&str; 7] =
    ["id", "title", "type", "epic", "status", "size", "created"];

/// Required keys for an epic, in the order they are checked.
pub const GROUPING_REQUIRED: [&str; 4] = ["id", "title", "status", "created"];

/// Parse a document of the given kind.
///
/// The returned entity has an empty `source_path`; see [`parse_file`].
pub fn parse(text: &str, kind: EntityKind) -> Result<Entity, StructuralError> {
    match kind {
        EntityKind::WorkItem => parse_work_item(text).map(Entity::WorkItem),
        EntityKind::Grouping => parse_grouping(text).map(Entity::Grouping),
    }
}

/// Parse a document and record the file it came from.
pub fn parse_file(path: &Path, text: &str, kind: EntityKind) -> Result<Entity, StructuralError> {
    parse(text, kind).map(|entity| entity.with_source_path(path))
}

pub fn parse_work_item(text: &str) -> Result<WorkItem, StructuralError> {
    let fm = read_frontmatter(text)?;
    let fields = &fm.fields;
    check_required(fields, &WORK_ITEM_REQUIRED)?;

    let item_type = required_text(fields, "type")?
        .parse::<ItemType>()
        .map_err(|reason| StructuralError::InvalidField {
            field: "type",
            reason,
        })?;

    let dependencies = match fields.get("dependencies") {
        Some(value) => value
            .id_list()
            .map_err(|reason| StructuralError::InvalidField {
                field: "dependencies",
                reason,
            })?,
        None => Vec::new(),
    };

    Ok(WorkItem {
        id: required_text(fields, "id")?,
        title: required_text(fields, "title")?,
        item_type,
        grouping_id: required_text(fields, "epic")?,
        status: required_text(fields, "status")?,
        sprint: optional_text(fields, "sprint"),
        size: required_text(fields, "size")?,
        priority: priority(fields),
        assignee: optional_text(fields, "assignee"),
        dependencies,
        created: CalendarDate::parse(&required_text(fields, "created")?),
        updated: optional_text(fields, "updated").map(|raw| CalendarDate::parse(&raw)),
        body: fm.header.body.to_string(),
        source_path: Default::default(),
    })
}

pub fn parse_grouping(text: &str) -> Result<Grouping, StructuralError> {
    let fm = read_frontmatter(text)?;
    let fields = &fm.fields;
    check_required(fields, &GROUPING_REQUIRED)?;

    Ok(Grouping {
        id: required_text(fields, "id")?,
        title: required_text(fields, "title")?,
        status: required_text(fields, "status")?,
        sprint: optional_text(fields, "sprint"),
        priority: priority(fields),
        created: CalendarDate::parse(&required_text(fields, "created")?),
        updated: optional_text(fields, "updated").map(|raw| CalendarDate::parse(&raw)),
        body: fm.header.body.to_string(),
        source_path: Default::default(),
    })
}

fn check_required(fields: &Fields, required: &[&'static str]) -> Result<(), StructuralError> {
    match required
        .iter()
        .copied()
        .find(|key| fields.get(key).is_none_or(FieldValue::is_blank))
    {
        Some(field) => Err(StructuralError::MissingField { field }),
        None => Ok(()),
    }
}

/// Required scalars are read permissively: `title: 2025` is the title "2025".
fn required_text(fields: &Fields, key: &'static str) -> Result<String, StructuralError> {
    let value = fields
        .get(key)
        .ok_or(StructuralError::MissingField { field: key })?;
    value
        .scalar_text()
        .map(|s| s.trim().to_string())
        .ok_or_else(|| StructuralError::InvalidField {
            field: key,
            reason: format!("expected a single value, found {}", value.type_name()),
        })
}

fn optional_text(fields: &Fields, key: &str) -> Option<String> {
    fields
        .get(key)
        .and_then(FieldValue::scalar_text)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn priority(fields: &Fields) -> i64 {
    match fields.get("priority") {
        Some(FieldValue::Integer(p)) => *p,
        Some(FieldValue::Text(s)) => s.trim().parse().unwrap_or(DEFAULT_PRIORITY),
        _ => DEFAULT_PRIORITY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STORY: &str = "---
id: DS-001
title: Login page
type: feature
epic: EPIC-001
status: todo
sprint: sprint-1
size: M
assignee: sam
dependencies:
  - [[DS-000]]
created: 2025-01-15
---

# Login page
";

    #[test]
    fn parses_full_story() {
        let item = parse_work_item(STORY).unwrap();
        assert_eq!(item.id, "DS-001");
        assert_eq!(item.item_type, ItemType::Feature);
        assert_eq!(item.grouping_id, "EPIC-001");
        assert_eq!(item.sprint.as_deref(), Some("sprint-1"));
        assert_eq!(item.priority, DEFAULT_PRIORITY);
        assert_eq!(item.dependencies, vec!["DS-000"]);
        assert!(item.updated.is_none());
        assert_eq!(item.body, "\n# Login page\n");
    }

    #[test]
    fn malformed_dates_are_accepted() {
        let text = STORY.replace("created: 2025-01-15", "created: someday");
        let item = parse_work_item(&text).unwrap();
        assert_eq!(item.created, CalendarDate::Unparsed("someday".into()));
    }

    #[test]
    fn unknown_type_is_structural() {
        let text = STORY.replace("type: feature", "type: story");
        assert_eq!(
            parse_work_item(&text).unwrap_err().field(),
            Some("type")
        );
    }

    #[test]
    fn blank_required_field_counts_as_missing() {
        let text = STORY.replace("status: todo", "status:");
        assert_eq!(
            parse_work_item(&text).unwrap_err(),
            StructuralError::MissingField { field: "status" }
        );
    }

    #[test]
    fn parse_file_sets_source_path() {
        let entity = parse_file(Path::new("stories/DS-001.md"), STORY, EntityKind::WorkItem).unwrap();
        assert_eq!(entity.source_path(), Path::new("stories/DS-001.md"));
        assert_eq!(entity.kind(), EntityKind::WorkItem);
    }

    #[test]
    fn grouping_priority_from_text() {
        let text = "---\nid: EPIC-INBOX\ntitle: Inbox\nstatus: todo\npriority: \"10\"\ncreated: 2025-01-01\n---\n";
        let grouping = parse_grouping(text).unwrap();
        assert!(grouping.is_inbox());
        assert_eq!(grouping.priority, 10);
    }
}
