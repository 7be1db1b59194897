//! Ordering helpers driven by the sprint sequence.

use std::cmp::Ordering;

use crate::entity::WorkItem;
use crate::settings::{Settings, UnlistedSprints};

/// Sort key for a sprint.
///
/// Listed sprints come first in sequence order, then unlisted sprints, then
/// stories without a sprint (the backlog).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SprintRank<'a> {
    Listed(usize),
    Unlisted(Option<&'a str>),
    Backlog,
}

pub fn sprint_rank<'a>(settings: &Settings, sprint: Option<&'a str>) -> SprintRank<'a> {
    let Some(sprint) = sprint.map(str::trim).filter(|s| !s.is_empty()) else {
        return SprintRank::Backlog;
    };
    match settings.sprint_sequence.iter().position(|s| s == sprint) {
        Some(index) => SprintRank::Listed(index),
        None => match settings.unlisted_sprints {
            UnlistedSprints::Alphabetical => SprintRank::Unlisted(Some(sprint)),
            UnlistedSprints::Unordered => SprintRank::Unlisted(None),
        },
    }
}

/// Sprint rank, then priority (lower first), then id.
pub fn compare_work_items(settings: &Settings, a: &WorkItem, b: &WorkItem) -> Ordering {
    sprint_rank(settings, a.sprint.as_deref())
        .cmp(&sprint_rank(settings, b.sprint.as_deref()))
        .then(a.priority.cmp(&b.priority))
        .then_with(|| a.id.cmp(&b.id))
}

pub fn sort_work_items(items: &mut [WorkItem], settings: &Settings) {
    items.sort_by(|a, b| compare_work_items(settings, a, b));
}

/// Whether a story belongs to the configured current sprint.
pub fn in_current_sprint(settings: &Settings, item: &WorkItem) -> bool {
    settings
        .current_sprint
        .as_deref()
        .is_some_and(|current| item.sprint.as_deref() == Some(current))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_work_item;

    fn item(id: &str, sprint: Option<&str>, priority: i64) -> WorkItem {
        let sprint = sprint.map(|s| format!("sprint: {s}\n")).unwrap_or_default();
        let text = format!(
            "---\nid: {id}\ntitle: t\ntype: task\nepic: EPIC-INBOX\nstatus: todo\nsize: S\n{sprint}priority: {priority}\ncreated: 2025-01-01\n---\n"
        );
        parse_work_item(&text).unwrap()
    }

    fn settings(unlisted: UnlistedSprints) -> Settings {
        Settings {
            sprint_sequence: vec!["s2".into(), "s1".into()],
            unlisted_sprints: unlisted,
            current_sprint: Some("s2".into()),
            ..Settings::default()
        }
    }

    #[test]
    fn listed_then_unlisted_then_backlog() {
        let settings = settings(UnlistedSprints::Alphabetical);
        let mut items = vec![
            item("DS-1", None, 1),
            item("DS-2", Some("zeta"), 1),
            item("DS-3", Some("s1"), 1),
            item("DS-4", Some("alpha"), 1),
            item("DS-5", Some("s2"), 900),
            item("DS-6", Some("s2"), 10),
        ];
        sort_work_items(&mut items, &settings);
        let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["DS-6", "DS-5", "DS-3", "DS-4", "DS-2", "DS-1"]);
    }

    #[test]
    fn unordered_unlisted_sprints_tie() {
        let settings = settings(UnlistedSprints::Unordered);
        assert_eq!(
            sprint_rank(&settings, Some("zeta")),
            sprint_rank(&settings, Some("alpha"))
        );
        assert_eq!(sprint_rank(&settings, Some("  ")), SprintRank::Backlog);
    }

    #[test]
    fn current_sprint_membership() {
        let settings = settings(UnlistedSprints::Alphabetical);
        assert!(in_current_sprint(&settings, &item("DS-1", Some("s2"), 1)));
        assert!(!in_current_sprint(&settings, &item("DS-2", Some("s1"), 1)));
    }
}
