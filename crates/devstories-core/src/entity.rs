//! Typed entities projected from story and epic files.

use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Epic id that is always valid, whether or not an epic file declares it.
pub const INBOX_EPIC_ID: &str = "EPIC-INBOX";

/// Priority used when a file does not declare one. Lower sorts first.
pub const DEFAULT_PRIORITY: i64 = 500;

/// Calendar date format used in frontmatter.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Which of the two document kinds a file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// A story file (`stories/*.md`)
    WorkItem,
    /// An epic file (`epics/*.md`)
    Grouping,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::WorkItem => "story",
            EntityKind::Grouping => "epic",
        }
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of story types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Feature,
    Bug,
    Task,
    Chore,
}

impl ItemType {
    pub const ALL: [ItemType; 4] = [
        ItemType::Feature,
        ItemType::Bug,
        ItemType::Task,
        ItemType::Chore,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Feature => "feature",
            ItemType::Bug => "bug",
            ItemType::Task => "task",
            ItemType::Chore => "chore",
        }
    }
}

impl Display for ItemType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ItemType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown item type `{s}`"))
    }
}

/// A date field as written in the file.
///
/// The parser is permissive: text that is not a valid `YYYY-MM-DD` date is
/// kept verbatim and left for the validator to report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalendarDate {
    Date(NaiveDate),
    Unparsed(String),
}

impl CalendarDate {
    pub fn parse(raw: &str) -> Self {
        match NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT) {
            Ok(date) => CalendarDate::Date(date),
            Err(_) => CalendarDate::Unparsed(raw.to_string()),
        }
    }

    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            CalendarDate::Date(date) => Some(*date),
            CalendarDate::Unparsed(_) => None,
        }
    }
}

impl Display for CalendarDate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CalendarDate::Date(date) => write!(f, "{}", date.format(DATE_FORMAT)),
            CalendarDate::Unparsed(raw) => f.write_str(raw),
        }
    }
}

/// A story.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub id: String,
    pub title: String,
    pub item_type: ItemType,
    /// Id of the epic this story belongs to. Not guaranteed to resolve.
    pub grouping_id: String,
    pub status: String,
    pub sprint: Option<String>,
    pub size: String,
    pub priority: i64,
    pub assignee: Option<String>,
    pub dependencies: Vec<String>,
    pub created: CalendarDate,
    pub updated: Option<CalendarDate>,
    pub body: String,
    /// File this entity was read from. The file is authoritative.
    pub source_path: PathBuf,
}

/// An epic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grouping {
    pub id: String,
    pub title: String,
    pub status: String,
    pub sprint: Option<String>,
    pub priority: i64,
    pub created: CalendarDate,
    pub updated: Option<CalendarDate>,
    pub body: String,
    pub source_path: PathBuf,
}

impl Grouping {
    pub fn is_inbox(&self) -> bool {
        self.id == INBOX_EPIC_ID
    }
}

/// Either kind of parsed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entity {
    WorkItem(WorkItem),
    Grouping(Grouping),
}

impl Entity {
    pub fn id(&self) -> &str {
        match self {
            Entity::WorkItem(item) => &item.id,
            Entity::Grouping(grouping) => &grouping.id,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::WorkItem(_) => EntityKind::WorkItem,
            Entity::Grouping(_) => EntityKind::Grouping,
        }
    }

    pub fn source_path(&self) -> &Path {
        match self {
            Entity::WorkItem(item) => &item.source_path,
            Entity::Grouping(grouping) => &grouping.source_path,
        }
    }

    /// Attach the file the entity was parsed from.
    pub fn with_source_path(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match &mut self {
            Entity::WorkItem(item) => item.source_path = path,
            Entity::Grouping(grouping) => grouping.source_path = path,
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_type_round_trips_through_str() {
        for ty in ItemType::ALL {
            assert_eq!(ty.as_str().parse::<ItemType>(), Ok(ty));
        }
        assert!("story".parse::<ItemType>().is_err());
    }

    #[test]
    fn calendar_date_keeps_malformed_text() {
        assert_eq!(
            CalendarDate::parse("2025-01-15").date(),
            NaiveDate::from_ymd_opt(2025, 1, 15)
        );
        let bad = CalendarDate::parse("15/01/2025");
        assert_eq!(bad, CalendarDate::Unparsed("15/01/2025".to_string()));
        assert_eq!(bad.to_string(), "15/01/2025");
    }
}
