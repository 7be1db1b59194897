//! Settings snapshot, sparse parsing and merging over defaults.
//!
//! The settings file is JSON. Parsing yields a [`PartialSettings`] holding
//! only what the file declares; [`merge_with_defaults`] turns it into a fully
//! populated [`Settings`]. Each top-level section present in the file
//! replaces the corresponding default wholesale; a section that does not
//! decode is dropped on its own and the default stays.

use std::collections::BTreeMap;

use chrono::{NaiveTime, Weekday};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::ItemType;
use crate::error::SettingsParseError;
use crate::frontmatter::{FieldValue, line_col, read_frontmatter, split_header};

/// A status the team uses, in board order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusDef {
    pub id: String,
    pub label: String,
}

impl StatusDef {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// How sprints missing from the configured sequence are ordered.
///
/// Unlisted sprints always sort after listed ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnlistedSprints {
    /// By sprint name
    #[default]
    Alphabetical,
    /// All unlisted sprints share one rank
    Unordered,
}

/// One reminder slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderSlot {
    pub day: Weekday,
    pub time: NaiveTime,
}

/// Window during which reminders may fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl ActiveHours {
    /// Whether `time` falls inside the window. Windows may wrap midnight.
    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= time && time < self.end
        } else {
            time >= self.start || time < self.end
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reminders {
    pub schedule: Vec<ReminderSlot>,
    pub active_hours: Option<ActiveHours>,
}

/// Immutable, fully populated settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub project: Option<String>,
    pub epic_prefix: String,
    pub story_prefix: String,
    pub current_sprint: Option<String>,
    pub sprint_sequence: Vec<String>,
    pub unlisted_sprints: UnlistedSprints,
    pub statuses: Vec<StatusDef>,
    pub sizes: Vec<String>,
    /// Inline template bodies keyed by item type name
    pub templates: BTreeMap<String, String>,
    pub reminders: Reminders,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            project: None,
            epic_prefix: "EPIC".to_string(),
            story_prefix: "DS".to_string(),
            current_sprint: None,
            sprint_sequence: Vec::new(),
            unlisted_sprints: UnlistedSprints::default(),
            statuses: vec![
                StatusDef::new("todo", "To Do"),
                StatusDef::new("in_progress", "In Progress"),
                StatusDef::new("review", "Review"),
                StatusDef::new("done", "Done"),
            ],
            sizes: ["XS", "S", "M", "L", "XL"].map(String::from).to_vec(),
            templates: BTreeMap::new(),
            reminders: Reminders::default(),
        }
    }
}

impl Settings {
    pub fn status_ids(&self) -> impl Iterator<Item = &str> {
        self.statuses.iter().map(|s| s.id.as_str())
    }

    pub fn has_status(&self, id: &str) -> bool {
        self.status_ids().any(|s| s == id)
    }

    pub fn has_size(&self, size: &str) -> bool {
        self.sizes.iter().any(|s| s == size)
    }

    /// Display label for a status id, falling back to the id itself.
    pub fn status_label<'a>(&'a self, id: &'a str) -> &'a str {
        self.statuses
            .iter()
            .find(|s| s.id == id)
            .map_or(id, |s| s.label.as_str())
    }

    /// The inline template override for an item type, if configured.
    pub fn template_for(&self, item_type: ItemType) -> Option<&str> {
        self.templates.get(item_type.as_str()).map(String::as_str)
    }
}

// ============================================================================
// Sparse parsing
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct IdPrefixSection {
    pub epic: Option<String>,
    pub story: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SprintSection {
    pub current: Option<String>,
    pub sequence: Option<Vec<String>>,
    pub unlisted: Option<UnlistedSprints>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct RawSlot {
    day: String,
    time: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct RawHours {
    start: String,
    end: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReminders {
    schedule: Option<Vec<RawSlot>>,
    active_hours: Option<RawHours>,
}

/// The fields a settings file actually declares.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialSettings {
    pub project: Option<String>,
    pub id_prefix: Option<IdPrefixSection>,
    pub statuses: Option<Vec<StatusDef>>,
    pub sizes: Option<Vec<String>>,
    pub sprints: Option<SprintSection>,
    pub templates: Option<BTreeMap<String, String>>,
    pub schedule: Option<Vec<ReminderSlot>>,
    pub active_hours: Option<ActiveHours>,
    /// Sections present in the file that were dropped, one error each
    pub rejected: Vec<SettingsParseError>,
}

impl PartialSettings {
    /// Whether no setting was taken from the file.
    pub fn is_empty(&self) -> bool {
        self.project.is_none()
            && self.id_prefix.is_none()
            && self.statuses.is_none()
            && self.sizes.is_none()
            && self.sprints.is_none()
            && self.templates.is_none()
            && self.schedule.is_none()
            && self.active_hours.is_none()
    }
}

/// Parse settings text into the fields it declares.
///
/// Each top-level section is decoded on its own. A section of the wrong
/// shape, or an unknown key, is dropped and recorded in
/// [`PartialSettings::rejected`] while the rest still applies. The whole
/// file is rejected only when it is not a JSON object or when no section
/// decodes. Blank text is a legitimately empty file and yields an empty
/// result.
pub fn parse_settings(text: &str) -> Result<PartialSettings, SettingsParseError> {
    if text.trim().is_empty() {
        return Ok(PartialSettings::default());
    }

    let Value::Object(sections) = serde_json::from_str::<Value>(text)? else {
        return Err(SettingsParseError::new("settings must be a JSON object"));
    };

    let mut partial = PartialSettings::default();
    let mut decoded_any = false;
    for (key, value) in sections {
        let applied = match key.as_str() {
            "version" => decode::<u32>(value).map(drop),
            "project" => decode(value).map(|v| partial.project = Some(v)),
            "idPrefix" => decode(value).map(|v| partial.id_prefix = Some(v)),
            "statuses" => decode(value)
                .and_then(check_statuses)
                .map(|v| partial.statuses = Some(v)),
            "sizes" => decode(value).map(|v| partial.sizes = Some(v)),
            "sprints" => decode(value).map(|v| partial.sprints = Some(v)),
            "templates" => decode(value).map(|v| partial.templates = Some(v)),
            "reminders" => decode_reminders(value).map(|(schedule, hours)| {
                partial.schedule = schedule;
                partial.active_hours = hours;
            }),
            _ => Err("unknown setting".to_string()),
        };
        match applied {
            Ok(()) => decoded_any = true,
            Err(reason) => partial
                .rejected
                .push(at_key(text, &key, format!("`{key}`: {reason}"))),
        }
    }

    if !decoded_any {
        return Err(partial
            .rejected
            .into_iter()
            .next()
            .unwrap_or_else(|| SettingsParseError::new("no settings found in file")));
    }
    Ok(partial)
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, String> {
    serde_json::from_value(value).map_err(|e| e.to_string())
}

fn check_statuses(statuses: Vec<StatusDef>) -> Result<Vec<StatusDef>, String> {
    match statuses.iter().find(|s| s.id.trim().is_empty()) {
        Some(blank) => Err(format!("status with label `{}` has an empty id", blank.label)),
        None => Ok(statuses),
    }
}

fn decode_reminders(
    value: Value,
) -> Result<(Option<Vec<ReminderSlot>>, Option<ActiveHours>), String> {
    let raw: RawReminders = decode(value)?;
    let schedule = raw
        .schedule
        .map(|slots| slots.iter().map(parse_slot).collect::<Result<Vec<_>, _>>())
        .transpose()?;
    let active_hours = raw
        .active_hours
        .map(|hours| {
            Ok::<_, String>(ActiveHours {
                start: parse_time(&hours.start)?,
                end: parse_time(&hours.end)?,
            })
        })
        .transpose()?;
    Ok((schedule, active_hours))
}

fn parse_slot(slot: &RawSlot) -> Result<ReminderSlot, String> {
    let day = slot
        .day
        .parse::<Weekday>()
        .map_err(|_| format!("unknown reminder day `{}`", slot.day))?;
    Ok(ReminderSlot {
        day,
        time: parse_time(&slot.time)?,
    })
}

fn parse_time(raw: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|_| format!("invalid time `{raw}`, expected HH:MM"))
}

/// Point an error at the first line quoting `key`.
fn at_key(text: &str, key: &str, message: String) -> SettingsParseError {
    let mut error = SettingsParseError::new(message);
    if let Some(offset) = text.find(&format!("\"{key}\"")) {
        let (line, column) = line_col(text, offset);
        error.line = Some(line);
        error.column = Some(column + 1);
    }
    error
}

/// Fill every field the file did not declare from [`Settings::default`].
pub fn merge_with_defaults(partial: PartialSettings) -> Settings {
    let defaults = Settings::default();
    let prefix = partial.id_prefix.unwrap_or_default();
    let sprints = partial.sprints.unwrap_or_default();

    Settings {
        project: partial.project.or(defaults.project),
        epic_prefix: prefix.epic.unwrap_or(defaults.epic_prefix),
        story_prefix: prefix.story.unwrap_or(defaults.story_prefix),
        current_sprint: sprints.current.or(defaults.current_sprint),
        sprint_sequence: sprints.sequence.unwrap_or(defaults.sprint_sequence),
        unlisted_sprints: sprints.unlisted.unwrap_or(defaults.unlisted_sprints),
        statuses: partial.statuses.unwrap_or(defaults.statuses),
        sizes: partial.sizes.unwrap_or(defaults.sizes),
        templates: partial.templates.unwrap_or(defaults.templates),
        reminders: Reminders {
            schedule: partial.schedule.unwrap_or(defaults.reminders.schedule),
            active_hours: partial.active_hours.or(defaults.reminders.active_hours),
        },
    }
}

// ============================================================================
// Templates
// ============================================================================

/// A story template read from the templates folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    /// File stem
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    /// Item types this template applies to; empty means all
    pub types: Vec<ItemType>,
    pub content: String,
}

impl Template {
    pub fn applies_to(&self, item_type: ItemType) -> bool {
        self.types.is_empty() || self.types.contains(&item_type)
    }
}

/// Parse a template file. A missing or unreadable header leaves the whole
/// text as content and the file stem as display name.
pub fn parse_template(name: &str, text: &str) -> Template {
    let fallback = || Template {
        name: name.to_string(),
        display_name: name.to_string(),
        description: None,
        types: Vec::new(),
        content: text.to_string(),
    };

    let Some(header) = split_header(text) else {
        return fallback();
    };
    let Ok(fm) = read_frontmatter(text) else {
        return Template {
            content: header.body.to_string(),
            ..fallback()
        };
    };

    let types = match fm.fields.get("types") {
        Some(FieldValue::List(items)) => items
            .iter()
            .filter_map(FieldValue::as_text)
            .filter_map(|t| t.trim().parse::<ItemType>().ok())
            .collect(),
        Some(FieldValue::Text(t)) => t
            .split(',')
            .filter_map(|t| t.trim().parse::<ItemType>().ok())
            .collect(),
        _ => Vec::new(),
    };

    Template {
        name: name.to_string(),
        display_name: fm
            .fields
            .text("title")
            .map_or_else(|| name.to_string(), str::to_string),
        description: fm.fields.text("description").map(str::to_string),
        types,
        content: fm.header.body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_yields_defaults() {
        let partial = parse_settings("  \n").unwrap();
        assert!(partial.is_empty());
        assert_eq!(merge_with_defaults(partial), Settings::default());
    }

    #[test]
    fn sections_replace_defaults_wholesale() {
        let partial = parse_settings(
            r#"{
                "version": 1,
                "idPrefix": { "story": "APP" },
                "statuses": [{ "id": "open", "label": "Open" }, { "id": "closed", "label": "Closed" }],
                "sprints": { "current": "s2", "sequence": ["s1", "s2"] }
            }"#,
        )
        .unwrap();
        let settings = merge_with_defaults(partial);
        assert_eq!(settings.story_prefix, "APP");
        assert_eq!(settings.epic_prefix, "EPIC");
        assert_eq!(settings.status_ids().collect::<Vec<_>>(), vec!["open", "closed"]);
        assert_eq!(settings.sizes, Settings::default().sizes);
        assert_eq!(settings.current_sprint.as_deref(), Some("s2"));
        assert_eq!(settings.unlisted_sprints, UnlistedSprints::Alphabetical);
    }

    #[test]
    fn malformed_json_is_an_error() {
        let err = parse_settings("{ \"sizes\": [").unwrap_err();
        assert!(err.line.is_some());
    }

    #[test]
    fn nothing_usable_is_an_error() {
        assert!(parse_settings(r#"{ "sizes": "M" }"#).is_err());
        assert!(parse_settings("[1, 2]").is_err());
        assert!(parse_settings("{}").is_err());

        let err = parse_settings(r#"{ "statusList": ["x"] }"#).unwrap_err();
        assert!(err.message.contains("statusList"));
        assert_eq!(err.line, Some(1));
    }

    #[test]
    fn version_alone_is_accepted() {
        let partial = parse_settings(r#"{ "version": 1 }"#).unwrap();
        assert!(partial.is_empty());
        assert!(partial.rejected.is_empty());
    }

    #[test]
    fn bad_section_is_dropped_on_its_own() {
        let text = r#"{
    "statuses": [{ "id": "open", "label": "Open" }],
    "sizes": "M",
    "colour": "blue"
}"#;
        let partial = parse_settings(text).unwrap();
        assert_eq!(partial.rejected.len(), 2);
        let sizes = partial
            .rejected
            .iter()
            .find(|e| e.message.starts_with("`sizes`"))
            .unwrap();
        assert_eq!((sizes.line, sizes.column), (Some(3), Some(5)));

        let settings = merge_with_defaults(partial);
        assert_eq!(settings.status_ids().collect::<Vec<_>>(), vec!["open"]);
        assert_eq!(settings.sizes, Settings::default().sizes);
    }

    #[test]
    fn reminders_are_typed() {
        let settings = merge_with_defaults(
            parse_settings(
                r#"{ "reminders": {
                    "schedule": [{ "day": "monday", "time": "09:30" }],
                    "activeHours": { "start": "22:00", "end": "06:00" }
                } }"#,
            )
            .unwrap(),
        );
        assert_eq!(settings.reminders.schedule[0].day, Weekday::Mon);
        let hours = settings.reminders.active_hours.unwrap();
        assert!(hours.contains(NaiveTime::from_hms_opt(23, 0, 0).unwrap()));
        assert!(!hours.contains(NaiveTime::from_hms_opt(12, 0, 0).unwrap()));
    }

    #[test]
    fn bad_reminder_time_drops_only_reminders() {
        let partial = parse_settings(
            r#"{
                "statuses": [{ "id": "open", "label": "Open" }],
                "reminders": { "schedule": [{ "day": "monday", "time": "9am" }] }
            }"#,
        )
        .unwrap();
        assert_eq!(partial.rejected.len(), 1);
        assert!(partial.rejected[0].message.contains("invalid time `9am`"));
        assert!(partial.schedule.is_none());

        let settings = merge_with_defaults(partial);
        assert_eq!(settings.status_ids().collect::<Vec<_>>(), vec!["open"]);
        assert!(settings.reminders.schedule.is_empty());

        assert!(
            parse_settings(r#"{ "reminders": { "schedule": [{ "day": "monday", "time": "9am" }] } }"#)
                .is_err()
        );
    }

    #[test]
    fn status_labels_and_templates() {
        let mut settings = Settings::default();
        settings.templates.insert("bug".into(), "## Repro".into());
        assert_eq!(settings.status_label("in_progress"), "In Progress");
        assert_eq!(settings.status_label("blocked"), "blocked");
        assert_eq!(settings.template_for(ItemType::Bug), Some("## Repro"));
        assert_eq!(settings.template_for(ItemType::Task), None);
    }

    #[test]
    fn template_header_is_optional() {
        let plain = parse_template("plain", "Just a body\n");
        assert_eq!(plain.display_name, "plain");
        assert!(plain.applies_to(ItemType::Chore));

        let typed = parse_template(
            "bug-report",
            "---\ntitle: Bug report\ndescription: For defects\ntypes: [bug]\n---\n## Steps\n",
        );
        assert_eq!(typed.display_name, "Bug report");
        assert_eq!(typed.description.as_deref(), Some("For defects"));
        assert!(typed.applies_to(ItemType::Bug));
        assert!(!typed.applies_to(ItemType::Feature));
        assert_eq!(typed.content, "## Steps\n");
    }
}
