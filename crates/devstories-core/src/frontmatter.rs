//! Frontmatter extraction and field location.
//!
//! A document starts with a line of exactly `---`, followed by YAML
//! `key: value` lines, followed by another `---` line. Everything after the
//! closing delimiter is the body.
//!
//! Values are decoded from YAML into [`FieldValue`] without any coercion;
//! deciding whether a value is acceptable is left to the parser and the
//! validator.

use crate::error::StructuralError;

/// The raw header block of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderBlock<'a> {
    /// Text between the two delimiter lines
    pub yaml: &'a str,
    /// Text after the closing delimiter line
    pub body: &'a str,
    /// 1-indexed line of the opening delimiter (always 1)
    pub open_line: usize,
    /// 1-indexed line of the closing delimiter
    pub close_line: usize,
    /// Byte offset of the body in the full text
    pub body_offset: usize,
}

/// Split a document into header block and body.
///
/// Returns `None` when the first line is not `---` or when the block is never
/// closed. A leading byte-order mark is ignored.
pub fn split_header(text: &str) -> Option<HeaderBlock<'_>> {
    let mut lines = text.split_inclusive('\n');
    let first = lines.next()?;
    if first.trim_start_matches('\u{feff}').trim_end() != "---" {
        return None;
    }

    let yaml_start = first.len();
    let mut offset = yaml_start;
    let mut line_no = 1;
    for line in lines {
        line_no += 1;
        if line.trim_end() == "---" {
            let body_offset = offset + line.len();
            return Some(HeaderBlock {
                yaml: &text[yaml_start..offset],
                body: &text[body_offset..],
                open_line: 1,
                close_line: line_no,
                body_offset,
            });
        }
        offset += line.len();
    }

    None
}

/// Location of a `key: value` line inside the header block.
///
/// Columns are 0-indexed character offsets, end exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLocation {
    /// 1-indexed file line
    pub line: usize,
    pub key_start: usize,
    pub key_end: usize,
    pub value_start: usize,
    pub value_end: usize,
}

impl FieldLocation {
    /// Span of the value, or of the key when the value is empty.
    pub fn value_span(&self) -> (usize, usize) {
        if self.value_end > self.value_start {
            (self.value_start, self.value_end)
        } else {
            (self.key_start, self.key_end)
        }
    }

    pub fn key_span(&self) -> (usize, usize) {
        (self.key_start, self.key_end)
    }
}

impl<'a> HeaderBlock<'a> {
    /// Header lines with their 1-indexed file line numbers.
    pub fn lines(&self) -> impl Iterator<Item = (usize, &'a str)> {
        let first = self.open_line + 1;
        self.yaml
            .lines()
            .enumerate()
            .map(move |(idx, line)| (first + idx, line))
    }

    /// Find the top-level line declaring `field:`. The key may be quoted and
    /// may be followed by whitespace before the colon.
    pub fn locate_field(&self, field: &str) -> Option<FieldLocation> {
        self.lines().find_map(|(line_no, line)| {
            let key_end = match_key(line, field)?;
            let after_colon = line[key_end..]
                .trim_start_matches([' ', '\t'])
                .strip_prefix(':')?;
            let value_from = line.len() - after_colon.len();
            let (value_start, value_end) = value_span(line, value_from);
            Some(FieldLocation {
                line: line_no,
                key_start: 0,
                key_end: char_col(line, key_end),
                value_start,
                value_end,
            })
        })
    }

    /// Find `needle` inside the value of `field`, including indented list
    /// lines that follow it. Returns `(line, start_column, end_column)`.
    pub fn locate_in_field(&self, field: &str, needle: &str) -> Option<(usize, usize, usize)> {
        let start = self.locate_field(field)?;
        for (line_no, line) in self.lines().skip_while(|(n, _)| *n < start.line) {
            if line_no > start.line && is_top_level_key(line) {
                break;
            }
            let search_from = if line_no == start.line {
                line.find(':').map_or(0, |i| i + 1)
            } else {
                0
            };
            if let Some(byte) = find_token(line, needle, search_from) {
                let col = char_col(line, byte);
                return Some((line_no, col, col + needle.chars().count()));
            }
        }
        None
    }
}

/// Byte offset just past `field` (and its closing quote) when `line` starts
/// with it, bare or quoted.
fn match_key(line: &str, field: &str) -> Option<usize> {
    let rest = match line.chars().next()? {
        quote @ ('"' | '\'') => line[1..].strip_prefix(field)?.strip_prefix(quote)?,
        _ => line.strip_prefix(field)?,
    };
    Some(line.len() - rest.len())
}

fn is_top_level_key(line: &str) -> bool {
    !line.is_empty()
        && !line.starts_with(char::is_whitespace)
        && !line.starts_with('-')
        && !line.starts_with('#')
}

/// Value span after the colon, skipping whitespace, quotes and trailing
/// comments.
fn value_span(line: &str, from: usize) -> (usize, usize) {
    let after = &line[from..];
    let start = from + (after.len() - after.trim_start().len());
    let raw = &line[start..];

    let Some(first) = raw.chars().next() else {
        let col = char_col(line, start);
        return (col, col);
    };

    let (begin, end) = if first == '"' || first == '\'' {
        let inner = start + first.len_utf8();
        match line[inner..].find(first) {
            Some(close) => (inner, inner + close),
            None => (inner, start + raw.trim_end().len()),
        }
    } else {
        let unquoted = raw.find(" #").map_or(raw, |idx| &raw[..idx]);
        (start, start + unquoted.trim_end().len())
    };

    (char_col(line, begin), char_col(line, end))
}

/// Find `needle` at or after `from` where it is not part of a longer token.
fn find_token(line: &str, needle: &str, from: usize) -> Option<usize> {
    let is_word = |c: char| c.is_alphanumeric() || c == '-' || c == '_';
    line[from..]
        .match_indices(needle)
        .map(|(idx, _)| from + idx)
        .find(|&idx| {
            let before_ok = line[..idx].chars().next_back().is_none_or(|c| !is_word(c));
            let after_ok = line[idx + needle.len()..]
                .chars()
                .next()
                .is_none_or(|c| !is_word(c));
            before_ok && after_ok
        })
}

fn char_col(line: &str, byte: usize) -> usize {
    line[..byte.min(line.len())].chars().count()
}

/// Convert a byte offset into a 1-indexed line and 0-indexed character column.
pub fn line_col(text: &str, offset: usize) -> (usize, usize) {
    let before = &text[..offset.min(text.len())];
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    let line = before.matches('\n').count() + 1;
    (line, before[line_start..].chars().count())
}

// ============================================================================
// Field values
// ============================================================================

/// A frontmatter value before validation.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<FieldValue>),
    Map,
}

impl FieldValue {
    fn from_yaml(value: serde_yaml::Value) -> Self {
        use serde_yaml::Value;
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Integer(i),
                None => FieldValue::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => FieldValue::Text(s),
            Value::Sequence(items) => {
                FieldValue::List(items.into_iter().map(FieldValue::from_yaml).collect())
            }
            Value::Mapping(_) => FieldValue::Map,
            Value::Tagged(tagged) => FieldValue::from_yaml(tagged.value),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Scalar rendered as text, for permissive reads of free-form fields.
    pub fn scalar_text(&self) -> Option<String> {
        match self {
            FieldValue::Text(s) => Some(s.clone()),
            FieldValue::Integer(i) => Some(i.to_string()),
            FieldValue::Float(f) => Some(f.to_string()),
            FieldValue::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Null or whitespace-only text.
    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Bool(_) => "boolean",
            FieldValue::Integer(_) => "integer",
            FieldValue::Float(_) => "number",
            FieldValue::Text(_) => "string",
            FieldValue::List(_) => "list",
            FieldValue::Map => "mapping",
        }
    }

    /// Decode a list of ids.
    ///
    /// Accepts `- DS-001`, `- [[DS-001]]` (which YAML reads as a nested
    /// list), `"[[DS-001]]"`, and a comma separated string. Null is an empty
    /// list.
    pub fn id_list(&self) -> Result<Vec<String>, String> {
        match self {
            FieldValue::Null => Ok(Vec::new()),
            FieldValue::Text(s) => Ok(split_ids(s)),
            FieldValue::List(items) => {
                let mut ids = Vec::new();
                for item in items {
                    collect_ids(item, &mut ids)?;
                }
                Ok(ids)
            }
            other => Err(format!("expected a list, found {}", other.type_name())),
        }
    }
}

fn collect_ids(value: &FieldValue, out: &mut Vec<String>) -> Result<(), String> {
    match value {
        FieldValue::Text(s) => {
            out.push(strip_link(s).to_string());
            Ok(())
        }
        FieldValue::List(items) => items.iter().try_for_each(|item| collect_ids(item, out)),
        other => Err(format!("expected an id, found {}", other.type_name())),
    }
}

fn split_ids(s: &str) -> Vec<String> {
    s.split(',')
        .map(|part| strip_link(part).to_string())
        .filter(|part| !part.is_empty())
        .collect()
}

fn strip_link(s: &str) -> &str {
    let s = s.trim();
    s.strip_prefix("[[")
        .and_then(|inner| inner.strip_suffix("]]"))
        .unwrap_or(s)
        .trim()
}

/// Decoded header fields, in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields {
    entries: Vec<(String, FieldValue)>,
}

impl Fields {
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, value)| value)
    }

    /// Text value of a present, non-blank text field.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.get(key)
            .and_then(FieldValue::as_text)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Decode the YAML of a header block.
///
/// `yaml_first_line` is the 1-indexed file line the YAML starts on, used to
/// translate parser error locations.
pub fn parse_fields(yaml: &str, yaml_first_line: usize) -> Result<Fields, StructuralError> {
    let only_comments = yaml
        .lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with('#'));
    if only_comments {
        return Ok(Fields::default());
    }

    let value: serde_yaml::Value =
        serde_yaml::from_str(yaml).map_err(|e| StructuralError::InvalidHeader {
            line: e.location().map(|loc| loc.line() + yaml_first_line - 1),
            message: e.to_string(),
        })?;

    let mapping = match value {
        serde_yaml::Value::Null => return Ok(Fields::default()),
        serde_yaml::Value::Mapping(mapping) => mapping,
        other => {
            return Err(StructuralError::InvalidHeader {
                message: format!(
                    "frontmatter must be a mapping of keys to values, found {}",
                    FieldValue::from_yaml(other).type_name()
                ),
                line: Some(yaml_first_line),
            });
        }
    };

    let entries = mapping
        .into_iter()
        .filter_map(|(key, value)| {
            let key = match key {
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((key, FieldValue::from_yaml(value)))
        })
        .collect();

    Ok(Fields { entries })
}

/// A document split into its header block and decoded fields.
#[derive(Debug, Clone)]
pub struct Frontmatter<'a> {
    pub header: HeaderBlock<'a>,
    pub fields: Fields,
}

/// Split and decode a document's frontmatter.
pub fn read_frontmatter(text: &str) -> Result<Frontmatter<'_>, StructuralError> {
    let header = split_header(text).ok_or(StructuralError::NoFrontmatter)?;
    let fields = parse_fields(header.yaml, header.open_line + 1)?;
    Ok(Frontmatter { header, fields })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "---\nid: DS-001\ntitle: \"Login page\"\nsprint:\ndependencies:\n  - [[DS-002]]\n  - DS-010\ncreated: 2025-01-15 # first\n---\n# Body\n";

    #[test]
    fn splits_header_and_body() {
        let header = split_header(DOC).unwrap();
        assert_eq!(header.close_line, 9);
        assert_eq!(header.body, "# Body\n");
        assert!(header.yaml.starts_with("id: DS-001\n"));
    }

    #[test]
    fn no_header_without_opening_delimiter() {
        assert!(split_header("# Title\n---\n").is_none());
        assert!(split_header("").is_none());
    }

    #[test]
    fn no_header_when_never_closed() {
        assert!(split_header("---\nid: DS-001\n").is_none());
    }

    #[test]
    fn header_with_bom_and_crlf() {
        let header = split_header("\u{feff}---\r\nid: DS-001\r\n---\r\nbody").unwrap();
        assert_eq!(header.close_line, 3);
        assert_eq!(header.body, "body");
    }

    #[test]
    fn decodes_wikilink_dependencies() {
        let fm = read_frontmatter(DOC).unwrap();
        let deps = fm.fields.get("dependencies").unwrap().id_list().unwrap();
        assert_eq!(deps, vec!["DS-002".to_string(), "DS-010".to_string()]);
        assert_eq!(fm.fields.get("sprint"), Some(&FieldValue::Null));
    }

    #[test]
    fn comma_separated_ids() {
        let value = FieldValue::Text("[[DS-1]], DS-2".into());
        assert_eq!(value.id_list().unwrap(), vec!["DS-1", "DS-2"]);
        assert!(FieldValue::Integer(3).id_list().is_err());
    }

    #[test]
    fn locates_quoted_value() {
        let header = split_header(DOC).unwrap();
        let loc = header.locate_field("title").unwrap();
        assert_eq!(loc.line, 3);
        // title: "Login page"
        assert_eq!(loc.value_span(), (8, 18));
    }

    #[test]
    fn locates_value_ignoring_comment() {
        let header = split_header(DOC).unwrap();
        let loc = header.locate_field("created").unwrap();
        assert_eq!(loc.line, 8);
        assert_eq!(loc.value_span(), (9, 19));
    }

    #[test]
    fn empty_value_falls_back_to_key() {
        let header = split_header(DOC).unwrap();
        let loc = header.locate_field("sprint").unwrap();
        assert_eq!(loc.value_span(), (0, 6));
    }

    #[test]
    fn locates_spaced_and_quoted_keys() {
        let header = split_header("---\nstatus : doing\n\"size\": XL\nstatusx: no\n---\n").unwrap();

        let status = header.locate_field("status").unwrap();
        assert_eq!(status.line, 2);
        assert_eq!(status.key_span(), (0, 6));
        assert_eq!(status.value_span(), (9, 14));

        let size = header.locate_field("size").unwrap();
        assert_eq!(size.line, 3);
        assert_eq!(size.key_span(), (0, 6));
        assert_eq!(size.value_span(), (8, 10));

        assert!(header.locate_field("stat").is_none());
    }

    #[test]
    fn locates_list_items_by_whole_token() {
        let header = split_header(DOC).unwrap();
        assert_eq!(
            header.locate_in_field("dependencies", "DS-010"),
            Some((7, 4, 10))
        );
        assert_eq!(
            header.locate_in_field("dependencies", "DS-002"),
            Some((6, 6, 12))
        );
        assert_eq!(header.locate_in_field("dependencies", "DS-01"), None);
    }

    #[test]
    fn yaml_errors_carry_file_line() {
        let err = read_frontmatter("---\nid: DS-001\ntitle: [unclosed\n---\n").unwrap_err();
        match err {
            StructuralError::InvalidHeader { line, .. } => assert!(line.unwrap() >= 3),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn scalar_header_is_rejected() {
        assert!(matches!(
            read_frontmatter("---\njust text\n---\n"),
            Err(StructuralError::InvalidHeader { .. })
        ));
    }

    #[test]
    fn line_col_counts_chars() {
        let text = "ab\ncdé[[X-1]]";
        let offset = text.find("[[").unwrap();
        assert_eq!(line_col(text, offset), (2, 3));
    }
}
