//! `[[ID]]` link extraction.
//!
//! Links appear in dependency lists and in epic bodies, where they enumerate
//! the stories that belong to the epic. Navigation and hover collaborators
//! use the byte offsets to map a cursor position back to an id.

use std::sync::LazyLock;

use regex::Regex;

static LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\[([A-Z]+-(?:\d+|INBOX))\]\]").expect("link pattern is valid")
});

/// A `[[ID]]` occurrence in a text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub id: String,
    /// Byte offset of the opening `[[`
    pub start: usize,
    /// Byte offset just past the closing `]]`
    pub end: usize,
}

impl Reference {
    /// Byte range of the id itself, without brackets.
    pub fn id_range(&self) -> std::ops::Range<usize> {
        self.start + 2..self.end - 2
    }

    pub fn contains(&self, offset: usize) -> bool {
        (self.start..self.end).contains(&offset)
    }
}

/// All links in `text`, in order of appearance.
pub fn find_references(text: &str) -> Vec<Reference> {
    LINK.captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(Reference {
                id: caps[1].to_string(),
                start: whole.start(),
                end: whole.end(),
            })
        })
        .collect()
}

/// The link under `offset`, if any.
pub fn reference_at(text: &str, offset: usize) -> Option<Reference> {
    find_references(text)
        .into_iter()
        .find(|reference| reference.contains(offset))
}

/// Distinct ids linked from `text`, in order of first appearance.
pub fn referenced_ids(text: &str) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for reference in find_references(text) {
        if !ids.contains(&reference.id) {
            ids.push(reference.id);
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_links_with_offsets() {
        let text = "Stories: [[DS-001]] and [[DS-12]], see [[EPIC-INBOX]].";
        let refs = find_references(text);
        assert_eq!(refs.len(), 3);
        assert_eq!(refs[0].id, "DS-001");
        assert_eq!(&text[refs[0].start..refs[0].end], "[[DS-001]]");
        assert_eq!(&text[refs[1].id_range()], "DS-12");
        assert_eq!(refs[2].id, "EPIC-INBOX");
    }

    #[test]
    fn ignores_non_id_links() {
        assert!(find_references("[[Some Note]] [[ds-1]] [[DS-]] [DS-1]").is_empty());
    }

    #[test]
    fn reference_at_cursor() {
        let text = "see [[DS-001]] now";
        assert_eq!(reference_at(text, 7).map(|r| r.id), Some("DS-001".into()));
        assert!(reference_at(text, 2).is_none());
        assert!(reference_at(text, 14).is_none());
    }

    #[test]
    fn referenced_ids_are_distinct() {
        let ids = referenced_ids("[[DS-2]] [[DS-1]] [[DS-2]]");
        assert_eq!(ids, vec!["DS-2", "DS-1"]);
    }
}
