//! Where a workspace keeps its files.

use std::path::{Path, PathBuf};

use devstories_core::EntityKind;

/// Name of the folder holding all devstories files.
pub const DATA_DIR: &str = ".devstories";

/// Paths and globs for one workspace root.
///
/// Globs are relative to [`WorkspaceLayout::root`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceLayout {
    root: PathBuf,
}

impl WorkspaceLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join(DATA_DIR)
    }

    pub fn stories_dir(&self) -> PathBuf {
        self.data_dir().join("stories")
    }

    pub fn epics_dir(&self) -> PathBuf {
        self.data_dir().join("epics")
    }

    pub fn templates_dir(&self) -> PathBuf {
        self.data_dir().join("templates")
    }

    pub fn config_path(&self) -> PathBuf {
        self.data_dir().join("config.json")
    }

    pub fn story_glob(&self) -> String {
        format!("{DATA_DIR}/stories/*.md")
    }

    pub fn epic_glob(&self) -> String {
        format!("{DATA_DIR}/epics/*.md")
    }

    pub fn template_glob(&self) -> String {
        format!("{DATA_DIR}/templates/*.md")
    }

    pub fn config_glob(&self) -> String {
        format!("{DATA_DIR}/config.json")
    }

    /// Globs the document store watches.
    pub fn document_globs(&self) -> Vec<String> {
        vec![self.story_glob(), self.epic_glob()]
    }

    /// Globs the settings store watches.
    pub fn settings_globs(&self) -> Vec<String> {
        vec![self.config_glob(), self.template_glob()]
    }

    /// Which kind of document lives at `path`, judged by its folder.
    pub fn kind_for(&self, path: &Path) -> Option<EntityKind> {
        if path.extension().is_none_or(|ext| ext != "md") {
            return None;
        }
        let parent = path.parent()?;
        if parent == self.stories_dir() {
            Some(EntityKind::WorkItem)
        } else if parent == self.epics_dir() {
            Some(EntityKind::Grouping)
        } else {
            None
        }
    }

    pub fn is_config(&self, path: &Path) -> bool {
        path == self.config_path()
    }

    pub fn is_template(&self, path: &Path) -> bool {
        path.parent() == Some(self.templates_dir().as_path())
            && path.extension().is_some_and(|ext| ext == "md")
    }

    /// `path` relative to the root, for display.
    pub fn relative<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.root).unwrap_or(path)
    }
}

/// Find the workspace root: the nearest ancestor of `start` holding a
/// `.devstories` folder.
pub fn find_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(DATA_DIR).is_dir())
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_folders() {
        let layout = WorkspaceLayout::new("/ws");
        assert_eq!(
            layout.kind_for(Path::new("/ws/.devstories/stories/DS-001.md")),
            Some(EntityKind::WorkItem)
        );
        assert_eq!(
            layout.kind_for(Path::new("/ws/.devstories/epics/EPIC-001.md")),
            Some(EntityKind::Grouping)
        );
        assert_eq!(layout.kind_for(Path::new("/ws/.devstories/stories/notes.txt")), None);
        assert_eq!(layout.kind_for(Path::new("/ws/.devstories/stories/a/DS-1.md")), None);
        assert_eq!(layout.kind_for(Path::new("/ws/README.md")), None);
    }

    #[test]
    fn settings_paths() {
        let layout = WorkspaceLayout::new("/ws");
        assert!(layout.is_config(Path::new("/ws/.devstories/config.json")));
        assert!(layout.is_template(Path::new("/ws/.devstories/templates/bug.md")));
        assert!(!layout.is_template(Path::new("/ws/.devstories/templates/bug.txt")));
        assert_eq!(
            layout.relative(Path::new("/ws/.devstories/config.json")),
            Path::new(".devstories/config.json")
        );
    }

    #[test]
    fn find_root_walks_up() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(temp.path().join(".devstories/stories")).unwrap();
        let nested = temp.path().join("src/deep");
        std::fs::create_dir_all(&nested).unwrap();
        assert_eq!(find_root(&nested).as_deref(), Some(temp.path()));
    }
}
