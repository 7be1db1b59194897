//! Common test utilities.

#![allow(dead_code)]

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use devstories::layout::WorkspaceLayout;
use tempfile::TempDir;

/// A throwaway workspace with the `.devstories/` folders in place.
pub struct TestWorkspace {
    dir: TempDir,
    pub layout: WorkspaceLayout,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        // Canonical so paths match what the OS watcher reports.
        let root = dir.path().canonicalize().expect("Failed to canonicalize");
        let layout = WorkspaceLayout::new(root);
        for folder in [layout.stories_dir(), layout.epics_dir(), layout.templates_dir()] {
            std::fs::create_dir_all(folder).expect("Failed to create folder");
        }
        Self { dir, layout }
    }

    pub fn story_path(&self, id: &str) -> PathBuf {
        self.layout.stories_dir().join(format!("{id}.md"))
    }

    pub fn epic_path(&self, id: &str) -> PathBuf {
        self.layout.epics_dir().join(format!("{id}.md"))
    }

    pub fn write_story(&self, id: &str, epic: &str, status: &str) -> PathBuf {
        let path = self.story_path(id);
        std::fs::write(&path, story(id, epic, status)).expect("Failed to write story");
        path
    }

    pub fn write_epic(&self, id: &str) -> PathBuf {
        let path = self.epic_path(id);
        std::fs::write(&path, epic(id)).expect("Failed to write epic");
        path
    }

    pub fn write_config(&self, text: &str) -> PathBuf {
        let path = self.layout.config_path();
        std::fs::write(&path, text).expect("Failed to write config");
        path
    }

    pub fn write_template(&self, name: &str, text: &str) -> PathBuf {
        let path = self.layout.templates_dir().join(format!("{name}.md"));
        std::fs::write(&path, text).expect("Failed to write template");
        path
    }

    pub fn write_raw(&self, path: &PathBuf, text: &str) {
        std::fs::write(path, text).expect("Failed to write file");
    }
}

pub fn story(id: &str, epic: &str, status: &str) -> String {
    format!(
        "---\nid: {id}\ntitle: Story {id}\ntype: feature\nepic: {epic}\nstatus: {status}\n\
         size: M\ncreated: 2025-01-15\n---\n\nBody of {id}.\n"
    )
}

pub fn epic(id: &str) -> String {
    format!("---\nid: {id}\ntitle: Epic {id}\nstatus: todo\ncreated: 2025-01-10\n---\n\n## Stories\n")
}

/// Await `future`, failing the test if it takes longer than `secs`.
pub async fn within<T>(secs: u64, future: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(secs), future)
        .await
        .expect("timed out")
}
