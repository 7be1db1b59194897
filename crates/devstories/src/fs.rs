//! File enumeration and reads.
//!
//! Read failures are not errors here: a file that cannot be read is treated
//! as absent for this purpose, and the caller skips the update.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::logging::Logger;
use crate::watcher::glob_to_watch_dir;

/// Compile workspace-relative globs into one matcher.
///
/// `*` does not cross `/`, so `stories/*.md` does not match nested folders.
pub fn build_globset(patterns: &[String]) -> Result<GlobSet, globset::Error> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(
            GlobBuilder::new(pattern)
                .literal_separator(true)
                .build()?,
        );
    }
    builder.build()
}

/// All files under `root` matching any of `patterns`, sorted.
///
/// Only the directories named by the glob prefixes are walked. Hidden
/// folders are walked (the data folder is one); ignore files are not
/// consulted, because the data folder is often gitignored by choice.
pub fn enumerate(root: &Path, patterns: &[String]) -> Result<Vec<PathBuf>, globset::Error> {
    let matcher = build_globset(patterns)?;
    let mut out = Vec::new();

    for pattern in patterns {
        let dir = root.join(glob_to_watch_dir(pattern));
        if !dir.is_dir() {
            continue;
        }
        let walker = ignore::WalkBuilder::new(&dir)
            .standard_filters(false)
            .follow_links(true)
            .build();

        for entry in walker.flatten() {
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }
            let path = entry.path();
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            if matcher.is_match(relative) {
                out.push(path.to_path_buf());
            }
        }
    }

    out.sort();
    out.dedup();
    Ok(out)
}

/// [`enumerate`] on the blocking pool.
pub async fn enumerate_async(
    root: PathBuf,
    patterns: Vec<String>,
    log: &Logger,
) -> Vec<PathBuf> {
    match tokio::task::spawn_blocking(move || enumerate(&root, &patterns)).await {
        Ok(Ok(paths)) => paths,
        Ok(Err(e)) => {
            log.error(format_args!("Invalid glob pattern: {e}"));
            Vec::new()
        }
        Err(e) => {
            log.error(format_args!("File enumeration task failed: {e}"));
            Vec::new()
        }
    }
}

/// Read a file as UTF-8 text, or `None` if it is missing or unreadable.
pub async fn read_text(path: &Path, log: &Logger) -> Option<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Some(text),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log.debug(format_args!("{} no longer exists", path.display()));
            None
        }
        Err(e) => {
            log.debug(format_args!("Failed to read {}: {e}", path.display()));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enumerate_respects_globs() {
        let temp = tempfile::tempdir().unwrap();
        let stories = temp.path().join(".devstories/stories");
        std::fs::create_dir_all(stories.join("archive")).unwrap();
        std::fs::write(stories.join("DS-002.md"), "").unwrap();
        std::fs::write(stories.join("DS-001.md"), "").unwrap();
        std::fs::write(stories.join("notes.txt"), "").unwrap();
        std::fs::write(stories.join("archive/DS-000.md"), "").unwrap();

        let found = enumerate(temp.path(), &[".devstories/stories/*.md".to_string()]).unwrap();
        assert_eq!(
            found,
            vec![stories.join("DS-001.md"), stories.join("DS-002.md")]
        );
    }

    #[test]
    fn enumerate_missing_folder_is_empty() {
        let temp = tempfile::tempdir().unwrap();
        let found = enumerate(temp.path(), &[".devstories/epics/*.md".to_string()]).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn invalid_glob_is_reported() {
        assert!(build_globset(&["stories/[*.md".to_string()]).is_err());
    }
}
