//! File watcher with per-path debouncing and health monitoring.
//!
//! ## Architecture
//!
//! - `FileWatcher` owns the OS watcher and turns raw notifications into
//!   [`WatchEvent`]s for files matching a set of workspace-relative globs
//! - `WatcherState` tracks health status for monitoring
//!
//! `Created` and `Deleted` are emitted immediately. `Changed` is debounced
//! per path: repeated changes within the window collapse into one event,
//! emitted one window after the last change.
//!
//! Only the directories named by the glob prefixes are watched, not the
//! whole workspace root.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use eyre::{Result, WrapErr};
use globset::GlobSet;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::debounce::Debouncer;
use crate::fs::build_globset;
use crate::logging::Logger;

// ============================================================================
// Watch Events
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchEventKind {
    Created,
    Changed,
    Deleted,
}

/// A file matching the watched globs appeared, changed or disappeared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Created(PathBuf),
    Changed(PathBuf),
    Deleted(PathBuf),
}

impl WatchEvent {
    pub fn kind(&self) -> WatchEventKind {
        match self {
            WatchEvent::Created(_) => WatchEventKind::Created,
            WatchEvent::Changed(_) => WatchEventKind::Changed,
            WatchEvent::Deleted(_) => WatchEventKind::Deleted,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            WatchEvent::Created(path) | WatchEvent::Changed(path) | WatchEvent::Deleted(path) => {
                path
            }
        }
    }
}

// ============================================================================
// Watcher State (Health Monitoring)
// ============================================================================

/// Shared state for monitoring watcher health.
///
/// Shared between the watcher and whoever hosts it, so the host can report
/// whether live updates are working.
#[derive(Default)]
pub struct WatcherState {
    active: AtomicBool,
    /// Millis since UNIX epoch, 0 when no event was seen yet
    last_event_ms: AtomicU64,
    event_count: AtomicU64,
    watched_dirs: RwLock<Vec<PathBuf>>,
    /// Set when the watcher failed, cleared when it becomes active again
    error: RwLock<Option<String>>,
}

impl WatcherState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn mark_active(&self) {
        self.active.store(true, Ordering::SeqCst);
        *self.error.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn mark_failed(&self, error: String) {
        self.active.store(false, Ordering::SeqCst);
        *self.error.write().unwrap_or_else(PoisonError::into_inner) = Some(error);
    }

    /// Mark a clean stop.
    pub fn mark_stopped(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    pub fn record_event(&self) {
        self.event_count.fetch_add(1, Ordering::SeqCst);
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        self.last_event_ms.store(now, Ordering::SeqCst);
    }

    pub fn set_watched_dirs(&self, dirs: Vec<PathBuf>) {
        *self.watched_dirs.write().unwrap_or_else(PoisonError::into_inner) = dirs;
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn last_event_ms(&self) -> Option<u64> {
        let ms = self.last_event_ms.load(Ordering::SeqCst);
        if ms == 0 { None } else { Some(ms) }
    }

    pub fn event_count(&self) -> u64 {
        self.event_count.load(Ordering::SeqCst)
    }

    pub fn watched_dirs(&self) -> Vec<PathBuf> {
        self.watched_dirs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn error(&self) -> Option<String> {
        self.error
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// One line describing the watcher, for logs and status messages.
    pub fn summary(&self) -> String {
        if let Some(error) = self.error() {
            return format!("live updates failed: {error}");
        }
        if !self.is_active() {
            return "live updates off".to_string();
        }
        let dirs = self.watched_dirs();
        if dirs.is_empty() {
            return "live updates on, nothing to watch yet".to_string();
        }
        let last = match self.last_event_ms() {
            Some(ms) => {
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_millis() as u64;
                format!(", last {}s ago", now.saturating_sub(ms) / 1000)
            }
            None => String::new(),
        };
        format!(
            "watching {} director{}, {} events{}",
            dirs.len(),
            if dirs.len() == 1 { "y" } else { "ies" },
            self.event_count(),
            last
        )
    }
}

// ============================================================================
// Glob Pattern Utilities
// ============================================================================

/// Extract the directory prefix from a glob pattern.
///
/// This finds the longest path prefix before any glob metacharacter.
///
/// ```
/// # use std::path::PathBuf;
/// # use devstories::watcher::glob_to_watch_dir;
/// assert_eq!(glob_to_watch_dir(".devstories/stories/*.md"), PathBuf::from(".devstories/stories"));
/// assert_eq!(glob_to_watch_dir("*.md"), PathBuf::from("."));
/// ```
pub fn glob_to_watch_dir(pattern: &str) -> PathBuf {
    let mut result = PathBuf::new();

    for component in Path::new(pattern).components() {
        let s = component.as_os_str().to_string_lossy();
        if s.contains(['*', '?', '[', '{']) {
            break;
        }
        result.push(component);
    }

    if result.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        result
    }
}

/// Directories to watch (recursively) so every file matching `patterns`
/// under `root` is seen.
///
/// A literal file pattern watches its parent, so atomic saves that replace
/// the file are still seen. A directory that does not exist yet is covered
/// by its nearest existing ancestor below `root`; `root` itself is only
/// watched for patterns that live directly in it, so a missing folder never
/// widens the watch to the whole workspace. Directories already covered by
/// another watched directory are dropped.
pub fn watch_dirs(root: &Path, patterns: &[String]) -> Vec<PathBuf> {
    let mut dirs = BTreeSet::new();

    for pattern in patterns {
        let prefix = glob_to_watch_dir(pattern);
        let target = if prefix == Path::new(pattern) {
            root.join(prefix.parent().unwrap_or(Path::new(".")))
        } else {
            root.join(prefix)
        };
        let existing = target
            .ancestors()
            .take_while(|dir| dir.starts_with(root))
            .find(|dir| dir.is_dir());
        match existing {
            Some(dir) if dir != root || target == root => {
                dirs.insert(dir.to_path_buf());
            }
            _ => {}
        }
    }

    let all: Vec<PathBuf> = dirs.into_iter().collect();
    all.iter()
        .filter(|dir| !all.iter().any(|other| other != *dir && dir.starts_with(other)))
        .cloned()
        .collect()
}

/// Translate one OS notification into watch events.
///
/// Access and metadata-only notifications are dropped.
pub fn classify(event: &Event) -> Vec<(WatchEventKind, PathBuf)> {
    let each = |kind: WatchEventKind| -> Vec<(WatchEventKind, PathBuf)> {
        event.paths.iter().map(|p| (kind, p.clone())).collect()
    };

    match &event.kind {
        EventKind::Create(_) => each(WatchEventKind::Created),
        EventKind::Remove(_) => each(WatchEventKind::Deleted),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => each(WatchEventKind::Deleted),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => each(WatchEventKind::Created),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => vec![
            (WatchEventKind::Deleted, event.paths[0].clone()),
            (WatchEventKind::Created, event.paths[1].clone()),
        ],
        EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .iter()
            .map(|p| {
                let kind = if p.exists() {
                    WatchEventKind::Created
                } else {
                    WatchEventKind::Deleted
                };
                (kind, p.clone())
            })
            .collect(),
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(_) => each(WatchEventKind::Changed),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}

// ============================================================================
// File Watcher
// ============================================================================

const EVENT_CAPACITY: usize = 1024;

struct Shared {
    root: PathBuf,
    patterns: Vec<String>,
    matcher: GlobSet,
    events: broadcast::Sender<WatchEvent>,
    debouncer: Debouncer<PathBuf>,
    state: Arc<WatcherState>,
    disposed: AtomicBool,
    log: Logger,
}

impl Shared {
    fn dispatch(self: &Arc<Self>, kind: WatchEventKind, path: PathBuf) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return;
        };
        if !self.matcher.is_match(relative) {
            return;
        }
        self.state.record_event();

        match kind {
            WatchEventKind::Created => self.emit(WatchEvent::Created(path)),
            WatchEventKind::Deleted => {
                self.debouncer.cancel(&path);
                self.emit(WatchEvent::Deleted(path));
            }
            WatchEventKind::Changed => {
                let shared = Arc::clone(self);
                self.debouncer.schedule(path.clone(), async move {
                    shared.emit(WatchEvent::Changed(path));
                });
            }
        }
    }

    fn emit(&self, event: WatchEvent) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        self.log.debug(format_args!("{:?}", event));
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }
}

/// Watches a set of workspace-relative globs.
pub struct FileWatcher {
    shared: Arc<Shared>,
    os: Mutex<Option<RecommendedWatcher>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl FileWatcher {
    /// Create a watcher for `patterns` under `root`.
    ///
    /// Nothing is watched until [`FileWatcher::start`]; events can still be
    /// fed through [`FileWatcher::inject`].
    pub fn new(
        root: impl Into<PathBuf>,
        patterns: &[String],
        window: Duration,
        log: Logger,
    ) -> Result<Self> {
        let matcher = build_globset(patterns)
            .wrap_err_with(|| format!("Invalid watch pattern in {patterns:?}"))?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            shared: Arc::new(Shared {
                root: root.into(),
                patterns: patterns.to_vec(),
                matcher,
                events,
                debouncer: Debouncer::new(window),
                state: WatcherState::new(),
                disposed: AtomicBool::new(false),
                log,
            }),
            os: Mutex::new(None),
            pump: Mutex::new(None),
        })
    }

    /// Subscribe to the OS change notifications.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<()> {
        let shared = &self.shared;
        if shared.disposed.load(Ordering::SeqCst) {
            return Ok(());
        }

        let (tx, mut rx) = mpsc::channel::<notify::Result<Event>>(256);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            // Fails only once the pump has stopped.
            let _ = tx.blocking_send(res);
        })
        .wrap_err("Failed to create file watcher")
        .inspect_err(|e| shared.state.mark_failed(format!("{e:#}")))?;

        let dirs = watch_dirs(&shared.root, &shared.patterns);
        for dir in &dirs {
            if let Err(e) = watcher
                .watch(dir, RecursiveMode::Recursive)
                .wrap_err_with(|| format!("Failed to watch {}", dir.display()))
            {
                shared.state.mark_failed(format!("{e:#}"));
                return Err(e);
            }
            shared.log.info(format_args!("Watching directory: {}", dir.display()));
        }
        if dirs.is_empty() {
            shared.log.warn(format_args!(
                "Nothing to watch under {}",
                shared.root.display()
            ));
        }

        let pump_shared = Arc::clone(shared);
        let pump = tokio::spawn(async move {
            while let Some(res) = rx.recv().await {
                match res {
                    Ok(event) => {
                        for (kind, path) in classify(&event) {
                            pump_shared.dispatch(kind, path);
                        }
                    }
                    Err(e) => pump_shared.log.warn(format_args!("File watcher error: {e}")),
                }
            }
        });

        shared.state.set_watched_dirs(dirs);
        shared.state.mark_active();
        *self.os.lock().unwrap_or_else(PoisonError::into_inner) = Some(watcher);
        if let Some(old) = self.pump.lock().unwrap_or_else(PoisonError::into_inner).replace(pump) {
            old.abort();
        }
        Ok(())
    }

    /// Feed an event as if the OS had reported it. Globs and debouncing
    /// apply as usual.
    pub fn inject(&self, kind: WatchEventKind, path: impl Into<PathBuf>) {
        self.shared.dispatch(kind, path.into());
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.shared.events.subscribe()
    }

    pub fn state(&self) -> Arc<WatcherState> {
        Arc::clone(&self.shared.state)
    }

    pub fn root(&self) -> &Path {
        &self.shared.root
    }

    /// Whether `path` matches one of the watched globs.
    pub fn matches(&self, path: &Path) -> bool {
        path.strip_prefix(&self.shared.root)
            .is_ok_and(|relative| self.shared.matcher.is_match(relative))
    }

    /// Number of paths with a debounced change still pending.
    pub fn pending_changes(&self) -> usize {
        self.shared.debouncer.pending()
    }

    /// Cancel pending timers and detach from the OS. Nothing is emitted
    /// afterwards.
    pub fn dispose(&self) {
        let shared = &self.shared;
        if shared.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        shared.debouncer.dispose();
        self.os.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(pump) = self.pump.lock().unwrap_or_else(PoisonError::into_inner).take() {
            pump.abort();
        }
        shared.state.mark_stopped();
        shared.log.debug("File watcher disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::SeqCst)
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.dispose();
    }
}

// ============================================================================
// Tests
// ============================================================================
