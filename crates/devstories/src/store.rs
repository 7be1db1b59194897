//! In-memory index of stories and epics.
//!
//! The store owns two id-keyed maps, one per document kind. It is populated
//! by [`DocumentStore::load`] and kept current by watch events. The files are
//! authoritative: every entity is a cached projection of one file.
//!
//! Queries are synchronous and return clones. Map updates happen under a
//! short write lock and never across a file read.
//!
//! Loads and watch events are applied one at a time, in order of arrival. An
//! event that arrives while a load is reading files waits for the load to
//! finish, so the load can never overwrite it with older contents.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use devstories_core::{Entity, EntityKind, Grouping, KnownIds, WorkItem, parse_file};
use futures_util::future::join_all;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex as AsyncMutex, broadcast};
use tokio::task::JoinHandle;

use crate::fs::{enumerate_async, read_text};
use crate::layout::WorkspaceLayout;
use crate::logging::Logger;
use crate::watcher::{FileWatcher, WatchEvent};

/// Fired after the maps changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreUpdate {
    /// Increases by one with every update
    pub version: u64,
}

#[derive(Default)]
struct Maps {
    work_items: HashMap<String, WorkItem>,
    groupings: HashMap<String, Grouping>,
}

impl Maps {
    /// Remove whatever entity was read from `path`. Linear in the number of
    /// entities.
    fn remove_by_path(&mut self, path: &Path) -> bool {
        let before = self.work_items.len() + self.groupings.len();
        self.work_items.retain(|_, item| item.source_path != path);
        self.groupings.retain(|_, grouping| grouping.source_path != path);
        before != self.work_items.len() + self.groupings.len()
    }

    /// Insert by declared id. Returns the path of a different file that
    /// previously owned the id.
    fn insert(&mut self, entity: Entity) -> Option<PathBuf> {
        let (previous, path) = match entity {
            Entity::WorkItem(item) => {
                let path = item.source_path.clone();
                let previous = self.work_items.insert(item.id.clone(), item);
                (previous.map(|p| p.source_path), path)
            }
            Entity::Grouping(grouping) => {
                let path = grouping.source_path.clone();
                let previous = self.groupings.insert(grouping.id.clone(), grouping);
                (previous.map(|p| p.source_path), path)
            }
        };
        previous.filter(|previous| *previous != path)
    }
}

pub struct DocumentStore {
    layout: WorkspaceLayout,
    maps: RwLock<Maps>,
    /// Held for the whole of a load or an event, reads included
    indexing: AsyncMutex<()>,
    updates: broadcast::Sender<StoreUpdate>,
    version: AtomicU64,
    disposed: AtomicBool,
    listener: Mutex<Option<JoinHandle<()>>>,
    log: Logger,
}

impl DocumentStore {
    pub fn new(layout: WorkspaceLayout, log: Logger) -> Arc<Self> {
        let (updates, _) = broadcast::channel(64);
        Arc::new(Self {
            layout,
            maps: RwLock::new(Maps::default()),
            indexing: AsyncMutex::new(()),
            updates,
            version: AtomicU64::new(0),
            disposed: AtomicBool::new(false),
            listener: Mutex::new(None),
            log,
        })
    }

    pub fn layout(&self) -> &WorkspaceLayout {
        &self.layout
    }

    fn read(&self) -> RwLockReadGuard<'_, Maps> {
        self.maps.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Maps> {
        self.maps.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify_updated(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.updates.send(StoreUpdate { version });
    }

    // ------------------------------------------------------------------------
    // Population
    // ------------------------------------------------------------------------

    /// Read every story and epic file and rebuild both maps.
    ///
    /// Files are parsed concurrently; one update is fired once all of them
    /// have settled. Files that fail to parse are skipped with a warning.
    pub async fn load(&self) {
        let _indexing = self.indexing.lock().await;
        let root = self.layout.root().to_path_buf();
        let stories = enumerate_async(root.clone(), vec![self.layout.story_glob()], &self.log);
        let epics = enumerate_async(root, vec![self.layout.epic_glob()], &self.log);
        let (stories, epics) = tokio::join!(stories, epics);

        let reads = stories
            .iter()
            .map(|path| self.read_entity(path, EntityKind::WorkItem))
            .chain(
                epics
                    .iter()
                    .map(|path| self.read_entity(path, EntityKind::Grouping)),
            );
        let entities: Vec<Entity> = join_all(reads).await.into_iter().flatten().collect();

        {
            let mut maps = self.write();
            *maps = Maps::default();
            for entity in entities {
                self.insert_logged(&mut maps, entity);
            }
            self.log.info(format_args!(
                "Loaded {} stories and {} epics",
                maps.work_items.len(),
                maps.groupings.len()
            ));
        }
        self.notify_updated();
    }

    async fn read_entity(&self, path: &Path, kind: EntityKind) -> Option<Entity> {
        let text = read_text(path, &self.log).await?;
        match parse_file(path, &text, kind) {
            Ok(entity) => Some(entity),
            Err(e) => {
                self.log.warn(format_args!(
                    "Skipping {} {}: {e}",
                    kind,
                    self.layout.relative(path).display()
                ));
                None
            }
        }
    }

    fn insert_logged(&self, maps: &mut Maps, entity: Entity) {
        let id = entity.id().to_string();
        let path = entity.source_path().to_path_buf();
        if let Some(previous) = maps.insert(entity) {
            self.log.warn(format_args!(
                "Duplicate id {id}: {} replaces {}",
                self.layout.relative(&path).display(),
                self.layout.relative(&previous).display()
            ));
        }
    }

    /// Apply one watch event.
    ///
    /// Created and changed files are re-read and re-parsed on their own. A
    /// file that no longer parses drops its entity. Deleted files drop the
    /// entity read from them, if any.
    pub async fn handle_event(&self, event: &WatchEvent) {
        let _indexing = self.indexing.lock().await;
        match event {
            WatchEvent::Created(path) | WatchEvent::Changed(path) => {
                let Some(kind) = self.layout.kind_for(path) else {
                    return;
                };
                let Some(text) = read_text(path, &self.log).await else {
                    return;
                };
                let parsed = parse_file(path, &text, kind);
                {
                    let mut maps = self.write();
                    // The file may have declared a different id before.
                    maps.remove_by_path(path);
                    match parsed {
                        Ok(entity) => self.insert_logged(&mut maps, entity),
                        Err(e) => self.log.warn(format_args!(
                            "Skipping {} {}: {e}",
                            kind,
                            self.layout.relative(path).display()
                        )),
                    }
                }
                self.notify_updated();
            }
            WatchEvent::Deleted(path) => {
                if self.write().remove_by_path(path) {
                    self.notify_updated();
                }
            }
        }
    }

    /// Follow `watcher`, applying its events in order of receipt.
    ///
    /// If this store falls behind the watcher's buffer, it reloads
    /// everything instead of guessing what it missed.
    pub fn attach(self: &Arc<Self>, watcher: &FileWatcher) {
        let mut events = watcher.subscribe();
        let store = Arc::clone(self);
        let task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => store.handle_event(&event).await,
                    Err(RecvError::Lagged(missed)) => {
                        store
                            .log
                            .warn(format_args!("Missed {missed} file events, reloading"));
                        store.load().await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        if let Some(old) = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task)
        {
            old.abort();
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreUpdate> {
        self.updates.subscribe()
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Stop following the watcher. No updates are fired afterwards.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        if let Some(task) = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub fn work_item(&self, id: &str) -> Option<WorkItem> {
        self.read().work_items.get(id).cloned()
    }

    pub fn grouping(&self, id: &str) -> Option<Grouping> {
        self.read().groupings.get(id).cloned()
    }

    /// Stories declaring membership in `grouping_id`, sorted by id.
    pub fn work_items_by_grouping(&self, grouping_id: &str) -> Vec<WorkItem> {
        let mut items: Vec<WorkItem> = self
            .read()
            .work_items
            .values()
            .filter(|item| item.grouping_id == grouping_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        items
    }

    /// All epics, sorted by id.
    pub fn groupings(&self) -> Vec<Grouping> {
        let mut groupings: Vec<Grouping> = self.read().groupings.values().cloned().collect();
        groupings.sort_by(|a, b| a.id.cmp(&b.id));
        groupings
    }

    /// All stories, sorted by id.
    pub fn work_items(&self) -> Vec<WorkItem> {
        let mut items: Vec<WorkItem> = self.read().work_items.values().cloned().collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        items
    }

    /// The entity read from `path`, if any.
    pub fn entity_at(&self, path: &Path) -> Option<Entity> {
        let maps = self.read();
        maps.work_items
            .values()
            .find(|item| item.source_path == path)
            .cloned()
            .map(Entity::WorkItem)
            .or_else(|| {
                maps.groupings
                    .values()
                    .find(|grouping| grouping.source_path == path)
                    .cloned()
                    .map(Entity::Grouping)
            })
    }

    /// Snapshot of the ids currently present, for cross-file validation.
    pub fn known_ids(&self) -> KnownIds {
        let maps = self.read();
        let mut known = KnownIds::new();
        for item in maps.work_items.values() {
            known.insert_work_item(item.id.clone(), item.source_path.clone());
        }
        for grouping in maps.groupings.values() {
            known.insert_grouping(
                grouping.id.clone(),
                grouping.source_path.clone(),
                &grouping.body,
            );
        }
        known
    }
}
