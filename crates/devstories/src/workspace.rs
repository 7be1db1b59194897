//! One workspace: document store, settings store and the watcher feeding them.

use std::sync::Arc;
use std::time::Duration;

use eyre::Result;

use crate::layout::WorkspaceLayout;
use crate::logging::Logger;
use crate::settings::SettingsStore;
use crate::store::DocumentStore;
use crate::watcher::FileWatcher;

pub struct Workspace {
    layout: WorkspaceLayout,
    store: Arc<DocumentStore>,
    settings: Arc<SettingsStore>,
    watcher: Option<FileWatcher>,
    log: Logger,
}

impl Workspace {
    /// Load everything and keep it current.
    ///
    /// The watcher is subscribed before the initial load so no change made
    /// during the load is missed; the store applies such changes after the
    /// load. If the watcher cannot start, the workspace is still usable with
    /// the loaded snapshot.
    pub async fn open(layout: WorkspaceLayout, window: Duration, log: Logger) -> Result<Self> {
        let store = DocumentStore::new(layout.clone(), log.child("store"));
        let settings = SettingsStore::new(layout.clone(), window, log.child("settings"));

        let watcher = FileWatcher::new(
            layout.root(),
            &layout.document_globs(),
            window,
            log.child("watcher"),
        )?;
        match watcher.start() {
            Ok(()) => store.attach(&watcher),
            Err(e) => log.warn(format_args!("Live updates disabled: {e:#}")),
        }

        store.load().await;
        settings.initialize().await;

        Ok(Self {
            layout,
            store,
            settings,
            watcher: Some(watcher),
            log,
        })
    }

    /// Load everything once, without watching.
    pub async fn load(layout: WorkspaceLayout, log: Logger) -> Self {
        let store = DocumentStore::new(layout.clone(), log.child("store"));
        let settings = SettingsStore::new(layout.clone(), Duration::ZERO, log.child("settings"));
        store.load().await;
        settings.reload_config().await;
        settings.reload_templates().await;

        Self {
            layout,
            store,
            settings,
            watcher: None,
            log,
        }
    }

    pub fn layout(&self) -> &WorkspaceLayout {
        &self.layout
    }

    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    pub fn watcher(&self) -> Option<&FileWatcher> {
        self.watcher.as_ref()
    }

    pub fn log(&self) -> &Logger {
        &self.log
    }

    /// Stop watching and silence every component.
    pub fn dispose(&self) {
        if let Some(watcher) = &self.watcher {
            watcher.dispose();
        }
        self.store.dispose();
        self.settings.dispose();
        self.log.debug("Workspace disposed");
    }
}
