//! Live-reloading settings and templates.
//!
//! Two concerns are tracked independently: the settings file and the
//! templates folder. Each reload is debounced per concern. A settings file
//! that fails to parse keeps the last good snapshot and is reported through
//! [`SettingsEvent::ParseError`]; a missing or empty one yields defaults.
//! Sections dropped from an otherwise usable file are kept as
//! [`SettingsStore::ignored_sections`].
//!
//! Reloads of one concern are serialized, so a slow read can never replace
//! the snapshot taken from a newer one.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use devstories_core::{
    ItemType, Settings, SettingsParseError, Template, merge_with_defaults, parse_settings,
    parse_template,
};
use eyre::Result;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex as AsyncMutex, broadcast};
use tokio::task::JoinHandle;

use crate::debounce::Debouncer;
use crate::fs::{enumerate_async, read_text};
use crate::layout::WorkspaceLayout;
use crate::logging::Logger;
use crate::watcher::FileWatcher;

/// What changed.
#[derive(Debug, Clone)]
pub enum SettingsEvent {
    ConfigChanged(Arc<Settings>),
    TemplatesChanged(Arc<Vec<Template>>),
    /// The settings file is invalid; the previous snapshot stays in effect.
    ParseError(SettingsParseError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Concern {
    Config,
    Templates,
}

pub struct SettingsStore {
    layout: WorkspaceLayout,
    config: RwLock<Arc<Settings>>,
    config_error: RwLock<Option<SettingsParseError>>,
    ignored_sections: RwLock<Vec<SettingsParseError>>,
    templates: RwLock<Arc<Vec<Template>>>,
    config_reload: AsyncMutex<()>,
    templates_reload: AsyncMutex<()>,
    events: broadcast::Sender<SettingsEvent>,
    debouncer: Debouncer<Concern>,
    watcher: Mutex<Option<FileWatcher>>,
    listener: Mutex<Option<JoinHandle<()>>>,
    disposed: AtomicBool,
    log: Logger,
}

impl SettingsStore {
    /// A store holding defaults and no templates. Nothing is read until
    /// [`SettingsStore::initialize`] or an explicit reload.
    pub fn new(layout: WorkspaceLayout, window: Duration, log: Logger) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            layout,
            config: RwLock::new(Arc::new(Settings::default())),
            config_error: RwLock::new(None),
            ignored_sections: RwLock::new(Vec::new()),
            templates: RwLock::new(Arc::new(Vec::new())),
            config_reload: AsyncMutex::new(()),
            templates_reload: AsyncMutex::new(()),
            events,
            debouncer: Debouncer::new(window),
            watcher: Mutex::new(None),
            listener: Mutex::new(None),
            disposed: AtomicBool::new(false),
            log,
        })
    }

    /// Load the settings file and templates once, then watch both.
    ///
    /// A watcher that cannot be started is logged; the store keeps working
    /// with what it loaded.
    pub async fn initialize(self: &Arc<Self>) {
        self.reload_config().await;
        self.reload_templates().await;

        match self.start_watching() {
            Ok(watcher) => {
                self.attach(&watcher);
                *self.watcher.lock().unwrap_or_else(PoisonError::into_inner) = Some(watcher);
            }
            Err(e) => self
                .log
                .warn(format_args!("Settings will not live-reload: {e:#}")),
        }
    }

    fn start_watching(&self) -> Result<FileWatcher> {
        let watcher = FileWatcher::new(
            self.layout.root(),
            &self.layout.settings_globs(),
            self.debouncer.window(),
            self.log.child("settings-watcher"),
        )?;
        watcher.start()?;
        Ok(watcher)
    }

    /// Follow `watcher`: any event on the settings file or a template
    /// schedules a debounced reload of that concern.
    pub fn attach(self: &Arc<Self>, watcher: &FileWatcher) {
        let mut events = watcher.subscribe();
        let store = Arc::clone(self);
        let task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if let Some(concern) = store.concern_for(event.path()) {
                            store.schedule(concern);
                        }
                    }
                    Err(RecvError::Lagged(_)) => {
                        store.schedule(Concern::Config);
                        store.schedule(Concern::Templates);
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

    fn concern_for(&self, path: &Path) -> Option<Concern> {
        if self.layout.is_config(path) {
            Some(Concern::Config)
        } else if self.layout.is_template(path) {
            Some(Concern::Templates)
        } else {
            None
        }
    }

    fn schedule(self: &Arc<Self>, concern: Concern) {
        let store = Arc::clone(self);
        self.debouncer.schedule(concern, async move {
            match concern {
                Concern::Config => store.reload_config().await,
                Concern::Templates => store.reload_templates().await,
            }
        });
    }

    fn emit(&self, event: SettingsEvent) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        let _ = self.events.send(event);
    }

    /// Re-read the settings file.
    ///
    /// Missing or blank: defaults. Invalid: keep the current snapshot and
    /// emit a parse error. Unreadable for another reason: skip.
    pub async fn reload_config(&self) {
        let _reloading = self.config_reload.lock().await;
        let path = self.layout.config_path();
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.log.debug(format_args!(
                    "No settings file at {}, using defaults",
                    path.display()
                ));
                String::new()
            }
            Err(e) => {
                self.log
                    .debug(format_args!("Failed to read {}: {e}", path.display()));
                return;
            }
        };

        match parse_settings(&text) {
            Ok(mut partial) => {
                let ignored = std::mem::take(&mut partial.rejected);
                for issue in &ignored {
                    self.log.warn(format_args!(
                        "Ignoring part of {}: {issue}",
                        path.display()
                    ));
                }
                let settings = Arc::new(merge_with_defaults(partial));
                *self.config.write().unwrap_or_else(PoisonError::into_inner) =
                    Arc::clone(&settings);
                *self.config_error.write().unwrap_or_else(PoisonError::into_inner) = None;
                *self
                    .ignored_sections
                    .write()
                    .unwrap_or_else(PoisonError::into_inner) = ignored;
                self.log.info("Settings reloaded");
                self.emit(SettingsEvent::ConfigChanged(settings));
            }
            Err(e) => {
                self.log.warn(format_args!(
                    "Settings file {} has errors, keeping previous settings: {e}",
                    path.display()
                ));
                *self
                    .config_error
                    .write()
                    .unwrap_or_else(PoisonError::into_inner) = Some(e.clone());
                self.ignored_sections
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clear();
                self.emit(SettingsEvent::ParseError(e));
            }
        }
    }

    /// Re-read every template file and replace the list.
    pub async fn reload_templates(&self) {
        let _reloading = self.templates_reload.lock().await;
        let paths = enumerate_async(
            self.layout.root().to_path_buf(),
            vec![self.layout.template_glob()],
            &self.log,
        )
        .await;

        let mut templates = Vec::with_capacity(paths.len());
        for path in &paths {
            let Some(text) = read_text(path, &self.log).await else {
                continue;
            };
            let name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
            templates.push(parse_template(&name, &text));
        }
        templates.sort_by(|a, b| a.name.cmp(&b.name));

        let templates = Arc::new(templates);
        *self.templates.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&templates);
        self.log
            .debug(format_args!("Loaded {} templates", templates.len()));
        self.emit(SettingsEvent::TemplatesChanged(templates));
    }

    /// The current settings snapshot.
    pub fn config(&self) -> Arc<Settings> {
        Arc::clone(&self.config.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// The error from the last reload, if it failed.
    pub fn config_error(&self) -> Option<SettingsParseError> {
        self.config_error
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Sections of the current settings file that were dropped while the
    /// rest applied.
    pub fn ignored_sections(&self) -> Vec<SettingsParseError> {
        self.ignored_sections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn templates(&self) -> Arc<Vec<Template>> {
        Arc::clone(&self.templates.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Templates offered for a new story of `item_type`.
    pub fn templates_for(&self, item_type: ItemType) -> Vec<Template> {
        self.templates()
            .iter()
            .filter(|template| template.applies_to(item_type))
            .cloned()
            .collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SettingsEvent> {
        self.events.subscribe()
    }

    /// Cancel pending reloads and stop watching. No events are emitted
    /// afterwards.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        self.debouncer.dispose();
        if let Some(task) = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
        if let Some(watcher) = self
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            watcher.dispose();
        }
    }
}
