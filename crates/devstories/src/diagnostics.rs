//! Drives validation for open documents and publishes the results.
//!
//! The adapter validates a document when it is opened, changed or saved,
//! clears it when closed, and revalidates every open document when the
//! document store or the settings change, since known ids and vocabulary
//! may have moved under it.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use devstories_core::{
    Diagnostic, EntityKind, KnownIds, Schemas, Settings, SettingsParseError, Severity, validate,
    validate_duplicate_id,
};
use tokio::sync::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tower_lsp::lsp_types::{self as lsp, Url};

use crate::logging::Logger;
use crate::settings::SettingsStore;
use crate::store::DocumentStore;

/// Value of `source` on every published diagnostic.
pub const SOURCE: &str = "devstories";

/// All findings for one document: schema, vocabulary, cross-file and
/// duplicate id.
pub fn document_diagnostics(
    path: &Path,
    text: &str,
    kind: EntityKind,
    settings: &Settings,
    schemas: &Schemas,
    known: &KnownIds,
) -> Vec<Diagnostic> {
    let mut diagnostics = validate(text, kind, settings, schemas, Some(known));
    diagnostics.extend(validate_duplicate_id(text, kind, path, known));
    diagnostics
}

/// Convert a finding to the editor's 0-indexed representation.
pub fn to_lsp(diagnostic: &Diagnostic) -> lsp::Diagnostic {
    let line = diagnostic.line.saturating_sub(1) as u32;
    lsp::Diagnostic {
        range: lsp::Range {
            start: lsp::Position {
                line,
                character: diagnostic.column as u32,
            },
            end: lsp::Position {
                line,
                character: diagnostic.end_column as u32,
            },
        },
        severity: Some(match diagnostic.severity {
            Severity::Error => lsp::DiagnosticSeverity::ERROR,
            Severity::Warning => lsp::DiagnosticSeverity::WARNING,
        }),
        code: diagnostic
            .field
            .as_ref()
            .map(|field| lsp::NumberOrString::String(field.clone())),
        source: Some(SOURCE.into()),
        message: diagnostic.message.clone(),
        ..Default::default()
    }
}

/// A settings problem as a diagnostic on the settings file. Errors mean the
/// whole file was rejected; warnings mean one section was dropped.
fn settings_issue_to_lsp(error: &SettingsParseError, severity: Severity) -> lsp::Diagnostic {
    let position = lsp::Position {
        line: error.line.unwrap_or(1).saturating_sub(1) as u32,
        character: error.column.unwrap_or(1).saturating_sub(1) as u32,
    };
    let (severity, code, message) = match severity {
        Severity::Error => (
            lsp::DiagnosticSeverity::ERROR,
            "config-error",
            format!("Settings not applied: {}", error.message),
        ),
        Severity::Warning => (
            lsp::DiagnosticSeverity::WARNING,
            "config-ignored",
            format!("Setting ignored: {}", error.message),
        ),
    };
    lsp::Diagnostic {
        range: lsp::Range {
            start: position,
            end: position,
        },
        severity: Some(severity),
        code: Some(lsp::NumberOrString::String(code.into())),
        source: Some(SOURCE.into()),
        message,
        ..Default::default()
    }
}

/// Where diagnostics go.
#[async_trait]
pub trait DiagnosticSink: Send + Sync + 'static {
    async fn publish(&self, uri: Url, diagnostics: Vec<lsp::Diagnostic>, version: Option<i32>);
}

struct OpenDocument {
    kind: EntityKind,
    text: String,
    version: Option<i32>,
}

pub struct DiagnosticsAdapter<S> {
    sink: S,
    store: Arc<DocumentStore>,
    settings: Arc<SettingsStore>,
    schemas: Schemas,
    documents: Mutex<HashMap<Url, OpenDocument>>,
    /// Whether settings problems are currently shown on the settings file
    config_flagged: AtomicBool,
    log: Logger,
}

impl<S: DiagnosticSink> DiagnosticsAdapter<S> {
    pub fn new(
        sink: S,
        store: Arc<DocumentStore>,
        settings: Arc<SettingsStore>,
        log: Logger,
    ) -> Arc<Self> {
        Arc::new(Self {
            sink,
            store,
            settings,
            schemas: Schemas::builtin(),
            documents: Mutex::new(HashMap::new()),
            config_flagged: AtomicBool::new(false),
            log,
        })
    }

    fn kind_for(&self, uri: &Url) -> Option<EntityKind> {
        let path = uri.to_file_path().ok()?;
        self.store.layout().kind_for(&path)
    }

    /// Findings for `text` as if it were the file behind `uri`.
    pub fn compute(&self, uri: &Url, kind: EntityKind, text: &str) -> Vec<Diagnostic> {
        let path = uri.to_file_path().unwrap_or_default();
        let settings = self.settings.config();
        let known = self.store.known_ids();
        document_diagnostics(&path, text, kind, &settings, &self.schemas, &known)
    }

    async fn publish_document(&self, uri: Url, kind: EntityKind, text: &str, version: Option<i32>) {
        let diagnostics: Vec<lsp::Diagnostic> =
            self.compute(&uri, kind, text).iter().map(to_lsp).collect();
        self.log.debug(format_args!(
            "{} diagnostics for {}",
            diagnostics.len(),
            uri
        ));
        self.sink.publish(uri, diagnostics, version).await;
    }

    /// Start tracking a document. Files outside the story and epic folders
    /// are ignored.
    pub async fn open(&self, uri: Url, text: String, version: Option<i32>) {
        let Some(kind) = self.kind_for(&uri) else {
            return;
        };
        self.documents.lock().await.insert(
            uri.clone(),
            OpenDocument {
                kind,
                text: text.clone(),
                version,
            },
        );
        self.publish_document(uri, kind, &text, version).await;
    }

    /// Replace a tracked document's text and revalidate it.
    pub async fn change(&self, uri: Url, text: String, version: Option<i32>) {
        let kind = {
            let mut documents = self.documents.lock().await;
            let Some(document) = documents.get_mut(&uri) else {
                return;
            };
            document.text = text.clone();
            document.version = version;
            document.kind
        };
        self.publish_document(uri, kind, &text, version).await;
    }

    /// Revalidate on save, with the saved text when the editor sends it.
    pub async fn save(&self, uri: Url, text: Option<String>) {
        let (kind, text, version) = {
            let mut documents = self.documents.lock().await;
            let Some(document) = documents.get_mut(&uri) else {
                return;
            };
            if let Some(text) = text {
                document.text = text;
            }
            (document.kind, document.text.clone(), document.version)
        };
        self.publish_document(uri, kind, &text, version).await;
    }

    /// Stop tracking a document and clear its diagnostics.
    pub async fn close(&self, uri: Url) {
        if self.documents.lock().await.remove(&uri).is_some() {
            self.sink.publish(uri, Vec::new(), None).await;
        }
    }

    /// Revalidate every open document and refresh the settings problems.
    pub async fn recompute_all(&self) {
        let open: Vec<(Url, EntityKind, String, Option<i32>)> = self
            .documents
            .lock()
            .await
            .iter()
            .map(|(uri, doc)| (uri.clone(), doc.kind, doc.text.clone(), doc.version))
            .collect();

        for (uri, kind, text, version) in open {
            self.publish_document(uri, kind, &text, version).await;
        }
        self.publish_settings_issues().await;
    }

    async fn publish_settings_issues(&self) {
        let Ok(uri) = Url::from_file_path(self.store.layout().config_path()) else {
            return;
        };
        let issues: Vec<lsp::Diagnostic> = match self.settings.config_error() {
            Some(error) => vec![settings_issue_to_lsp(&error, Severity::Error)],
            None => self
                .settings
                .ignored_sections()
                .iter()
                .map(|issue| settings_issue_to_lsp(issue, Severity::Warning))
                .collect(),
        };
        if issues.is_empty() {
            if self.config_flagged.swap(false, Ordering::SeqCst) {
                self.sink.publish(uri, Vec::new(), None).await;
            }
        } else {
            self.config_flagged.store(true, Ordering::SeqCst);
            self.sink.publish(uri, issues, None).await;
        }
    }

    /// Revalidate whenever the store or the settings change.
    pub fn spawn_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let adapter = Arc::clone(self);
        let mut updates = self.store.subscribe();
        let mut settings_events = self.settings.subscribe();
        tokio::spawn(async move {
            loop {
                let closed = tokio::select! {
                    res = updates.recv() => matches!(res, Err(RecvError::Closed)),
                    res = settings_events.recv() => matches!(res, Err(RecvError::Closed)),
                };
                if closed {
                    break;
                }
                adapter.recompute_all().await;
            }
        })
    }

    pub async fn open_documents(&self) -> usize {
        self.documents.lock().await.len()
    }

    /// Latest text the editor sent for `uri`.
    pub async fn document_text(&self, uri: &Url) -> Option<String> {
        self.documents
            .lock()
            .await
            .get(uri)
            .map(|document| document.text.clone())
    }
}
