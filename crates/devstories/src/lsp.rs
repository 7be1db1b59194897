//! LSP server for devstories workspaces.
//!
//! Provides:
//! - Diagnostics for story and epic files, refreshed as the workspace changes
//! - Hover on `[[ID]]` links: title, status and epic of the target
//! - Go-to-definition from a link to the file declaring the id

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use devstories_core::{Entity, reference_at};
use eyre::Result;
use tokio::task::JoinHandle;
use tower_lsp::jsonrpc::Result as LspResult;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer, LspService, Server};

use crate::diagnostics::{DiagnosticSink, DiagnosticsAdapter};
use crate::layout::WorkspaceLayout;
use crate::logging::Logger;
use crate::workspace::Workspace;

/// Publishes diagnostics to the connected editor.
pub struct ClientSink(Client);

#[async_trait]
impl DiagnosticSink for ClientSink {
    async fn publish(&self, uri: Url, diagnostics: Vec<Diagnostic>, version: Option<i32>) {
        self.0.publish_diagnostics(uri, diagnostics, version).await;
    }
}

/// Run the LSP server over stdio.
pub async fn run(layout: WorkspaceLayout, window: Duration) -> Result<()> {
    let log = Logger::new("lsp");
    let workspace = Workspace::open(layout, window, log.clone()).await?;

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();
    let (service, socket) = LspService::new(|client| Backend::new(client, workspace, log));
    Server::new(stdin, stdout, socket).serve(service).await;

    Ok(())
}

struct Backend {
    client: Client,
    workspace: Workspace,
    adapter: Arc<DiagnosticsAdapter<ClientSink>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl Backend {
    fn new(client: Client, workspace: Workspace, log: Logger) -> Self {
        let adapter = DiagnosticsAdapter::new(
            ClientSink(client.clone()),
            Arc::clone(workspace.store()),
            Arc::clone(workspace.settings()),
            log.child("diagnostics"),
        );
        Self {
            client,
            workspace,
            adapter,
            listener: Mutex::new(None),
        }
    }

    /// The link under `position` in an open document, with the id and its
    /// range in editor coordinates.
    async fn link_at(&self, uri: &Url, position: Position) -> Option<(String, Range)> {
        let text = self.adapter.document_text(uri).await?;
        let line_start = nth_line_start(&text, position.line as usize)?;
        let line = text[line_start..].lines().next().unwrap_or_default();
        let offset = line_start + char_to_byte(line, position.character as usize);

        let reference = reference_at(&text, offset)?;
        let start = reference.start - line_start;
        let end = reference.end - line_start;
        let range = Range {
            start: Position {
                line: position.line,
                character: line[..start].chars().count() as u32,
            },
            end: Position {
                line: position.line,
                character: line[..end.min(line.len())].chars().count() as u32,
            },
        };
        Some((reference.id, range))
    }

    fn lookup(&self, id: &str) -> Option<Entity> {
        let store = self.workspace.store();
        store
            .work_item(id)
            .map(Entity::WorkItem)
            .or_else(|| store.grouping(id).map(Entity::Grouping))
    }

    fn describe(&self, entity: &Entity) -> String {
        let settings = self.workspace.settings().config();
        let layout = self.workspace.layout();
        match entity {
            Entity::WorkItem(item) => {
                let mut content = format!(
                    "### {}: {}\n\n**Status:** {} · **Type:** {} · **Size:** {}",
                    item.id,
                    item.title,
                    settings.status_label(&item.status),
                    item.item_type,
                    item.size
                );
                content.push_str(&format!("\n\n**Epic:** {}", item.grouping_id));
                if let Some(sprint) = &item.sprint {
                    content.push_str(&format!(" · **Sprint:** {sprint}"));
                }
                let known = self.workspace.store().known_ids();
                let listed_in = known.groupings_listing(&item.id);
                if !listed_in.is_empty() {
                    content.push_str(&format!("\n\n**Linked from:** {}", listed_in.join(", ")));
                }
                content.push_str(&format!(
                    "\n\n*Defined in: {}*",
                    layout.relative(&item.source_path).display()
                ));
                content
            }
            Entity::Grouping(grouping) => {
                let members = self.workspace.store().work_items_by_grouping(&grouping.id);
                format!(
                    "### {}: {}\n\n**Status:** {} · **Stories:** {}\n\n*Defined in: {}*",
                    grouping.id,
                    grouping.title,
                    settings.status_label(&grouping.status),
                    members.len(),
                    layout.relative(&grouping.source_path).display()
                )
            }
        }
    }
}

/// Byte offset where 0-indexed line `n` starts.
fn nth_line_start(text: &str, n: usize) -> Option<usize> {
    if n == 0 {
        return Some(0);
    }
    text.match_indices('\n').nth(n - 1).map(|(i, _)| i + 1)
}

/// Byte offset of the `column`th char in `line`, clamped to its end.
fn char_to_byte(line: &str, column: usize) -> usize {
    line.char_indices()
        .nth(column)
        .map(|(i, _)| i)
        .unwrap_or(line.len())
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, _: InitializeParams) -> LspResult<InitializeResult> {
        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                definition_provider: Some(OneOf::Left(true)),
                text_document_sync: Some(TextDocumentSyncCapability::Options(
                    TextDocumentSyncOptions {
                        open_close: Some(true),
                        change: Some(TextDocumentSyncKind::FULL),
                        save: Some(TextDocumentSyncSaveOptions::SaveOptions(SaveOptions {
                            include_text: Some(true),
                        })),
                        ..Default::default()
                    },
                )),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: "devstories".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        let known = self.workspace.store().known_ids();
        let watching = self
            .workspace
            .watcher()
            .map_or_else(|| "live updates off".to_string(), |w| w.state().summary());
        self.client
            .log_message(
                MessageType::INFO,
                format!(
                    "devstories: {} stories, {} epics; {watching}",
                    known.work_item_count(),
                    known.grouping_count()
                ),
            )
            .await;
        self.adapter.recompute_all().await;
        let listener = self.adapter.spawn_listener();
        if let Some(old) = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(listener)
        {
            old.abort();
        }
    }

    async fn shutdown(&self) -> LspResult<()> {
        if let Some(listener) = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            listener.abort();
        }
        if let Some(watcher) = self.workspace.watcher() {
            self.workspace
                .log()
                .debug(format_args!("Shutting down, {}", watcher.state().summary()));
        }
        self.workspace.dispose();
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let document = params.text_document;
        self.adapter
            .open(document.uri, document.text, Some(document.version))
            .await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        // Full sync: the last change carries the whole text.
        if let Some(change) = params.content_changes.into_iter().last() {
            self.adapter
                .change(
                    params.text_document.uri,
                    change.text,
                    Some(params.text_document.version),
                )
                .await;
        }
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        self.adapter
            .save(params.text_document.uri, params.text)
            .await;
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        self.adapter.close(params.text_document.uri).await;
    }

    async fn hover(&self, params: HoverParams) -> LspResult<Option<Hover>> {
        let uri = &params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;

        let Some((id, range)) = self.link_at(uri, position).await else {
            return Ok(None);
        };

        let value = match self.lookup(&id) {
            Some(entity) => self.describe(&entity),
            None => format!("**Unknown id:** `{id}`"),
        };
        Ok(Some(Hover {
            contents: HoverContents::Markup(MarkupContent {
                kind: MarkupKind::Markdown,
                value,
            }),
            range: Some(range),
        }))
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> LspResult<Option<GotoDefinitionResponse>> {
        let uri = &params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;

        let Some((id, _)) = self.link_at(uri, position).await else {
            return Ok(None);
        };
        let Some(entity) = self.lookup(&id) else {
            return Ok(None);
        };
        let Ok(target) = Url::from_file_path(entity.source_path()) else {
            return Ok(None);
        };

        Ok(Some(GotoDefinitionResponse::Scalar(Location {
            uri: target,
            range: Range::default(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_starts() {
        let text = "a\nbc\n\nd";
        assert_eq!(nth_line_start(text, 0), Some(0));
        assert_eq!(nth_line_start(text, 1), Some(2));
        assert_eq!(nth_line_start(text, 2), Some(5));
        assert_eq!(nth_line_start(text, 3), Some(6));
        assert_eq!(nth_line_start(text, 4), None);
    }

    #[test]
    fn char_columns_map_to_bytes() {
        assert_eq!(char_to_byte("é[[DS-1]]", 1), 2);
        assert_eq!(char_to_byte("abc", 10), 3);
    }
}
