//! devstories runtime: keeps an index of story and epic files in sync with
//! the filesystem and reports validation findings.
//!
//! The pieces, bottom-up:
//! - [`watcher`] turns filesystem notifications into debounced create,
//!   change and delete events for a set of globs
//! - [`store`] parses story and epic files into typed entities and answers
//!   queries
//! - [`settings`] live-reloads the settings file and templates
//! - [`diagnostics`] validates open documents and republishes whenever the
//!   store or settings change
//! - [`lsp`] and [`check`] expose all of this to editors and to the shell
//!
//! Parsing and validation themselves live in `devstories-core`.

pub mod check;
pub mod debounce;
pub mod diagnostics;
pub mod fs;
pub mod layout;
pub mod logging;
pub mod lsp;
pub mod settings;
pub mod store;
pub mod watcher;
pub mod workspace;

pub use layout::WorkspaceLayout;
pub use workspace::Workspace;
