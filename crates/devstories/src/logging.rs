//! Logging port handed to each component.
//!
//! Components never reach for a global logger. They receive a [`Logger`] at
//! construction, which tags every record with the component name through a
//! `tracing` span. The binary installs the subscriber once via [`init`].

use std::fmt::Display;

use tracing::{Level, Span};
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter directive.
pub const LOG_ENV: &str = "DEVSTORIES_LOG";

/// A named logging handle.
#[derive(Debug, Clone)]
pub struct Logger {
    span: Span,
}

impl Logger {
    /// A root logger for `component`.
    pub fn new(component: &'static str) -> Self {
        Self {
            span: tracing::span!(Level::INFO, "devstories", component),
        }
    }

    /// A logger nested under this one.
    pub fn child(&self, component: &'static str) -> Self {
        Self {
            span: tracing::span!(parent: &self.span, Level::INFO, "component", component),
        }
    }

    /// A logger that records nothing. Used by tests that do not care.
    pub fn disabled() -> Self {
        Self { span: Span::none() }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn debug(&self, message: impl Display) {
        self.span.in_scope(|| tracing::debug!("{message}"));
    }

    pub fn info(&self, message: impl Display) {
        self.span.in_scope(|| tracing::info!("{message}"));
    }

    pub fn warn(&self, message: impl Display) {
        self.span.in_scope(|| tracing::warn!("{message}"));
    }

    pub fn error(&self, message: impl Display) {
        self.span.in_scope(|| tracing::error!("{message}"));
    }
}

/// Install the stderr subscriber.
///
/// stdout stays clean for the LSP transport. The filter comes from
/// `DEVSTORIES_LOG` and defaults to `info`.
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    // A second call (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
