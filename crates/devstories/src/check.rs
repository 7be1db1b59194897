//! Batch validation of a whole workspace.

use std::path::PathBuf;

use devstories_core::{Diagnostic, EntityKind, Schemas, SettingsParseError, Severity};
use owo_colors::OwoColorize;

use crate::diagnostics::document_diagnostics;
use crate::fs::{enumerate_async, read_text};
use crate::workspace::Workspace;

/// Findings for one file.
#[derive(Debug, Clone)]
pub struct FileReport {
    pub path: PathBuf,
    pub kind: EntityKind,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Default)]
pub struct CheckReport {
    /// Every story and epic file, including those without findings
    pub files: Vec<FileReport>,
    pub settings_error: Option<SettingsParseError>,
    /// Settings sections dropped while the rest of the file applied
    pub settings_warnings: Vec<SettingsParseError>,
}

impl CheckReport {
    pub fn error_count(&self) -> usize {
        self.count(Severity::Error) + usize::from(self.settings_error.is_some())
    }

    pub fn warning_count(&self) -> usize {
        self.count(Severity::Warning) + self.settings_warnings.len()
    }

    fn count(&self, severity: Severity) -> usize {
        self.files
            .iter()
            .flat_map(|file| &file.diagnostics)
            .filter(|d| d.severity == severity)
            .count()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }
}

/// Validate every story and epic file on disk.
///
/// Files are read from disk rather than taken from the store, so files the
/// store skipped (unparseable ones) are reported too.
pub async fn run_check(workspace: &Workspace) -> CheckReport {
    let layout = workspace.layout();
    let settings = workspace.settings().config();
    let known = workspace.store().known_ids();
    let schemas = Schemas::builtin();
    let log = workspace.log();

    let mut files = Vec::new();
    for (kind, glob) in [
        (EntityKind::WorkItem, layout.story_glob()),
        (EntityKind::Grouping, layout.epic_glob()),
    ] {
        let paths = enumerate_async(layout.root().to_path_buf(), vec![glob], log).await;
        for path in paths {
            let Some(text) = read_text(&path, log).await else {
                continue;
            };
            let diagnostics =
                document_diagnostics(&path, &text, kind, &settings, &schemas, &known);
            files.push(FileReport {
                path,
                kind,
                diagnostics,
            });
        }
    }

    CheckReport {
        files,
        settings_error: workspace.settings().config_error(),
        settings_warnings: workspace.settings().ignored_sections(),
    }
}

fn severity_label(severity: Severity) -> String {
    match severity {
        Severity::Error => severity.as_str().red().bold().to_string(),
        Severity::Warning => severity.as_str().yellow().bold().to_string(),
    }
}

/// Render a report as colored text.
pub fn render_report(report: &CheckReport, workspace: &Workspace) -> String {
    let layout = workspace.layout();
    let config_path = layout.config_path();
    let mut output = String::new();

    let settings_issues = report
        .settings_error
        .iter()
        .map(|error| (Severity::Error, error))
        .chain(
            report
                .settings_warnings
                .iter()
                .map(|warning| (Severity::Warning, warning)),
        );
    for (severity, issue) in settings_issues {
        let location = match (issue.line, issue.column) {
            (Some(line), Some(column)) => format!(":{line}:{column}"),
            _ => String::new(),
        };
        output.push_str(&format!(
            "{}{}: {}: {}\n",
            layout.relative(&config_path).display(),
            location,
            severity_label(severity),
            issue.message
        ));
    }

    for file in &report.files {
        for d in &file.diagnostics {
            let field = d
                .field
                .as_deref()
                .map(|f| format!(" [{}]", f.dimmed()))
                .unwrap_or_default();
            output.push_str(&format!(
                "{}:{}:{}: {}: {}{}\n",
                layout.relative(&file.path).display(),
                d.line,
                d.column + 1,
                severity_label(d.severity),
                d.message,
                field
            ));
        }
    }

    let stories = report
        .files
        .iter()
        .filter(|f| f.kind == EntityKind::WorkItem)
        .count();
    let epics = report.files.len() - stories;
    let summary = format!(
        "Checked {stories} stories and {epics} epics: {} errors, {} warnings",
        report.error_count(),
        report.warning_count()
    );
    if report.has_errors() {
        output.push_str(&format!("{} {}\n", "!".red().bold(), summary));
    } else {
        output.push_str(&format!("{} {}\n", "OK".green().bold(), summary));
    }
    output
}
