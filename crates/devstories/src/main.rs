//! devstories - live index and validator for markdown backlogs
//!
//! `devstories lsp` serves diagnostics, hover and go-to-definition over stdio.
//! `devstories check` validates the whole workspace once and exits non-zero
//! when any error is found.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use devstories::check::{render_report, run_check};
use devstories::debounce::DEBOUNCE_WINDOW;
use devstories::layout::{WorkspaceLayout, find_root};
use devstories::logging::{self, Logger};
use devstories::{Workspace, lsp};
use eyre::{Result, WrapErr};

#[derive(Debug, Parser)]
#[command(name = "devstories", version, about)]
struct Args {
    /// Workspace root (default: nearest ancestor containing .devstories/)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the language server over stdio
    Lsp,
    /// Validate every story and epic file
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init();

    let root = match args.root {
        Some(root) => root,
        None => {
            let cwd = std::env::current_dir().wrap_err("Failed to get current directory")?;
            find_root(&cwd).unwrap_or(cwd)
        }
    };
    let layout = WorkspaceLayout::new(root);

    match args.command {
        Command::Lsp => lsp::run(layout, DEBOUNCE_WINDOW).await,
        Command::Check => {
            let workspace = Workspace::load(layout, Logger::new("check")).await;
            let report = run_check(&workspace).await;
            print!("{}", render_report(&report, &workspace));
            if report.has_errors() {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}
