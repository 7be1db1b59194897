//! Integration tests for the debounced file watcher.
//!
//! These tests verify:
//! - Creations and deletions are forwarded at once
//! - Changes to one path collapse into one event after the quiet window
//! - A deletion cancels a pending change
//! - Paths outside the globs are dropped
//! - Nothing is emitted after dispose
//!
//! Time is paused, so windows elapse only when every task is idle.

use std::path::{Path, PathBuf};
use std::time::Duration;

use devstories::logging::Logger;
use devstories::watcher::{FileWatcher, WatchEvent, WatchEventKind};
use tokio::sync::broadcast;
use tokio::time::Instant;

const WINDOW: Duration = Duration::from_millis(100);

fn watcher() -> FileWatcher {
    FileWatcher::new(
        "/ws",
        &[
            ".devstories/stories/*.md".to_string(),
            ".devstories/epics/*.md".to_string(),
        ],
        WINDOW,
        Logger::disabled(),
    )
    .expect("valid globs")
}

fn story(id: &str) -> PathBuf {
    Path::new("/ws/.devstories/stories").join(format!("{id}.md"))
}

async fn assert_quiet(events: &mut broadcast::Receiver<WatchEvent>) {
    let next = tokio::time::timeout(Duration::from_secs(5), events.recv()).await;
    assert!(next.is_err(), "unexpected event: {next:?}");
}

#[tokio::test(start_paused = true)]
async fn test_created_and_deleted_are_immediate() {
    let watcher = watcher();
    let mut events = watcher.subscribe();

    watcher.inject(WatchEventKind::Created, story("DS-001"));
    watcher.inject(WatchEventKind::Deleted, story("DS-002"));

    assert_eq!(
        events.try_recv().expect("created"),
        WatchEvent::Created(story("DS-001"))
    );
    assert_eq!(
        events.try_recv().expect("deleted"),
        WatchEvent::Deleted(story("DS-002"))
    );
}

#[tokio::test(start_paused = true)]
async fn test_changes_collapse_after_quiet_window() {
    let watcher = watcher();
    let mut events = watcher.subscribe();
    let start = Instant::now();

    for _ in 0..5 {
        watcher.inject(WatchEventKind::Changed, story("DS-001"));
        tokio::time::sleep(Duration::from_millis(30)).await;
    }
    assert!(events.try_recv().is_err());
    assert_eq!(watcher.pending_changes(), 1);

    let event = events.recv().await.expect("one change");
    assert_eq!(event, WatchEvent::Changed(story("DS-001")));
    // Last change at 120ms, plus the window.
    assert!(start.elapsed() >= Duration::from_millis(120) + WINDOW);

    assert_quiet(&mut events).await;
    assert_eq!(watcher.pending_changes(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_paths_debounce_independently() {
    let watcher = watcher();
    let mut events = watcher.subscribe();

    watcher.inject(WatchEventKind::Changed, story("DS-001"));
    tokio::time::sleep(Duration::from_millis(60)).await;
    watcher.inject(WatchEventKind::Changed, story("DS-002"));

    assert_eq!(
        events.recv().await.expect("first"),
        WatchEvent::Changed(story("DS-001"))
    );
    assert_eq!(
        events.recv().await.expect("second"),
        WatchEvent::Changed(story("DS-002"))
    );
}

#[tokio::test(start_paused = true)]
async fn test_spaced_changes_each_fire() {
    let watcher = watcher();
    let mut events = watcher.subscribe();

    for _ in 0..3 {
        watcher.inject(WatchEventKind::Changed, story("DS-001"));
        tokio::time::sleep(WINDOW * 2).await;
    }

    for _ in 0..3 {
        assert_eq!(
            events.try_recv().expect("change"),
            WatchEvent::Changed(story("DS-001"))
        );
    }
    assert!(events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_delete_cancels_pending_change() {
    let watcher = watcher();
    let mut events = watcher.subscribe();

    watcher.inject(WatchEventKind::Changed, story("DS-001"));
    watcher.inject(WatchEventKind::Deleted, story("DS-001"));

    assert_eq!(
        events.recv().await.expect("deleted"),
        WatchEvent::Deleted(story("DS-001"))
    );
    assert_quiet(&mut events).await;
}

#[tokio::test(start_paused = true)]
async fn test_paths_outside_globs_are_dropped() {
    let watcher = watcher();
    let mut events = watcher.subscribe();

    watcher.inject(WatchEventKind::Created, "/ws/.devstories/config.json");
    watcher.inject(WatchEventKind::Created, "/ws/.devstories/stories/nested/DS-1.md");
    watcher.inject(WatchEventKind::Created, "/ws/.devstories/stories/DS-1.txt");
    watcher.inject(WatchEventKind::Created, "/elsewhere/.devstories/stories/DS-1.md");

    assert_quiet(&mut events).await;
    assert_eq!(watcher.state().event_count(), 0);
    assert!(watcher.matches(&story("DS-001")));
    assert!(!watcher.matches(Path::new("/ws/README.md")));
}

#[tokio::test(start_paused = true)]
async fn test_dispose_silences_everything() {
    let watcher = watcher();
    let mut events = watcher.subscribe();

    watcher.inject(WatchEventKind::Changed, story("DS-001"));
    watcher.dispose();
    watcher.dispose();
    watcher.inject(WatchEventKind::Created, story("DS-002"));

    assert!(watcher.is_disposed());
    assert_eq!(watcher.pending_changes(), 0);
    assert!(!watcher.state().is_active());
    assert_quiet(&mut events).await;
}

#[tokio::test(start_paused = true)]
async fn test_state_counts_matching_events() {
    let watcher = watcher();
    let state = watcher.state();
    assert!(state.last_event_ms().is_none());

    watcher.inject(WatchEventKind::Created, story("DS-001"));
    watcher.inject(WatchEventKind::Changed, story("DS-001"));

    assert_eq!(state.event_count(), 2);
    assert!(state.last_event_ms().is_some());
}
