//! Keyed trailing-edge debounce.
//!
//! Timer state is an arena keyed by path or concern. Scheduling a key that
//! already has a pending timer cancels it and starts a new one, so a burst
//! of events fires once, one window after the last event. Entries leave the
//! arena when they fire or are cancelled.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::AbortHandle;

/// Quiet period before a debounced action fires.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(100);

struct Pending {
    generation: u64,
    handle: AbortHandle,
}

struct Arena<K> {
    next_generation: u64,
    pending: HashMap<K, Pending>,
    disposed: bool,
}

pub struct Debouncer<K> {
    window: Duration,
    arena: Arc<Mutex<Arena<K>>>,
}

fn lock<K>(arena: &Mutex<Arena<K>>) -> MutexGuard<'_, Arena<K>> {
    arena.lock().unwrap_or_else(PoisonError::into_inner)
}

fn shut_down<K>(arena: &Mutex<Arena<K>>) {
    let mut arena = lock(arena);
    arena.disposed = true;
    for (_, pending) in arena.pending.drain() {
        pending.handle.abort();
    }
}

impl<K> Debouncer<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            arena: Arc::new(Mutex::new(Arena {
                next_generation: 0,
                pending: HashMap::new(),
                disposed: false,
            })),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Run `action` once `key` has been quiet for the window.
    ///
    /// Must be called from within a tokio runtime. Does nothing after
    /// [`Debouncer::dispose`].
    pub fn schedule<F>(&self, key: K, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut arena = lock(&self.arena);
        if arena.disposed {
            return;
        }

        arena.next_generation += 1;
        let generation = arena.next_generation;
        let window = self.window;
        let shared = Arc::clone(&self.arena);
        let timer_key = key.clone();

        let task = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            {
                let mut arena = lock(&shared);
                let current = arena
                    .pending
                    .get(&timer_key)
                    .is_some_and(|pending| pending.generation == generation);
                // Superseded or cancelled while we were waking up.
                if !current {
                    return;
                }
                arena.pending.remove(&timer_key);
            }
            action.await;
        });

        let replaced = arena.pending.insert(
            key,
            Pending {
                generation,
                handle: task.abort_handle(),
            },
        );
        if let Some(previous) = replaced {
            previous.handle.abort();
        }
    }

    /// Drop the pending timer for `key`, if any.
    pub fn cancel(&self, key: &K) -> bool {
        match lock(&self.arena).pending.remove(key) {
            Some(pending) => {
                pending.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Number of keys with a pending timer.
    pub fn pending(&self) -> usize {
        lock(&self.arena).pending.len()
    }

    /// Cancel every pending timer and refuse new ones.
    pub fn dispose(&self) {
        shut_down(&self.arena);
    }

    pub fn is_disposed(&self) -> bool {
        lock(&self.arena).disposed
    }
}

impl<K> Drop for Debouncer<K> {
    fn drop(&mut self) {
        shut_down(&self.arena);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn bump(count: &Arc<AtomicUsize>) -> impl Future<Output = ()> + Send + use<> {
        let count = Arc::clone(count);
        async move {
            count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn burst_fires_once_after_last_event() {
        let debouncer = Debouncer::new(DEBOUNCE_WINDOW);
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            debouncer.schedule("a", bump(&count));
            tokio::time::sleep(Duration::from_millis(40)).await;
        }
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(debouncer.pending(), 1);

        tokio::time::sleep(Duration::from_millis(70)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(debouncer.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn spaced_events_fire_each_time() {
        let debouncer = Debouncer::new(DEBOUNCE_WINDOW);
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            debouncer.schedule("a", bump(&count));
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn keys_are_independent() {
        let debouncer = Debouncer::new(DEBOUNCE_WINDOW);
        let count = Arc::new(AtomicUsize::new(0));

        debouncer.schedule("a", bump(&count));
        debouncer.schedule("b", bump(&count));
        debouncer.schedule("a", bump(&count));
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_and_dispose_stop_timers() {
        let debouncer = Debouncer::new(DEBOUNCE_WINDOW);
        let count = Arc::new(AtomicUsize::new(0));

        debouncer.schedule("a", bump(&count));
        assert!(debouncer.cancel(&"a"));
        assert!(!debouncer.cancel(&"a"));

        debouncer.schedule("b", bump(&count));
        debouncer.dispose();
        debouncer.schedule("c", bump(&count));
        assert_eq!(debouncer.pending(), 0);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(debouncer.is_disposed());
    }
}
