// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-key debouncer for outbound sends.
//!
//! `schedule` arms a delayed single-shot action for a key, replacing and
//! cancelling any pending action for the same key, so rapid-fire duplicate
//! triggers collapse into one send.

use std::future::Future;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;

/// Debounces actions per key (ticket id) with a fixed window.
pub struct Debouncer {
    window: Duration,
    pending: DashMap<i64, JoinHandle<()>>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: DashMap::new(),
        }
    }

    /// Arm `action` to run after the window, cancelling any pending action
    /// for the same key.
    pub fn schedule<F>(&self, key: i64, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Some((_, old)) = self.pending.remove(&key) {
            old.abort();
        }
        let window = self.window;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            action.await;
        });
        self.pending.insert(key, handle);
    }

    /// Drop any pending action for the key.
    pub fn cancel(&self, key: i64) {
        if let Some((_, old)) = self.pending.remove(&key) {
            old.abort();
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        for entry in self.pending.iter() {
            entry.value().abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn rapid_triggers_collapse_into_one_send() {
        let debouncer = Debouncer::new(Duration::from_secs(1));
        let fired = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let fired = Arc::clone(&fired);
            debouncer.schedule(7, async move {
                fired.fetch_add(1, Ordering::SeqCst);
            });
        }

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn distinct_keys_fire_independently() {
        let debouncer = Debouncer::new(Duration::from_secs(1));
        let fired = Arc::new(AtomicUsize::new(0));

        for key in [1, 2, 3] {
            let fired = Arc::clone(&fired);
            debouncer.schedule(key, async move {
                fired.fetch_add(1, Ordering::SeqCst);
            });
        }

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_drops_the_pending_action() {
        let debouncer = Debouncer::new(Duration::from_secs(1));
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&fired);
        debouncer.schedule(7, async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        debouncer.cancel(7);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
