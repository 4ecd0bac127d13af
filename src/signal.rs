//! Completion signalling between an asynchronous submission and its waiter
//!

use std::{sync::Mutex, time::Duration};

use tokio::sync::Notify;

/// Shared state coordinating one producer (the store's completion handler)
/// and one consumer (the submitting task) around a single operation.
///
/// The done flag transitions false to true exactly once per armed cycle and
/// is never reset while a waiter is blocked; `arm` must only be called
/// between cycles. The mutex covers both the write and the read of the
/// flag, so the wake happens-before the waiter observes completion. Shared
/// by `Arc` between the gate and the handler, never process-global.
pub struct CompletionSignal {
    done: Mutex<bool>,
    notify: Notify,
}

impl CompletionSignal {
    pub fn new() -> Self {
        Self {
            done: Mutex::new(false),
            notify: Notify::new(),
        }
    }

    /// Reset for a fresh cycle. Not valid while a waiter is blocked.
    pub fn arm(&self) {
        *self.done.lock().unwrap() = false;
    }

    /// Record completion and wake one waiter. The lock is held only for
    /// the flag flip, never across anything that could block.
    pub fn complete(&self) {
        {
            let mut done = self.done.lock().unwrap();
            *done = true;
        }
        self.notify.notify_one();
    }

    pub fn is_complete(&self) -> bool {
        *self.done.lock().unwrap()
    }

    /// Block until `complete` has been called for the current cycle.
    ///
    /// Registers for the notification before checking the flag and
    /// re-checks the predicate after every wake, so neither a wake that
    /// lands between check and sleep nor a spurious wake is lost. Waits
    /// indefinitely; if the producer never completes, neither does this.
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_complete() {
                return;
            }
            notified.await;
        }
    }

    /// Bounded variant of `wait`. Returns true if completion was observed
    /// within the limit, false if the limit expired first.
    pub async fn wait_timeout(&self, limit: Duration) -> bool {
        tokio::time::timeout(limit, self.wait()).await.is_ok()
    }
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}
