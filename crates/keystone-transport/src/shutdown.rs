//! Cooperative shutdown signalling.
//!
//! The accept loop owns a [`ShutdownTrigger`]; every connection task holds
//! a [`Shutdown`] listener and selects on [`Shutdown::wait`] next to its
//! socket read. Firing the trigger (or dropping it) wakes them all, after
//! which the server drains the tasks for a bounded window before persisting
//! state.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;

/// Creates a connected trigger/listener pair.
pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

/// The sending half: fires once, wakes every listener.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    /// Signals shutdown. Idempotent.
    pub fn trigger(&self) {
        // No listeners left is fine: nobody needs waking.
        let _ = self.tx.send(true);
    }

    /// Creates another listener.
    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
        }
    }
}

/// The receiving half, cheap to clone into each task.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Returns `true` once shutdown has been signalled.
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves when shutdown is signalled or the trigger is dropped.
    pub async fn wait(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Waits up to `timeout` for every task in `tasks` to finish, then aborts
/// whatever is left.
///
/// Returns the number of tasks that had to be aborted.
pub async fn drain<T: 'static>(tasks: &mut JoinSet<T>, timeout: Duration) -> usize {
    let finished = tokio::time::timeout(timeout, async {
        while tasks.join_next().await.is_some() {}
    })
    .await;
    if finished.is_ok() {
        return 0;
    }

    let stragglers = tasks.len();
    tasks.abort_all();
    while tasks.join_next().await.is_some() {}
    tracing::warn!(stragglers, "aborted connections that outlived the drain window");
    stragglers
}
