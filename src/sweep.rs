//! Periodic orphan sweep
//!
//! Ticks are scheduled from the start of the previous tick, so the configured
//! interval is a lower bound between sweeps and sweep time does not add up.
//! A sweep that overruns delays the next tick instead of causing a burst.

use crate::note::NoteStore;
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Background task running `remove_orphaned_notes` on an interval.
#[derive(Debug)]
pub struct OrphanSweeper {
    task: Mutex<Option<JoinHandle<()>>>,
}

impl OrphanSweeper {
    /// Start sweeping every `interval`. The first sweep runs immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(store: NoteStore, interval: Duration) -> Self {
        let interval = interval.max(Duration::from_millis(1));
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match store.remove_orphaned_notes().await {
                    Ok(0) => tracing::debug!("Orphan sweep found nothing"),
                    Ok(count) => tracing::debug!("Periodic sweep removed {} notes", count),
                    Err(e) => tracing::warn!("Orphan sweep failed: {}", e),
                }
            }
        });
        tracing::debug!("Started orphan sweeper every {:?}", interval);
        Self {
            task: Mutex::new(Some(task)),
        }
    }

    /// Stop sweeping. Safe to call more than once.
    pub fn stop(&self) {
        let task = self
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(task) = task {
            task.abort();
            tracing::debug!("Stopped orphan sweeper");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl Drop for OrphanSweeper {
    fn drop(&mut self) {
        self.stop();
    }
}
