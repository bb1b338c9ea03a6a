//! Watch subscriptions - cancellable delivery of storage events
//!
//! A subscription owns a delivery task and the storage watch feeding it.
//! Once `unsubscribe` returns, no new callback invocation starts. A callback
//! that is already running on another thread is waited for; a callback that
//! unsubscribes itself is not.

use crate::storage::{StorageEvent, Watch, WatchGuard};
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::task::JoinHandle;

thread_local! {
    /// Subscription currently delivering on this thread (0 when none)
    static DELIVERING: Cell<usize> = const { Cell::new(0) };
}

struct Resources {
    task: JoinHandle<()>,
    _guard: WatchGuard,
}

struct Inner {
    active: AtomicBool,
    delivery: Mutex<()>,
    resources: Mutex<Option<Resources>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct DeliveryMark;

impl DeliveryMark {
    fn enter(id: usize) -> Self {
        DELIVERING.with(|d| d.set(id));
        DeliveryMark
    }
}

impl Drop for DeliveryMark {
    fn drop(&mut self) {
        DELIVERING.with(|d| d.set(0));
    }
}

impl Inner {
    fn id(&self) -> usize {
        self as *const Inner as usize
    }

    fn deliver(&self, f: impl FnOnce()) {
        let _delivery = lock(&self.delivery);
        if !self.active.load(Ordering::SeqCst) {
            return;
        }
        let _mark = DeliveryMark::enter(self.id());
        f();
    }

    fn release(&self) {
        if let Some(resources) = lock(&self.resources).take() {
            resources.task.abort();
            tracing::debug!("Released watch subscription");
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.release();
    }
}

/// Handle to an active watch. Clones refer to the same subscription; the
/// watch is released on `unsubscribe` or when the last clone is dropped.
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

impl Subscription {
    /// Start delivering the events of `watch` to `handler` on a tokio task.
    pub fn spawn<F>(watch: Watch, handler: F) -> Self
    where
        F: Fn(StorageEvent) + Send + Sync + 'static,
    {
        let inner = Arc::new(Inner {
            active: AtomicBool::new(true),
            delivery: Mutex::new(()),
            resources: Mutex::new(None),
        });

        let weak: Weak<Inner> = Arc::downgrade(&inner);
        let mut events = watch.events;
        let task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                inner.deliver(|| handler(event));
                if !inner.active.load(Ordering::SeqCst) {
                    break;
                }
            }
        });

        *lock(&inner.resources) = Some(Resources {
            task,
            _guard: watch.guard,
        });
        Self { inner }
    }

    /// Stop delivery and release the watch. Safe to call repeatedly and from
    /// inside the callback.
    pub fn unsubscribe(&self) {
        self.inner.active.store(false, Ordering::SeqCst);
        self.inner.release();

        let reentrant = DELIVERING.with(|d| d.get() == self.inner.id());
        if !reentrant {
            // Wait out a delivery running on another thread
            drop(lock(&self.inner.delivery));
        }
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }
}
