use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::{spawn_local, JoinHandle};
use tokio::time::sleep;

use crate::dom::Element;

/// Counts outstanding runtime work so embedders can wait for quiescence.
#[derive(Debug, Default)]
pub struct TaskTracker {
    pending: Cell<usize>,
    notify: Notify,
}

impl TaskTracker {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Marks one unit of work as pending until the returned guard drops.
    pub fn track(self: &Rc<Self>) -> PendingTask {
        self.pending.set(self.pending.get() + 1);
        PendingTask {
            tracker: Rc::clone(self),
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.get()
    }

    /// Resolves once nothing is pending.
    pub async fn idle(&self) {
        loop {
            let notified = self.notify.notified();
            if self.pending.get() == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[derive(Debug)]
pub struct PendingTask {
    tracker: Rc<TaskTracker>,
}

impl Drop for PendingTask {
    fn drop(&mut self) {
        let remaining = self.tracker.pending.get().saturating_sub(1);
        self.tracker.pending.set(remaining);
        if remaining == 0 {
            self.tracker.notify.notify_waiters();
        }
    }
}

/// Per-element debounce timers.
///
/// At most one timer is pending per element: scheduling again aborts the
/// previous timer. Must be used from within a `tokio::task::LocalSet`.
pub struct Debouncer {
    timers: Rc<RefCell<HashMap<Element, JoinHandle<()>>>>,
    tracker: Rc<TaskTracker>,
}

impl Debouncer {
    pub fn new(tracker: Rc<TaskTracker>) -> Self {
        Self {
            timers: Rc::new(RefCell::new(HashMap::new())),
            tracker,
        }
    }

    pub fn schedule<F, Fut>(&self, element: &Element, delay: Duration, callback: F)
    where
        F: FnOnce() -> Fut + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        self.cancel(element);

        let timers = Rc::clone(&self.timers);
        let key = element.clone();
        let pending = self.tracker.track();
        let handle = spawn_local(async move {
            let _pending = pending;
            sleep(delay).await;
            timers.borrow_mut().remove(&key);
            callback().await;
        });

        self.timers.borrow_mut().insert(element.clone(), handle);
    }

    /// Drops the pending timer for `element` without firing it.
    pub fn cancel(&self, element: &Element) {
        if let Some(handle) = self.timers.borrow_mut().remove(element) {
            handle.abort();
        }
    }

    pub fn is_pending(&self, element: &Element) -> bool {
        self.timers.borrow().contains_key(element)
    }

    pub fn pending_count(&self) -> usize {
        self.timers.borrow().len()
    }

    pub fn clear_all(&self) {
        for (_, handle) in self.timers.borrow_mut().drain() {
            handle.abort();
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.clear_all();
    }
}
