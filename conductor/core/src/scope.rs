//! Cancellation Scopes
//!
//! A [`CancellationScope`] owns a set of pending timed callbacks. Collapsing
//! the scope aborts every armed timer and turns every callback it was given
//! into a no-op, forever. A hosting view owns one scope for its lifetime and
//! collapses it on teardown; each delivered turn runs in a [`child`] scope so a
//! single delivery can be cancelled without tearing the view down.
//!
//! # Dispatch Gate
//!
//! A fired timer re-checks the collapsed flag and runs its callback while
//! holding the scope's dispatch gate. [`collapse`] takes the same gate before
//! flipping the flag, so a collapse can never slip in between "timer fired"
//! and "callback ran", on a current-thread runtime or a multi-threaded one.
//! The gate is re-entrant: a callback may schedule on, or collapse, its own
//! scope.
//!
//! [`child`]: CancellationScope::child
//! [`collapse`]: CancellationScope::collapse

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, ReentrantMutex};
use tokio::sync::watch;
use tokio::task::AbortHandle;

/// Identifier of an armed timer within its scope
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

#[derive(Default)]
struct TimerTable {
    next_id: u64,
    armed: HashMap<TimerId, AbortHandle>,
    children: Vec<Weak<ScopeInner>>,
}

struct ScopeInner {
    /// One-way valve; only ever written while holding `gate`
    collapsed: AtomicBool,
    gate: ReentrantMutex<()>,
    timers: Mutex<TimerTable>,
    parent: Option<Arc<ScopeInner>>,
    collapsed_tx: watch::Sender<bool>,
}

impl ScopeInner {
    fn new(parent: Option<Arc<ScopeInner>>) -> Self {
        let (collapsed_tx, _) = watch::channel(false);
        Self {
            collapsed: AtomicBool::new(false),
            gate: ReentrantMutex::new(()),
            timers: Mutex::new(TimerTable::default()),
            parent,
            collapsed_tx,
        }
    }

    fn is_collapsed(&self) -> bool {
        if self.collapsed.load(Ordering::SeqCst) {
            return true;
        }
        self.parent.as_ref().is_some_and(|p| p.is_collapsed())
    }

    fn fire(&self, id: TimerId, callback: Box<dyn FnOnce() + Send>) {
        let _gate = self.gate.lock();
        if self.is_collapsed() {
            tracing::trace!(timer = id.0, "Timer fired after collapse, dropping callback");
            return;
        }
        self.timers.lock().armed.remove(&id);
        callback();
    }
}

/// A revocation handle for timed callbacks
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct CancellationScope {
    inner: Arc<ScopeInner>,
}

impl CancellationScope {
    /// Create a fresh, open scope
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ScopeInner::new(None)),
        }
    }

    /// Create a scope that collapses whenever this one does
    ///
    /// Collapsing the child leaves the parent open. A child of an already
    /// collapsed scope starts collapsed.
    #[must_use]
    pub fn child(&self) -> Self {
        let child = Self {
            inner: Arc::new(ScopeInner::new(Some(Arc::clone(&self.inner)))),
        };

        let _gate = self.inner.gate.lock();
        if self.inner.is_collapsed() {
            child.collapse();
        } else {
            let mut timers = self.inner.timers.lock();
            timers.children.retain(|w| w.strong_count() > 0);
            timers.children.push(Arc::downgrade(&child.inner));
        }
        child
    }

    /// Arm a timer that invokes `callback` after `delay`
    ///
    /// Returns `None` without ever invoking `callback` when the scope is
    /// already collapsed. A zero delay fires on the next scheduler tick, never
    /// synchronously.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn schedule<F>(&self, callback: F, delay: Duration) -> Option<TimerId>
    where
        F: FnOnce() + Send + 'static,
    {
        let _gate = self.inner.gate.lock();
        if self.inner.is_collapsed() {
            return None;
        }

        // Held across the spawn so a fast-firing timer cannot remove its entry
        // before it is inserted.
        let mut timers = self.inner.timers.lock();
        let id = TimerId(timers.next_id);
        timers.next_id += 1;

        let inner = Arc::clone(&self.inner);
        let callback: Box<dyn FnOnce() + Send> = Box::new(callback);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.fire(id, callback);
        });
        timers.armed.insert(id, task.abort_handle());

        tracing::trace!(timer = id.0, delay_ms = delay.as_millis() as u64, "Timer armed");
        Some(id)
    }

    /// Collapse the scope
    ///
    /// Aborts every armed timer and guarantees no callback given to this scope
    /// (or any child) runs afterwards. Idempotent.
    pub fn collapse(&self) {
        let children = {
            let _gate = self.inner.gate.lock();
            if self.inner.collapsed.swap(true, Ordering::SeqCst) {
                return;
            }

            let (armed, children) = {
                let mut timers = self.inner.timers.lock();
                (
                    std::mem::take(&mut timers.armed),
                    std::mem::take(&mut timers.children),
                )
            };
            for handle in armed.values() {
                handle.abort();
            }
            self.inner.collapsed_tx.send_replace(true);

            tracing::trace!(aborted = armed.len(), "Scope collapsed");
            children
        };

        for child in children.iter().filter_map(Weak::upgrade) {
            Self { inner: child }.collapse();
        }
    }

    /// Whether the scope (or any ancestor) has collapsed
    #[must_use]
    pub fn is_collapsed(&self) -> bool {
        self.inner.is_collapsed()
    }

    /// Number of timers armed and not yet fired
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.timers.lock().armed.len()
    }

    /// Resolve once the scope has collapsed
    pub async fn collapsed(&self) {
        let mut rx = self.inner.collapsed_tx.subscribe();
        // The sender lives in `inner`, which `self` keeps alive.
        let _ = rx.wait_for(|collapsed| *collapsed).await;
    }
}

impl Default for CancellationScope {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationScope")
            .field("collapsed", &self.is_collapsed())
            .field("pending", &self.pending())
            .finish()
    }
}
