//! Cancellation scopes and the one-shot exit-condition cell.
//!
//! A [`CancelScope`] is a small tree: a child observes every ancestor's
//! cancellation plus its own, and canceling a child never touches the
//! parent. [`CancelScope::detached`] starts a fresh tree, which is how the
//! terminal report write stays immune to run cancellation.
//!
//! [`ExitCell`] is the first-writer-wins status cell the test-set runner
//! polls between cases: the app supervisor records a classified status
//! exactly once, and the driver loop observes it without blocking.

use crate::error::{Error, Result};
use crate::models::TestSetStatus;
use asupersync::sync::Notify;
use futures::FutureExt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

#[derive(Debug)]
struct ScopeCore {
    canceled: AtomicBool,
    notify: Notify,
}

impl ScopeCore {
    fn new() -> Self {
        Self {
            canceled: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    fn cancel(&self) {
        if !self.canceled.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        while !self.is_canceled() {
            self.notify.notified().await;
        }
    }
}

/// A cancellation scope. Cloning shares the same scope; [`Self::child`]
/// derives a new one.
#[derive(Debug, Clone)]
pub struct CancelScope {
    /// Ancestor cores first, own core last.
    cores: Vec<Arc<ScopeCore>>,
}

impl CancelScope {
    /// Create a root scope.
    #[must_use]
    pub fn root() -> Self {
        Self {
            cores: vec![Arc::new(ScopeCore::new())],
        }
    }

    /// Derive a child scope: it observes this scope's cancellation and can
    /// additionally be canceled on its own.
    #[must_use]
    pub fn child(&self) -> Self {
        let mut cores = self.cores.clone();
        cores.push(Arc::new(ScopeCore::new()));
        Self { cores }
    }

    /// A scope that does NOT observe this scope's cancellation.
    #[must_use]
    pub fn detached(&self) -> Self {
        Self::root()
    }

    /// Cancel this scope (and every scope derived from it).
    pub fn cancel(&self) {
        if let Some(own) = self.cores.last() {
            own.cancel();
        }
    }

    /// Whether this scope or any ancestor has been canceled.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.cores.iter().any(|core| core.is_canceled())
    }

    /// Resolve once this scope or any ancestor is canceled.
    pub async fn canceled(&self) {
        if self.is_canceled() {
            return;
        }
        let waits = self
            .cores
            .iter()
            .map(|core| core.wait().boxed_local())
            .collect::<Vec<_>>();
        futures::future::select_all(waits).await;
    }

    /// Run `fut` to completion unless the scope is canceled first, in which
    /// case the future is dropped and [`Error::Aborted`] is returned.
    pub async fn guard<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        if self.is_canceled() {
            return Err(Error::Aborted);
        }
        let cancel = self.canceled().fuse();
        let fut = fut.fuse();
        futures::pin_mut!(cancel, fut);
        match futures::future::select(fut, cancel).await {
            futures::future::Either::Left((value, _)) => Ok(value),
            futures::future::Either::Right(((), _)) => Err(Error::Aborted),
        }
    }
}

/// First-writer-wins terminal-status cell with a non-blocking read.
#[derive(Debug, Default)]
pub struct ExitCell {
    status: StdMutex<Option<TestSetStatus>>,
}

impl ExitCell {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a status. Only the first caller wins; returns whether this
    /// call was the one that recorded.
    pub fn signal(&self, status: TestSetStatus) -> bool {
        let mut guard = self.status.lock().expect("exit cell lock");
        if guard.is_some() {
            return false;
        }
        *guard = Some(status);
        true
    }

    /// Non-blocking read of the recorded status, if any.
    #[must_use]
    pub fn get(&self) -> Option<TestSetStatus> {
        *self.status.lock().expect("exit cell lock")
    }
}
