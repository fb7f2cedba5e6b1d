//! One-shot broadcast gate. Created open, closed at most once, never reopened.
//!
//! The open→closed transition is a single compare-and-swap on an atomic state
//! word, so explicit cancels and timer fires can race freely: the first writer
//! records its reason and wakes every waiter, later writers are no-ops.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::Notify;

use crate::error::ContextError;

const OPEN: u8 = 0;
const CANCELED: u8 = 1;
const DEADLINE_EXCEEDED: u8 = 2;

/// Shared closeable gate. Clone-cheap (Arc-backed); every clone observes the
/// same state.
#[derive(Clone, Debug)]
pub struct Signal {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    state: AtomicU8,
    notify: Notify,
}

impl Signal {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: AtomicU8::new(OPEN),
                notify: Notify::new(),
            }),
        }
    }

    /// Close with reason `Canceled`. Returns true if this call closed it.
    pub fn close(&self) -> bool {
        self.close_with(ContextError::Canceled)
    }

    /// Close with an explicit reason. Returns true if this call performed the
    /// transition; false if the signal was already closed (its reason is kept).
    pub fn close_with(&self, reason: ContextError) -> bool {
        let code = match reason {
            ContextError::Canceled => CANCELED,
            ContextError::DeadlineExceeded => DEADLINE_EXCEEDED,
        };
        match self
            .inner
            .state
            .compare_exchange(OPEN, code, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                self.inner.notify.notify_waiters();
                true
            }
            Err(_) => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) != OPEN
    }

    /// Reason recorded by whoever closed the signal first.
    pub fn reason(&self) -> Option<ContextError> {
        match self.inner.state.load(Ordering::Acquire) {
            CANCELED => Some(ContextError::Canceled),
            DEADLINE_EXCEEDED => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Wait until the signal is closed. Returns immediately if it already is.
    pub async fn closed(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        // Register before checking state so a close between the check and the
        // await still wakes us.
        notified.as_mut().enable();
        if self.is_closed() {
            return;
        }
        notified.await;
    }

    /// True if both handles refer to the same gate.
    pub fn same_as(&self, other: &Signal) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn starts_open() {
        let s = Signal::new();
        assert!(!s.is_closed());
        assert_eq!(s.reason(), None);
    }

    #[test]
    fn close_is_idempotent() {
        let s = Signal::new();
        assert!(s.close());
        assert!(!s.close());
        assert!(!s.close_with(ContextError::DeadlineExceeded));
        assert!(s.is_closed());
        // first closer's reason sticks
        assert_eq!(s.reason(), Some(ContextError::Canceled));
    }

    #[test]
    fn clone_shares_state() {
        let s = Signal::new();
        let s2 = s.clone();
        s.close_with(ContextError::DeadlineExceeded);
        assert!(s2.is_closed());
        assert_eq!(s2.reason(), Some(ContextError::DeadlineExceeded));
        assert!(s.same_as(&s2));
        assert!(!s.same_as(&Signal::new()));
    }

    #[test]
    fn concurrent_closers_exactly_one_wins() {
        let s = Signal::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let s = s.clone();
                std::thread::spawn(move || {
                    if i % 2 == 0 {
                        s.close()
                    } else {
                        s.close_with(ContextError::DeadlineExceeded)
                    }
                })
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
        assert!(s.is_closed());
    }

    #[tokio::test]
    async fn closed_returns_immediately_when_already_closed() {
        let s = Signal::new();
        s.close();
        tokio::time::timeout(Duration::from_millis(50), s.closed())
            .await
            .expect("closed() should not block on a closed signal");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn close_releases_every_waiter() {
        let s = Signal::new();
        let waiters: Vec<_> = (0..16)
            .map(|_| {
                let s = s.clone();
                tokio::spawn(async move { s.closed().await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(20)).await;
        s.close();

        for w in waiters {
            tokio::time::timeout(Duration::from_secs(1), w)
                .await
                .expect("waiter left blocked")
                .unwrap();
        }
    }

    #[tokio::test]
    async fn open_signal_keeps_waiting() {
        let s = Signal::new();
        let res = tokio::time::timeout(Duration::from_millis(30), s.closed()).await;
        assert!(res.is_err());
    }
}
