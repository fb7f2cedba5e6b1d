use crate::signal::Signal;

/// Closes the signal of the context it was returned with.
///
/// Safe to call from any task, any number of times; only the first call has an
/// effect. Every cancellable context must eventually be released through its
/// handle: until then its signal, and the deadline timer for timeout contexts,
/// stay alive.
#[derive(Clone, Debug)]
#[must_use = "call cancel() once the context is no longer needed, or it leaks until its deadline"]
pub struct CancelHandle {
    signal: Signal,
}

impl CancelHandle {
    pub(crate) fn new(signal: Signal) -> Self {
        Self { signal }
    }

    pub fn cancel(&self) {
        if self.signal.close() {
            tracing::debug!("context canceled");
        }
    }

    /// True once this handle's own signal is closed, by `cancel` or by deadline.
    pub fn is_cancelled(&self) -> bool {
        self.signal.is_closed()
    }

    /// Wrap into a guard that cancels when dropped.
    pub fn drop_guard(self) -> CancelGuard {
        CancelGuard {
            handle: self,
            armed: true,
        }
    }
}

/// Cancels its context on drop unless disarmed.
#[derive(Debug)]
#[must_use = "dropping the guard immediately cancels the context"]
pub struct CancelGuard {
    handle: CancelHandle,
    armed: bool,
}

impl CancelGuard {
    /// Give back the handle without cancelling.
    pub fn disarm(mut self) -> CancelHandle {
        self.armed = false;
        self.handle.clone()
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if self.armed {
            self.handle.cancel();
        }
    }
}
