use std::time::Instant;

use crate::error::ContextError;
use crate::signal::Signal;

/// Awaitable view of a context's cancellation state.
///
/// Holds every signal on the ancestor chain, nearest first. Closing any of them
/// closes the handle. A handle with no signals belongs to a chain that can never
/// be cancelled, and `closed()` on it never resolves.
#[derive(Clone, Debug)]
pub struct Done {
    links: Vec<Link>,
}

#[derive(Clone, Debug)]
pub(crate) struct Link {
    pub(crate) signal: Signal,
    pub(crate) deadline: Option<Instant>,
}

impl Done {
    pub(crate) fn new(links: Vec<Link>) -> Self {
        Self { links }
    }

    /// True if no ancestor introduced a signal.
    pub fn never_closes(&self) -> bool {
        self.links.is_empty()
    }

    /// Non-blocking poll.
    pub fn is_closed(&self) -> bool {
        self.reason().is_some()
    }

    /// Reason of the nearest closed ancestor. A deadline found elapsed here is
    /// latched into its signal.
    pub fn reason(&self) -> Option<ContextError> {
        reason_of(self.links.iter().map(|l| (&l.signal, l.deadline)))
    }

    /// Earliest deadline on the chain.
    pub fn deadline(&self) -> Option<Instant> {
        self.links.iter().filter_map(|l| l.deadline).min()
    }

    /// Wait until any ancestor signal closes or the earliest deadline passes.
    ///
    /// Never resolves for a chain without signals; do not await it
    /// unconditionally in that case.
    pub async fn closed(&self) {
        if self.links.is_empty() {
            return std::future::pending::<()>().await;
        }
        if self.is_closed() {
            return;
        }

        let any_closed =
            futures::future::select_all(self.links.iter().map(|l| Box::pin(l.signal.closed())));
        match self.deadline() {
            Some(deadline) => {
                tokio::select! {
                    _ = any_closed => {}
                    _ = tokio::time::sleep_until(deadline.into()) => {
                        // latch, in case no timer task is running
                        self.reason();
                    }
                }
            }
            None => {
                any_closed.await;
            }
        }
    }
}

/// Walks (signal, deadline) pairs nearest first and returns the first closed
/// reason, latching any deadline found elapsed on the way.
pub(crate) fn reason_of<'a>(
    chain: impl Iterator<Item = (&'a Signal, Option<Instant>)>,
) -> Option<ContextError> {
    let mut now = None;
    for (signal, deadline) in chain {
        if let Some(reason) = signal.reason() {
            return Some(reason);
        }
        if let Some(deadline) = deadline {
            let now = *now.get_or_insert_with(Instant::now);
            if deadline <= now {
                signal.close_with(ContextError::DeadlineExceeded);
                return signal.reason();
            }
        }
    }
    None
}
