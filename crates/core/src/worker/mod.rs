//! Helpers for tasks that cooperate with a [`Context`].
//!
//! Cancellation is cooperative: nothing preempts a task. A worker that accepts
//! a context must check it at every unit of unbounded work (loop iteration,
//! blocking send, I/O step) and return once it is done, dropping whatever it
//! owns. A worker that never checks keeps running and is a leak in the caller.

mod counter;

use std::future::Future;

use tokio::sync::mpsc;

use crate::context::{Context, Done};
use crate::error::ContextError;

pub use counter::{counter, counter_leaky};

/// Drive `fut` until it completes or `ctx` is done, whichever happens first.
pub async fn run_until_done<F: Future>(ctx: &Context, fut: F) -> Result<F::Output, ContextError> {
    until(&ctx.done(), fut).await
}

/// Send `item`, giving up if `ctx` becomes done while waiting for capacity.
///
/// A dropped receiver is reported as `Canceled`: nobody is waiting any more.
pub async fn send<T>(ctx: &Context, tx: &mpsc::Sender<T>, item: T) -> Result<(), ContextError> {
    send_until(&ctx.done(), tx, item).await
}

pub(crate) async fn until<F: Future>(done: &Done, fut: F) -> Result<F::Output, ContextError> {
    if let Some(reason) = done.reason() {
        return Err(reason);
    }
    tokio::select! {
        biased;
        _ = done.closed() => Err(done.reason().unwrap_or(ContextError::Canceled)),
        out = fut => Ok(out),
    }
}

pub(crate) async fn send_until<T>(
    done: &Done,
    tx: &mpsc::Sender<T>,
    item: T,
) -> Result<(), ContextError> {
    match until(done, tx.reserve()).await? {
        Ok(permit) => {
            permit.send(item);
            Ok(())
        }
        Err(_) => Err(ContextError::Canceled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn run_until_done_returns_output_when_live() {
        let (ctx, _cancel) = Context::background().with_cancel();
        let out = run_until_done(&ctx, async { 7 }).await;
        assert_eq!(out, Ok(7));
    }

    #[tokio::test]
    async fn run_until_done_stops_on_cancel() {
        let (ctx, cancel) = Context::background().with_cancel();
        let task = tokio::spawn({
            let ctx = ctx.clone();
            async move { run_until_done(&ctx, std::future::pending::<()>()).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();

        let res = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(res, Err(ContextError::Canceled));
    }

    #[tokio::test]
    async fn run_until_done_reports_deadline() {
        let (ctx, _cancel) = Context::background().with_timeout(Duration::from_millis(20));
        let res = run_until_done(&ctx, tokio::time::sleep(Duration::from_secs(5))).await;
        assert_eq!(res, Err(ContextError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn run_until_done_rejects_already_done_context() {
        let (ctx, cancel) = Context::background().with_cancel();
        cancel.cancel();
        let res = run_until_done(&ctx, async { 1 }).await;
        assert_eq!(res, Err(ContextError::Canceled));
    }

    #[tokio::test]
    async fn send_unblocks_full_channel_on_cancel() {
        let (ctx, cancel) = Context::background().with_cancel();
        let (tx, _rx) = mpsc::channel::<u8>(1);
        send(&ctx, &tx, 1).await.unwrap();

        let blocked = tokio::spawn({
            let ctx = ctx.clone();
            let tx = tx.clone();
            async move { send(&ctx, &tx, 2).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();

        let res = tokio::time::timeout(Duration::from_secs(1), blocked)
            .await
            .expect("producer should not stay blocked after cancel")
            .unwrap();
        assert_eq!(res, Err(ContextError::Canceled));
    }

    #[tokio::test]
    async fn send_to_dropped_receiver_is_canceled() {
        let ctx = Context::background();
        let (tx, rx) = mpsc::channel::<u8>(1);
        drop(rx);
        assert_eq!(send(&ctx, &tx, 1).await, Err(ContextError::Canceled));
    }
}
