use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;

use super::{send_until, until};
use crate::context::Context;

/// Spawn a producer emitting 1, 2, 3, … until `ctx` is done.
///
/// The channel holds a single item, so the producer runs at most one value
/// ahead of its consumer. On exit the sender is dropped and the returned
/// receiver sees end of stream. `pace` is slept between items, and the sleep
/// itself is abandoned on cancel.
pub fn counter(ctx: &Context, tracker: &TaskTracker, pace: Duration) -> mpsc::Receiver<u64> {
    let (tx, rx) = mpsc::channel(1);
    let done = ctx.done();
    tracker.spawn(async move {
        let mut n: u64 = 1;
        let reason = loop {
            if let Err(reason) = send_until(&done, &tx, n).await {
                break reason;
            }
            n += 1;
            if !pace.is_zero()
                && let Err(reason) = until(&done, tokio::time::sleep(pace)).await
            {
                break reason;
            }
        };
        tracing::debug!(%reason, emitted = n - 1, "counter stopped");
    });
    rx
}

/// The same producer without a context. It runs for as long as its receiver
/// is alive, whether or not anyone still reads from it.
pub fn counter_leaky(tracker: &TaskTracker) -> mpsc::Receiver<u64> {
    let (tx, rx) = mpsc::channel(1);
    tracker.spawn(async move {
        let mut n: u64 = 1;
        while tx.send(n).await.is_ok() {
            n += 1;
        }
        tracing::debug!(emitted = n - 1, "leaky counter released by its receiver");
    });
    rx
}
