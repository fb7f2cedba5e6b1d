use tether_core::{CancelHandle, Context};
use tokio::signal;

/// Owns the root context of a run. A signal listener cancels it on SIGTERM or
/// SIGINT, so every scenario derived from it winds down.
#[derive(Debug)]
pub struct ShutdownGuard {
    ctx: Context,
    cancel: CancelHandle,
}

impl ShutdownGuard {
    pub fn new() -> Self {
        let (ctx, cancel) = Context::background().with_cancel();
        Self { ctx, cancel }
    }

    /// The context all scenarios derive from.
    pub fn context(&self) -> Context {
        self.ctx.clone()
    }

    /// Spawn a background task that listens for OS signals and cancels the root.
    /// The task exits on its own once the root is released.
    pub fn spawn_signal_listener(&self) {
        let ctx = self.ctx.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let done = ctx.done();
            tokio::select! {
                _ = done.closed() => return,
                _ = wait_for_signal() => {}
            }
            cancel.cancel();
        });
    }

    /// Cancel the root. Called once the run is over.
    pub fn release(&self) {
        self.cancel.cancel();
    }
}

impl Default for ShutdownGuard {
    fn default() -> Self {
        Self::new()
    }
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => tracing::info!("received SIGTERM, initiating shutdown"),
                    _ = signal::ctrl_c() => tracing::info!("received SIGINT, initiating shutdown"),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to register SIGTERM handler");
                let _ = signal::ctrl_c().await;
                tracing::info!("received SIGINT, initiating shutdown");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
        tracing::info!("received Ctrl+C, initiating shutdown");
    }
}
