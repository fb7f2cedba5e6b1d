use std::time::Instant;

use crate::error::ContextError;
use crate::signal::Signal;

/// Arm a one-shot timer that closes `signal` with `DeadlineExceeded` at
/// `deadline`.
///
/// The task holds only the signal. It exits without acting as soon as the signal
/// is closed by anyone else, which is how an explicit cancel disarms it. Returns
/// false when no Tokio runtime is available; the deadline is then enforced only
/// by query-time checks.
pub(crate) fn arm(signal: Signal, deadline: Instant) -> bool {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        tracing::debug!("no tokio runtime, deadline enforced at query time only");
        return false;
    };

    tracing::trace!(
        remaining = ?deadline.saturating_duration_since(Instant::now()),
        "deadline timer armed"
    );
    handle.spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline.into()) => {
                if signal.close_with(ContextError::DeadlineExceeded) {
                    tracing::debug!("deadline elapsed, context canceled");
                }
            }
            _ = signal.closed() => {
                tracing::trace!("deadline timer disarmed");
            }
        }
    });
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn without_runtime_nothing_is_armed() {
        let s = Signal::new();
        assert!(!arm(s.clone(), Instant::now() + Duration::from_millis(1)));
        std::thread::sleep(Duration::from_millis(5));
        assert!(!s.is_closed());
    }

    #[tokio::test]
    async fn fires_at_deadline() {
        let s = Signal::new();
        assert!(arm(s.clone(), Instant::now() + Duration::from_millis(20)));
        assert!(!s.is_closed());

        tokio::time::timeout(Duration::from_secs(1), s.closed())
            .await
            .expect("timer should fire");
        assert_eq!(s.reason(), Some(ContextError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn explicit_close_disarms() {
        let s = Signal::new();
        arm(s.clone(), Instant::now() + Duration::from_millis(20));
        s.close();

        tokio::time::sleep(Duration::from_millis(50)).await;
        // still the explicit reason, the timer did not fire afterwards
        assert_eq!(s.reason(), Some(ContextError::Canceled));
    }
}
