//! Cancellable sleeps.
//!
//! Every wait the orchestrator makes goes through [`pause`], so a
//! cancellation signal is observed within one poll of being raised.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Sleep for `duration` unless `cancel` fires first.
///
/// Returns `true` when the full duration elapsed, `false` when cancelled.
/// A zero duration still reports an already-raised cancellation.
pub async fn pause(duration: Duration, cancel: &CancellationToken) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    if duration.is_zero() {
        return true;
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_full_pause_elapses() {
        let cancel = CancellationToken::new();
        let start = Instant::now();
        assert!(pause(Duration::from_secs(5), &cancel).await);
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_pause() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        assert!(!pause(Duration::from_secs(600), &cancel).await);
        assert!(start.elapsed() < Duration::from_secs(600));
    }

    #[tokio::test]
    async fn test_zero_pause_reports_cancellation() {
        let cancel = CancellationToken::new();
        assert!(pause(Duration::ZERO, &cancel).await);
        cancel.cancel();
        assert!(!pause(Duration::ZERO, &cancel).await);
    }
}
