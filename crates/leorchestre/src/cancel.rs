//! Cancellation signal scoped to one orchestration.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

/// The signal fired before the awaited operation finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("orchestration cancelled")]
pub struct Cancelled;

/// Cloneable cancellation signal. Every clone observes the same flag.
#[derive(Debug, Clone)]
pub struct CancellationSignal {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl CancellationSignal {
    /// Create a signal that has not fired.
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    /// Fire the signal. Idempotent.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Whether the signal has fired.
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolve once the signal fires.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        let closed = receiver.wait_for(|fired| *fired).await.is_err();
        if closed {
            // Sender lives as long as `self`; a closed channel can never fire.
            std::future::pending::<()>().await;
        }
    }

    /// Sleep for `duration` unless the signal fires first.
    pub async fn sleep(&self, duration: Duration) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            return Err(Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    /// Run `future` unless the signal fires first.
    pub async fn guard<F: std::future::Future>(&self, future: F) -> Result<F::Output, Cancelled> {
        if self.is_cancelled() {
            return Err(Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(Cancelled),
            output = future => Ok(output),
        }
    }
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sleep_completes_when_not_cancelled() {
        let signal = CancellationSignal::new();
        assert_eq!(signal.sleep(Duration::from_secs(5)).await, Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_sleep() {
        let signal = CancellationSignal::new();
        let remote = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            remote.cancel();
        });

        let started = tokio::time::Instant::now();
        assert_eq!(signal.sleep(Duration::from_secs(60)).await, Err(Cancelled));
        assert!(started.elapsed() < Duration::from_secs(60));
        assert!(signal.is_cancelled());
    }

    #[tokio::test]
    async fn guard_refuses_to_start_after_cancel() {
        let signal = CancellationSignal::new();
        signal.cancel();
        signal.cancel();
        assert_eq!(signal.guard(async { 1 }).await, Err(Cancelled));
    }
}
