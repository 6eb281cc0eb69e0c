//! Cooperative cancellation for cluster-touching operations
//!
//! No dedicated cancellation-token crate is pulled in for this: a
//! `tokio::sync::watch` channel already gives a cheaply cloneable signal
//! that late subscribers still observe correctly, which a bare
//! `Notify`-based signal would not.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

use crate::errors::NetworkingError;

/// Caller-supplied cancellation context. Clone and hand the same signal to
/// every reconciler call that's part of one logical operation; calling
/// `cancel()` once aborts all of them at their next await point.
#[derive(Clone)]
pub struct CancelSignal {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// A future that resolves once `cancel()` has been called. A fresh
    /// clone of the receiver is taken on every call, so a signal that was
    /// already cancelled before this is awaited resolves immediately.
    pub fn cancelled(&self) -> impl Future<Output = ()> + '_ {
        let mut rx = self.rx.clone();
        async move {
            let _ = rx.wait_for(|cancelled| *cancelled).await;
        }
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Race `op` against `cancel`; resolves to `Err(Cancelled)` if `cancel`
/// fires first, otherwise to whatever `op` resolves to.
pub async fn cancellable<F, T>(op: F, cancel: &CancelSignal) -> Result<T, NetworkingError>
where
    F: Future<Output = Result<T, NetworkingError>>,
{
    tokio::select! {
        result = op => result,
        _ = cancel.cancelled() => Err(NetworkingError::Cancelled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_before_await_resolves_immediately() {
        let signal = CancelSignal::new();
        signal.cancel();
        assert!(signal.is_cancelled());
        signal.cancelled().await;
    }

    #[tokio::test]
    async fn test_clone_shares_the_same_signal() {
        let signal = CancelSignal::new();
        let clone = signal.clone();
        clone.cancel();
        assert!(signal.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancellable_returns_cancelled_when_signalled_first() {
        let signal = CancelSignal::new();
        signal.cancel();

        let op = async {
            std::future::pending::<Result<(), NetworkingError>>().await
        };

        let result = cancellable(op, &signal).await;
        assert!(matches!(result, Err(NetworkingError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancellable_returns_op_result_when_not_cancelled() {
        let signal = CancelSignal::new();
        let op = async { Ok::<_, NetworkingError>(42) };
        let result = cancellable(op, &signal).await;
        assert_eq!(result.unwrap(), 42);
    }
}
