//! Build cancellation

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Cloneable cancellation flag shared between a build and whoever may stop it
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation has been requested
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                // Sender is owned by every clone, so this only happens at teardown
                std::future::pending::<()>().await;
            }
        }
    }

    /// Cancel when the process receives Ctrl-C
    pub fn cancel_on_ctrl_c(&self) -> tokio::task::JoinHandle<()> {
        let token = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => match result {
                    Ok(()) => {
                        warn!("Interrupted, cancelling build");
                        token.cancel();
                    }
                    Err(e) => debug!("Cannot listen for Ctrl-C: {}", e),
                },
                _ = token.cancelled() => {}
            }
        })
    }

    /// Cancel after `timeout` unless already cancelled
    pub fn cancel_after(&self, timeout: Duration) -> tokio::task::JoinHandle<()> {
        let token = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => {
                    warn!("Build timed out after {}s, cancelling", timeout.as_secs());
                    token.cancel();
                }
                _ = token.cancelled() => {}
            }
        })
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clones_observe_cancel() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());

        token.cancel();
        assert!(other.is_cancelled());
        tokio::time::timeout(Duration::from_secs(1), other.cancelled())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn cancel_after_fires() {
        let token = CancelToken::new();
        let handle = token.cancel_after(Duration::from_millis(10));
        tokio::time::timeout(Duration::from_secs(2), token.cancelled())
            .await
            .unwrap();
        handle.await.unwrap();
        assert!(token.is_cancelled());
    }
}
