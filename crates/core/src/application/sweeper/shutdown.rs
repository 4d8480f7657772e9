// Cooperative stop signal for the sweep loops

use tokio::sync::watch;

/// Receiving half, cloned into every sweep
#[derive(Clone)]
pub struct ShutdownToken {
    stop: watch::Receiver<bool>,
}

impl ShutdownToken {
    pub fn is_shutdown(&self) -> bool {
        *self.stop.borrow()
    }

    /// Resolves once stop is requested. A dropped sender counts as a stop.
    pub async fn wait(&mut self) {
        if self.stop.wait_for(|stopped| *stopped).await.is_err() {
            tracing::debug!("Shutdown sender dropped, stopping");
        }
    }
}

/// Sending half, held by the composition root
pub struct ShutdownSender {
    stop: watch::Sender<bool>,
}

impl ShutdownSender {
    /// Another token bound to this sender
    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            stop: self.stop.subscribe(),
        }
    }

    /// Idempotent
    pub fn shutdown(&self) {
        self.stop.send_replace(true);
    }
}

pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (stop, rx) = watch::channel(false);
    (ShutdownSender { stop }, ShutdownToken { stop: rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_returns_after_shutdown() {
        let (tx, mut token) = shutdown_channel();
        assert!(!token.is_shutdown());
        tx.shutdown();
        token.wait().await;
        assert!(token.is_shutdown());
    }

    #[tokio::test]
    async fn test_wait_returns_when_sender_dropped() {
        let (tx, mut token) = shutdown_channel();
        drop(tx);
        tokio::time::timeout(std::time::Duration::from_secs(1), token.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_tokens_from_sender_see_shutdown() {
        let (tx, _token) = shutdown_channel();
        let mut late = tx.token();
        tx.shutdown();
        tx.shutdown();
        late.wait().await;
        assert!(late.is_shutdown());
    }
}
