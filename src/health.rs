//! Store health check and its background poller.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;

use crate::repository::UserRepository;

/// Outcome of the last store probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Up,
    Down,
}

/// Store health, either probed inline or cached by the poller.
#[derive(Clone)]
pub struct Health {
    repo: Arc<dyn UserRepository>,
    cached: Arc<RwLock<Option<Status>>>,
}

impl Health {
    pub fn new(repo: Arc<dyn UserRepository>) -> Self {
        Self {
            repo,
            cached: Arc::new(RwLock::new(None)),
        }
    }

    /// Ping the store now.
    pub async fn probe(&self) -> Status {
        match self.repo.ping().await {
            Ok(()) => Status::Up,
            Err(err) => {
                tracing::warn!(error = %err, "store health probe failed");
                Status::Down
            },
        }
    }

    /// Last polled status, or a fresh probe when nothing was polled yet.
    pub async fn status(&self) -> Status {
        if let Some(status) = *self.cached.read().await {
            return status;
        }
        self.probe().await
    }

    /// Probe every `interval` until `shutdown` flips.
    pub fn spawn_poller(
        &self,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let health = self.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let status = health.probe().await;
                        *health.cached.write().await = Some(status);
                        tracing::debug!(?status, "store health polled");
                    },
                    _ = shutdown.changed() => break,
                }
            }
            tracing::info!("health poller stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::memory::InMemoryUserRepository;

    #[tokio::test]
    async fn test_inline_probe() {
        let repo = Arc::new(InMemoryUserRepository::new());
        let health = Health::new(repo.clone());
        assert_eq!(health.status().await, Status::Up);

        repo.set_unavailable(true);
        assert_eq!(health.status().await, Status::Down);
    }

    #[tokio::test]
    async fn test_poller_caches_and_stops() {
        let repo = Arc::new(InMemoryUserRepository::new());
        let health = Health::new(repo.clone());
        let (tx, rx) = watch::channel(false);

        let handle = health.spawn_poller(Duration::from_millis(10), rx);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*health.cached.read().await, Some(Status::Up));

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
