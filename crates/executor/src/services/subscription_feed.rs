use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use common::actors::{Actor, ActorType, ControlMessage};
use common::models::SubscriptionSnapshot;
use registry::SubscriptionRegistry;
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, info, warn};

/// Mirrors a JSON list of subscription snapshots into the registry.
pub struct SubscriptionFeed {
    path: PathBuf,
    refresh_every: Duration,
    registry: Arc<SubscriptionRegistry>,
}

impl SubscriptionFeed {
    pub fn new(path: PathBuf, refresh_every: Duration, registry: Arc<SubscriptionRegistry>) -> Self {
        Self {
            path,
            refresh_every,
            registry,
        }
    }

    /// Upserts every snapshot and drops subscriptions missing from the file.
    /// On a read or parse error the registry is left untouched.
    pub async fn refresh(&self) -> anyhow::Result<usize> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading {}", self.path.display()))?;
        let snapshots: Vec<SubscriptionSnapshot> = serde_json::from_str(&raw)
            .with_context(|| format!("parsing {}", self.path.display()))?;

        let keep: HashSet<_> = snapshots.iter().map(|s| s.subscription_id).collect();
        for snapshot in &snapshots {
            self.registry.upsert(snapshot).await;
        }
        self.registry.retain(&keep).await;

        Ok(snapshots.len())
    }
}

#[async_trait]
impl Actor for SubscriptionFeed {
    fn name(&self) -> ActorType {
        ActorType::SubscriptionFeed
    }

    async fn run(&mut self, supervisor_tx: mpsc::Sender<ControlMessage>) -> anyhow::Result<()> {
        let _heartbeat = self.spawn_heartbeat(supervisor_tx.clone());

        info!("Starting Subscription Feed from {}", self.path.display());

        let mut refresh_interval = time::interval(self.refresh_every);

        loop {
            refresh_interval.tick().await;

            match self.refresh().await {
                Ok(count) => debug!("Loaded {} subscription snapshot(s)", count),
                Err(e) => {
                    warn!("Subscription refresh failed: {:#}", e);
                    if supervisor_tx
                        .send(ControlMessage::Error(self.name(), format!("{:#}", e)))
                        .await
                        .is_err()
                    {
                        anyhow::bail!("Supervisor channel closed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn temp_file(contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("subscriptions-{}.json", Uuid::new_v4()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[tokio::test]
    async fn test_refresh_mirrors_file() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let path = temp_file(
            r#"[
                {"subscription_id": 1, "exchange": "Coinex", "api_key": "k", "secret_key": "s", "running": true},
                {"subscription_id": 2, "exchange": "Toobit", "api_key": "k", "secret_key": "s", "running": false,
                 "channels": ["CryptoTrade066"]}
            ]"#,
        );
        let feed = SubscriptionFeed::new(path.clone(), Duration::from_secs(1), registry.clone());

        assert_eq!(feed.refresh().await.unwrap(), 2);
        assert!(registry.is_active(1).await);
        assert!(!registry.is_active(2).await);

        std::fs::write(
            &path,
            r#"[{"subscription_id": 2, "exchange": "Toobit", "api_key": "k", "secret_key": "s", "running": true}]"#,
        )
        .unwrap();

        assert_eq!(feed.refresh().await.unwrap(), 1);
        assert_eq!(registry.len().await, 1);
        assert!(registry.is_active(2).await);

        std::fs::remove_file(path).unwrap();
    }

    #[tokio::test]
    async fn test_broken_file_keeps_registry() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let path = temp_file(r#"[{"subscription_id": 1, "api_key": "k", "secret_key": "s", "running": true}]"#);
        let feed = SubscriptionFeed::new(path.clone(), Duration::from_secs(1), registry.clone());
        feed.refresh().await.unwrap();

        std::fs::write(&path, "{ not json").unwrap();
        assert!(feed.refresh().await.is_err());
        assert!(registry.is_active(1).await);

        std::fs::remove_file(&path).unwrap();
        assert!(feed.refresh().await.is_err());
        assert_eq!(registry.len().await, 1);
    }
}
