use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use common::models::{Credentials, SubscriptionId, SubscriptionSnapshot};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

struct Subscription {
    channels: HashSet<String>,
    exchange: String,
    credentials: Credentials,
    running: bool,
}

impl Subscription {
    fn from_snapshot(snapshot: &SubscriptionSnapshot) -> Self {
        Self {
            channels: snapshot.channels.clone(),
            exchange: snapshot.exchange.clone(),
            credentials: snapshot.credentials(),
            running: snapshot.running,
        }
    }

    fn is_active(&self) -> bool {
        self.running && self.credentials.is_complete()
    }
}

/// Everything the dispatcher needs to start executions for one subscriber.
#[derive(Debug, Clone)]
pub struct ActiveSubscription {
    pub id: SubscriptionId,
    pub exchange: String,
    pub credentials: Credentials,
    pub channels: HashSet<String>,
}

impl ActiveSubscription {
    /// An empty channel set follows every channel.
    pub fn follows(&self, channel: &str) -> bool {
        self.channels.is_empty() || self.channels.contains(channel)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub activated: Vec<SubscriptionId>,
    pub deactivated: Vec<SubscriptionId>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.activated.is_empty() && self.deactivated.is_empty()
    }
}

/// Source of truth for which subscribers should have live executions.
///
/// Each record sits behind its own lock; no lock is held across network I/O.
#[derive(Default)]
pub struct SubscriptionRegistry {
    subscriptions: RwLock<HashMap<SubscriptionId, Arc<Mutex<Subscription>>>>,
    observed: Mutex<HashMap<SubscriptionId, bool>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, snapshot: &SubscriptionSnapshot) {
        let existing = {
            let subscriptions = self.subscriptions.read().await;
            subscriptions.get(&snapshot.subscription_id).cloned()
        };

        match existing {
            Some(entry) => {
                let mut subscription = entry.lock().await;
                subscription.channels = snapshot.channels.clone();
                subscription.exchange = snapshot.exchange.clone();
                subscription.credentials = snapshot.credentials();
                subscription.running = snapshot.running;
            }
            None => {
                let mut subscriptions = self.subscriptions.write().await;
                subscriptions.insert(
                    snapshot.subscription_id,
                    Arc::new(Mutex::new(Subscription::from_snapshot(snapshot))),
                );
                info!("Subscription {} registered", snapshot.subscription_id);
            }
        }
    }

    pub async fn remove(&self, id: SubscriptionId) -> bool {
        let removed = self.subscriptions.write().await.remove(&id).is_some();
        if removed {
            info!("Subscription {} removed", id);
        }
        removed
    }

    /// Drops every subscription not listed in `keep`.
    pub async fn retain(&self, keep: &HashSet<SubscriptionId>) {
        let mut subscriptions = self.subscriptions.write().await;
        subscriptions.retain(|id, _| {
            let kept = keep.contains(id);
            if !kept {
                info!("Subscription {} removed", id);
            }
            kept
        });
    }

    pub async fn is_active(&self, id: SubscriptionId) -> bool {
        match self.entry(id).await {
            Some(entry) => entry.lock().await.is_active(),
            None => false,
        }
    }

    pub async fn credentials(&self, id: SubscriptionId) -> Option<Credentials> {
        let entry = self.entry(id).await?;
        let subscription = entry.lock().await;
        subscription
            .credentials
            .is_complete()
            .then(|| subscription.credentials.clone())
    }

    pub async fn exchange(&self, id: SubscriptionId) -> Option<String> {
        let entry = self.entry(id).await?;
        let exchange = entry.lock().await.exchange.clone();
        (!exchange.is_empty()).then_some(exchange)
    }

    /// Snapshot of running subscriptions with a complete key pair, ordered by id.
    pub async fn active_subscriptions(&self) -> Vec<ActiveSubscription> {
        let mut active = Vec::new();

        for (id, entry) in self.entries().await {
            let subscription = entry.lock().await;
            if subscription.is_active() {
                active.push(ActiveSubscription {
                    id,
                    exchange: subscription.exchange.clone(),
                    credentials: subscription.credentials.clone(),
                    channels: subscription.channels.clone(),
                });
            }
        }

        active.sort_by_key(|s| s.id);
        active
    }

    /// Compares current activity with what the previous sweep saw.
    ///
    /// Removed subscriptions that were active count as deactivated.
    pub async fn sweep(&self) -> SweepReport {
        let mut current = HashMap::new();
        for (id, entry) in self.entries().await {
            current.insert(id, entry.lock().await.is_active());
        }

        let mut observed = self.observed.lock().await;
        let mut report = SweepReport::default();

        for (&id, &active) in current.iter() {
            let was_active = observed.get(&id).copied().unwrap_or(false);
            if active && !was_active {
                report.activated.push(id);
            } else if !active && was_active {
                report.deactivated.push(id);
            }
        }
        for (&id, &was_active) in observed.iter() {
            if was_active && !current.contains_key(&id) {
                report.deactivated.push(id);
            }
        }

        report.activated.sort_unstable();
        report.deactivated.sort_unstable();
        *observed = current;

        if !report.is_empty() {
            debug!("Registry sweep: {:?}", report);
        }
        report
    }

    pub async fn len(&self) -> usize {
        self.subscriptions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.subscriptions.read().await.is_empty()
    }

    async fn entry(&self, id: SubscriptionId) -> Option<Arc<Mutex<Subscription>>> {
        self.subscriptions.read().await.get(&id).cloned()
    }

    async fn entries(&self) -> Vec<(SubscriptionId, Arc<Mutex<Subscription>>)> {
        self.subscriptions
            .read()
            .await
            .iter()
            .map(|(id, entry)| (*id, entry.clone()))
            .collect()
    }
}
