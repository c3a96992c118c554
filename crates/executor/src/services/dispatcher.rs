use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::models::{Credentials, Signal, SubscriptionId};
use exchanges::{AdapterFactory, ExchangeAdapter, ExchangeError, ExchangeKind};
use registry::{ActiveSubscription, SubscriptionRegistry, SweepReport};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::services::execution_service::{
    Execution, ExecutionConfig, ExecutionOutcome, ExecutionReport,
};

/// A validated signal and the channel it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSignal {
    pub channel: String,
    pub signal: Signal,
}

/// Source of exchange adapters for subscriber accounts.
#[cfg_attr(test, mockall::automock)]
pub trait AdapterProvider: Send + Sync {
    fn adapter(
        &self,
        kind: ExchangeKind,
        credentials: &Credentials,
    ) -> Result<Arc<dyn ExchangeAdapter>, ExchangeError>;
}

impl AdapterProvider for AdapterFactory {
    fn adapter(
        &self,
        kind: ExchangeKind,
        credentials: &Credentials,
    ) -> Result<Arc<dyn ExchangeAdapter>, ExchangeError> {
        self.build(kind, credentials)
    }
}

struct CachedAdapter {
    kind: ExchangeKind,
    credentials: Credentials,
    adapter: Arc<dyn ExchangeAdapter>,
}

struct RunningExecution {
    id: Uuid,
    cancel: watch::Sender<bool>,
    handle: JoinHandle<ExecutionOutcome>,
}

/// Owns every in-flight execution, indexed by subscription.
pub struct SignalDispatcher {
    registry: Arc<SubscriptionRegistry>,
    provider: Arc<dyn AdapterProvider>,
    config: ExecutionConfig,
    events: Option<mpsc::Sender<ExecutionReport>>,
    adapters: HashMap<SubscriptionId, CachedAdapter>,
    executions: HashMap<SubscriptionId, Vec<RunningExecution>>,
}

impl SignalDispatcher {
    pub fn new(
        registry: Arc<SubscriptionRegistry>,
        provider: Arc<dyn AdapterProvider>,
        config: ExecutionConfig,
    ) -> Self {
        Self {
            registry,
            provider,
            config,
            events: None,
            adapters: HashMap::new(),
            executions: HashMap::new(),
        }
    }

    pub fn with_events(mut self, events: mpsc::Sender<ExecutionReport>) -> Self {
        self.events = Some(events);
        self
    }

    pub async fn run(mut self, mut signal_rx: mpsc::Receiver<ChannelSignal>, sweep_every: Duration) {
        info!("Starting Signal Dispatcher");
        let mut sweep_interval = time::interval(sweep_every);

        loop {
            tokio::select! {
                maybe_signal = signal_rx.recv() => {
                    match maybe_signal {
                        Some(signal) => {
                            self.dispatch(signal).await;
                        }
                        None => {
                            info!("Signal channel closed. Stopping dispatcher.");
                            break;
                        }
                    }
                }

                _ = sweep_interval.tick() => {
                    self.sweep().await;
                }
            }
        }

        self.cancel_all();
    }

    /// Starts one execution per active subscription following the signal's
    /// channel. Returns how many were started.
    pub async fn dispatch(&mut self, incoming: ChannelSignal) -> usize {
        let subscribers: Vec<ActiveSubscription> = self
            .registry
            .active_subscriptions()
            .await
            .into_iter()
            .filter(|s| s.follows(&incoming.channel))
            .collect();

        info!(
            "Signal {} {} from {} for {} subscriber(s)",
            incoming.signal.position,
            incoming.signal.market,
            incoming.channel,
            subscribers.len()
        );

        let mut started = 0;
        for subscriber in subscribers {
            let adapter = match self.resolve_adapter(&subscriber) {
                Ok(adapter) => adapter,
                Err(ExchangeError::UnsupportedExchange(name)) => {
                    warn!(
                        "Subscription {} picked unknown exchange {:?}, skipping",
                        subscriber.id, name
                    );
                    continue;
                }
                Err(e) => {
                    error!(
                        "Subscription {} adapter could not be built: {}",
                        subscriber.id, e
                    );
                    continue;
                }
            };

            let mut execution =
                Execution::new(subscriber.id, incoming.signal.clone(), adapter, self.config);
            if let Some(events) = &self.events {
                execution = execution.with_events(events.clone());
            }

            let id = execution.id();
            let (cancel, cancel_rx) = watch::channel(false);
            let handle = tokio::spawn(execution.run(cancel_rx));

            self.executions
                .entry(subscriber.id)
                .or_default()
                .push(RunningExecution { id, cancel, handle });
            started += 1;
        }

        started
    }

    /// Cancels executions of subscriptions that are no longer active and
    /// forgets finished ones.
    pub async fn sweep(&mut self) -> SweepReport {
        let report = self.registry.sweep().await;

        for id in &report.activated {
            info!("Subscription {} is now active", id);
        }

        let mut stopped = report.deactivated.clone();
        // A subscription can start and stop between two sweeps.
        for id in self.executions.keys().chain(self.adapters.keys()) {
            if !stopped.contains(id) && !self.registry.is_active(*id).await {
                stopped.push(*id);
            }
        }

        for id in &stopped {
            self.adapters.remove(id);
            if let Some(running) = self.executions.remove(id) {
                warn!(
                    "Subscription {} stopped, cancelling {} execution(s)",
                    id,
                    running.len()
                );
                for execution in running {
                    debug!("Cancelling execution {}", execution.id);
                    let _ = execution.cancel.send(true);
                }
            } else {
                info!("Subscription {} stopped", id);
            }
        }

        self.executions.retain(|_, running| {
            running.retain(|execution| !execution.handle.is_finished());
            !running.is_empty()
        });

        report
    }

    #[cfg(test)]
    fn running(&self, id: SubscriptionId) -> usize {
        self.executions
            .get(&id)
            .map(|running| {
                running
                    .iter()
                    .filter(|execution| !execution.handle.is_finished())
                    .count()
            })
            .unwrap_or(0)
    }

    fn cancel_all(&mut self) {
        for (_, running) in self.executions.drain() {
            for execution in running {
                let _ = execution.cancel.send(true);
            }
        }
    }

    /// Reuses the cached adapter unless the subscriber switched exchange or credentials.
    fn resolve_adapter(
        &mut self,
        subscriber: &ActiveSubscription,
    ) -> Result<Arc<dyn ExchangeAdapter>, ExchangeError> {
        let kind: ExchangeKind = subscriber.exchange.parse()?;

        if let Some(cached) = self.adapters.get(&subscriber.id) {
            if cached.kind == kind && cached.credentials == subscriber.credentials {
                return Ok(cached.adapter.clone());
            }
        }

        let adapter = self.provider.adapter(kind, &subscriber.credentials)?;
        self.adapters.insert(
            subscriber.id,
            CachedAdapter {
                kind,
                credentials: subscriber.credentials.clone(),
                adapter: adapter.clone(),
            },
        );
        Ok(adapter)
    }
}
