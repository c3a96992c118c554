use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use common::config::{CancelPolicy, Settings};
use common::models::{Side, Signal, SignalError, SubscriptionId};
use exchanges::{ExchangeAdapter, ExchangeError, ExchangeKind, OrderHandle};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Sizing,
    EntryPlaced,
    AwaitingOpen,
    Open,
    AwaitingClose,
    ClosedCleanup,
    Done,
    Failed,
    Cancelled,
}

impl ExecutionState {
    /// States in which a trigger order or a position exists on the exchange.
    fn has_exchange_footprint(&self) -> bool {
        matches!(
            self,
            ExecutionState::AwaitingOpen
                | ExecutionState::Open
                | ExecutionState::AwaitingClose
                | ExecutionState::ClosedCleanup
        )
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionError {
    #[error("insufficient balance: {available} available, {minimum} required")]
    InsufficientBalance { available: f64, minimum: f64 },

    #[error("exchange error: {0}")]
    Exchange(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("invalid signal: {0}")]
    InvalidSignal(String),

    #[error("cancelled")]
    Cancelled,
}

impl From<ExchangeError> for ExecutionError {
    fn from(e: ExchangeError) -> Self {
        match e {
            ExchangeError::InsufficientBalance { available, minimum } => {
                ExecutionError::InsufficientBalance { available, minimum }
            }
            ExchangeError::Decode(msg) => ExecutionError::Decode(msg),
            other => ExecutionError::Exchange(other.to_string()),
        }
    }
}

impl From<SignalError> for ExecutionError {
    fn from(e: SignalError) -> Self {
        ExecutionError::InvalidSignal(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Done,
    Failed(ExecutionError),
}

impl ExecutionOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, ExecutionOutcome::Done)
    }
}

impl fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionOutcome::Done => write!(f, "done"),
            ExecutionOutcome::Failed(e) => write!(f, "{}", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionEvent {
    EntryPlaced {
        side: Side,
        entry: String,
        quantity: f64,
        order: OrderHandle,
    },
    PositionOpened,
    ProtectionAttached {
        take_profit: String,
        stop_loss: String,
    },
    PositionClosed,
    Finished(ExecutionOutcome),
}

/// One lifecycle event, tagged with the execution it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    pub execution_id: Uuid,
    pub subscription_id: SubscriptionId,
    pub exchange: ExchangeKind,
    pub market: String,
    pub event: ExecutionEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionConfig {
    pub poll_interval: Duration,
    pub cancel_policy: CancelPolicy,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for ExecutionConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            poll_interval: settings.poll_interval,
            cancel_policy: settings.cancel_policy,
        }
    }
}

/// Drives one signal through one subscriber's exchange account:
/// size, trigger entry, wait for fill, attach TP/SL, wait for close, clean up.
pub struct Execution {
    id: Uuid,
    subscription_id: SubscriptionId,
    exchange: ExchangeKind,
    signal: Signal,
    adapter: Arc<dyn ExchangeAdapter>,
    config: ExecutionConfig,
    events: Option<mpsc::Sender<ExecutionReport>>,
    state: ExecutionState,
    orders_cleared: bool,
}

impl Execution {
    pub fn new(
        subscription_id: SubscriptionId,
        signal: Signal,
        adapter: Arc<dyn ExchangeAdapter>,
        config: ExecutionConfig,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            subscription_id,
            exchange: adapter.kind(),
            signal,
            adapter,
            config,
            events: None,
            state: ExecutionState::Sizing,
            orders_cleared: false,
        }
    }

    pub fn with_events(mut self, events: mpsc::Sender<ExecutionReport>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn run(mut self, mut cancel: watch::Receiver<bool>) -> ExecutionOutcome {
        info!(
            "Execution {} started: subscription {} on {} for {} {}",
            self.id, self.subscription_id, self.exchange, self.signal.position, self.signal.market
        );

        let outcome = match self.drive(&mut cancel).await {
            Ok(()) => ExecutionOutcome::Done,
            Err(e) => ExecutionOutcome::Failed(e),
        };

        match &outcome {
            ExecutionOutcome::Done => {
                info!("Execution {} finished", self.id);
            }
            ExecutionOutcome::Failed(ExecutionError::Cancelled) => {
                warn!("Execution {} cancelled in {:?}", self.id, self.state);
            }
            ExecutionOutcome::Failed(e) => {
                error!("Execution {} failed in {:?}: {}", self.id, self.state, e);
            }
        }

        if !outcome.is_done() && self.state.has_exchange_footprint() && !self.orders_cleared {
            warn!(
                "Execution {} stopped after entry on {} {}: resting orders or an unmanaged position may remain",
                self.id, self.exchange, self.signal.market
            );
        }

        self.state = match &outcome {
            ExecutionOutcome::Done => ExecutionState::Done,
            ExecutionOutcome::Failed(ExecutionError::Cancelled) => ExecutionState::Cancelled,
            ExecutionOutcome::Failed(_) => ExecutionState::Failed,
        };
        self.emit(ExecutionEvent::Finished(outcome.clone()));

        outcome
    }

    async fn drive(&mut self, cancel: &mut watch::Receiver<bool>) -> Result<(), ExecutionError> {
        self.state = ExecutionState::Sizing;
        ensure_live(cancel)?;

        let side = self.signal.side()?;
        let leverage = self.signal.leverage_multiplier()?;
        let entry = self.signal.first_entry()?.to_string();
        let take_profit = self.signal.first_target()?.to_string();
        let stop_loss = self.signal.stop_loss.clone();
        let market = self.signal.market.clone();

        let quantity = self
            .adapter
            .compute_position_size(&market, leverage)
            .await?;
        ensure_live(cancel)?;

        self.state = ExecutionState::EntryPlaced;
        let order = self
            .adapter
            .open_position(side, &market, quantity, &entry)
            .await?;
        info!("Execution {} placed entry order {}", self.id, order);
        self.emit(ExecutionEvent::EntryPlaced {
            side,
            entry,
            quantity,
            order,
        });

        self.state = ExecutionState::AwaitingOpen;
        if let Err(e) = self.wait_for_position(&market, true, cancel).await {
            if e == ExecutionError::Cancelled
                && self.config.cancel_policy == CancelPolicy::CancelRestingOrders
            {
                self.cancel_resting_orders(&market).await;
            }
            return Err(e);
        }
        self.emit(ExecutionEvent::PositionOpened);

        self.state = ExecutionState::Open;
        self.adapter
            .attach_take_profit(&market, &take_profit)
            .await?;
        self.adapter.attach_stop_loss(&market, &stop_loss).await?;
        self.emit(ExecutionEvent::ProtectionAttached {
            take_profit,
            stop_loss,
        });

        self.state = ExecutionState::AwaitingClose;
        self.wait_for_position(&market, false, cancel).await?;
        self.emit(ExecutionEvent::PositionClosed);

        self.state = ExecutionState::ClosedCleanup;
        self.adapter.cancel_all_orders(&market).await?;

        Ok(())
    }

    /// Polls until the position's open flag equals `open`.
    async fn wait_for_position(
        &self,
        market: &str,
        open: bool,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<(), ExecutionError> {
        loop {
            ensure_live(cancel)?;

            let is_open = self.adapter.poll_position(market).await?;
            if is_open == open {
                return Ok(());
            }
            debug!(
                "Execution {} polled {}: open={}, waiting for open={}",
                self.id, market, is_open, open
            );

            tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() {
                        return Err(ExecutionError::Cancelled);
                    }
                }
                _ = time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    async fn cancel_resting_orders(&mut self, market: &str) {
        match self.adapter.cancel_all_orders(market).await {
            Ok(()) => {
                info!("Execution {} cancelled resting orders on {}", self.id, market);
                self.orders_cleared = true;
            }
            Err(e) => {
                error!(
                    "Execution {} could not cancel resting orders on {}: {}",
                    self.id, market, e
                );
            }
        }
    }

    /// Never waits on the notifier: a full queue drops the event.
    fn emit(&self, event: ExecutionEvent) {
        let Some(events) = &self.events else {
            return;
        };

        let report = ExecutionReport {
            execution_id: self.id,
            subscription_id: self.subscription_id,
            exchange: self.exchange,
            market: self.signal.market.clone(),
            event,
        };
        match events.try_send(report) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(report)) => {
                debug!(
                    "Execution {} event queue is full, dropping {:?}",
                    self.id, report.event
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Execution {} has no event listener", self.id);
            }
        }
    }
}

/// A `true` value or a dropped sender both mean stop.
fn ensure_live(cancel: &watch::Receiver<bool>) -> Result<(), ExecutionError> {
    if *cancel.borrow() || cancel.has_changed().is_err() {
        return Err(ExecutionError::Cancelled);
    }
    Ok(())
}
