use async_trait::async_trait;
use common::models::Side;

use crate::error::ExchangeError;
use crate::factory::ExchangeKind;

/// Identifier of the trigger order that opens a position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderHandle(pub String);

impl std::fmt::Display for OrderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trading capabilities a signal execution needs from one exchange account.
///
/// Every call is a single signed HTTP request (or a short fixed sequence of
/// them); retry policy belongs to the caller.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    fn kind(&self) -> ExchangeKind;

    /// Quantity to open given the account's free quote balance and the mark price.
    async fn compute_position_size(&self, market: &str, leverage: u32)
    -> Result<f64, ExchangeError>;

    /// Places a trigger order that opens the position once the mark price reaches `trigger_price`.
    async fn open_position(
        &self,
        side: Side,
        market: &str,
        quantity: f64,
        trigger_price: &str,
    ) -> Result<OrderHandle, ExchangeError>;

    async fn attach_take_profit(&self, market: &str, price: &str) -> Result<(), ExchangeError>;

    async fn attach_stop_loss(&self, market: &str, price: &str) -> Result<(), ExchangeError>;

    /// Whether a live position currently exists for the market.
    async fn poll_position(&self, market: &str) -> Result<bool, ExchangeError>;

    async fn cancel_all_orders(&self, market: &str) -> Result<(), ExchangeError>;
}
