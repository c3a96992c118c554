use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ExchangeError;

pub const MARKET_TYPE: &str = "FUTURES";
pub const PRICE_TYPE: &str = "mark_price";

#[derive(Debug, Deserialize)]
struct Envelope {
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Value,
}

/// Unwraps `{code, message, data}` and maps `data` onto `T`.
pub fn decode_envelope<T: DeserializeOwned>(status: u16, body: &str) -> Result<T, ExchangeError> {
    let envelope: Envelope = serde_json::from_str(body)?;

    if envelope.code != 0 {
        return Err(ExchangeError::Api {
            status,
            body: format!("code {}: {}", envelope.code, envelope.message),
        });
    }

    Ok(serde_json::from_value(envelope.data)?)
}

#[derive(Debug, Deserialize)]
pub struct Ticker {
    pub market: String,
    pub last: String,
    pub mark_price: String,
}

#[derive(Debug, Deserialize)]
pub struct Balance {
    pub ccy: String,
    pub available: String,
    #[serde(default)]
    pub frozen: String,
}

#[derive(Debug, Deserialize)]
pub struct StopOrderAck {
    pub stop_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct Position {
    pub market: String,
    pub side: String,
    #[serde(default)]
    pub open_interest: String,
    #[serde(default)]
    pub avg_entry_price: String,
}

impl Position {
    /// Pending positions are open unless they report a zero size.
    pub fn is_open(&self) -> bool {
        self.open_interest
            .parse::<f64>()
            .map(|size| size != 0.0)
            .unwrap_or(true)
    }
}

#[derive(Debug, Serialize)]
pub struct StopOrderRequest<'a> {
    pub market: &'a str,
    pub market_type: &'a str,
    pub side: &'a str,
    #[serde(rename = "type")]
    pub order_type: &'a str,
    pub amount: String,
    pub trigger_price_type: &'a str,
    pub trigger_price: &'a str,
}

#[derive(Debug, Serialize)]
pub struct TakeProfitRequest<'a> {
    pub market: &'a str,
    pub market_type: &'a str,
    pub take_profit_type: &'a str,
    pub take_profit_price: &'a str,
}

#[derive(Debug, Serialize)]
pub struct StopLossRequest<'a> {
    pub market: &'a str,
    pub market_type: &'a str,
    pub stop_loss_type: &'a str,
    pub stop_loss_price: &'a str,
}

#[derive(Debug, Serialize)]
pub struct CancelAllRequest<'a> {
    pub market: &'a str,
    pub market_type: &'a str,
}
