use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ExchangeError;

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: i64,
    #[serde(default)]
    msg: String,
}

/// Toobit answers with the bare payload, or with `{code, msg}` on failure.
pub fn decode_payload<T: DeserializeOwned>(status: u16, body: &str) -> Result<T, ExchangeError> {
    if let Ok(err) = serde_json::from_str::<ErrorBody>(body) {
        if err.code != 0 && err.code != 200 {
            return Err(ExchangeError::Api {
                status,
                body: format!("code {}: {}", err.code, err.msg),
            });
        }
    }

    Ok(serde_json::from_str(body)?)
}

/// Futures contract name for a signal market, `BTCUSDT` -> `BTC-SWAP-USDT`.
pub fn contract_symbol(market: &str) -> String {
    match market.strip_suffix("USDT") {
        Some(base) if !base.is_empty() => format!("{}-SWAP-USDT", base),
        _ => market.to_string(),
    }
}

#[derive(Debug, Deserialize)]
pub struct MarkPrice {
    #[serde(rename(deserialize = "symbolId"))]
    pub symbol_id: String,
    pub price: String,
}

#[derive(Debug, Deserialize)]
pub struct Balance {
    pub asset: String,
    #[serde(rename(deserialize = "availableBalance"))]
    pub available_balance: String,
}

#[derive(Debug, Deserialize)]
pub struct OrderAck {
    #[serde(rename(deserialize = "orderId"))]
    pub order_id: Value,
}

impl OrderAck {
    pub fn id(&self) -> Result<String, ExchangeError> {
        match &self.order_id {
            Value::String(id) => Ok(id.clone()),
            Value::Number(id) => Ok(id.to_string()),
            other => Err(ExchangeError::Decode(format!("orderId: {}", other))),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: String,
    pub position: String,
    #[serde(default, rename(deserialize = "avgPrice"))]
    pub avg_price: String,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.position
            .parse::<f64>()
            .map(|size| size != 0.0)
            .unwrap_or(false)
    }
}
