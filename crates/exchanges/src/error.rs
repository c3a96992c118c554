use thiserror::Error;

/// Errors surfaced by an exchange adapter. Adapters never retry.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("insufficient balance: {available} available, {minimum} required")]
    InsufficientBalance { available: f64, minimum: f64 },

    /// Non-success HTTP status or an error marker in the response envelope.
    #[error("exchange rejected request ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("unexpected response shape: {0}")]
    Decode(String),

    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unsupported exchange: {0:?}")]
    UnsupportedExchange(String),
}

impl From<serde_json::Error> for ExchangeError {
    fn from(e: serde_json::Error) -> Self {
        ExchangeError::Decode(e.to_string())
    }
}
