use std::time::Duration;

use reqwest::{Client, Response};
use tracing::error;

use crate::error::ExchangeError;

pub mod coinex_client;
pub mod coinex_response;
pub mod toobit_client;
pub mod toobit_response;

pub use coinex_client::CoinexAdapter;
pub use toobit_client::ToobitAdapter;

pub(crate) fn http_client() -> Result<Client, ExchangeError> {
    Ok(Client::builder()
        .user_agent("teletrade/0.1.0")
        .timeout(Duration::from_secs(10))
        .build()?)
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Reads the body, turning a non-success status into `ExchangeError::Api`.
pub(crate) async fn read_body(exchange: &str, resp: Response) -> Result<(u16, String), ExchangeError> {
    let status = resp.status();
    let body = resp.text().await?;

    if !status.is_success() {
        error!("{} request failed with {}: {}", exchange, status, body);
        return Err(ExchangeError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok((status.as_u16(), body))
}
