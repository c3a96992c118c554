use async_trait::async_trait;
use common::models::{Credentials, Side};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};
use url::form_urlencoded;

use crate::error::ExchangeError;
use crate::factory::ExchangeKind;
use crate::remote::coinex_response::{
    Balance, CancelAllRequest, MARKET_TYPE, PRICE_TYPE, Position, StopLossRequest, StopOrderAck,
    StopOrderRequest, TakeProfitRequest, Ticker, decode_envelope,
};
use crate::remote::{http_client, now_millis, read_body};
use crate::signer::{coinex_prepared, sign_hex};
use crate::sizing::{SizingPolicy, format_quantity, parse_decimal};
use crate::traits::{ExchangeAdapter, OrderHandle};

/// CoinEx v2 futures account.
pub struct CoinexAdapter {
    client: Client,
    base_url: String,
    credentials: Credentials,
    sizing: SizingPolicy,
}

impl CoinexAdapter {
    pub fn new(
        base_url: &str,
        credentials: Credentials,
        sizing: SizingPolicy,
    ) -> Result<Self, ExchangeError> {
        Ok(Self {
            client: http_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            sizing,
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, ExchangeError> {
        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params)
            .finish();
        self.call(Method::GET, path, &query, String::new()).await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ExchangeError> {
        let body = serde_json::to_string(body)?;
        self.call(Method::POST, path, "", body).await
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &str,
        body: String,
    ) -> Result<T, ExchangeError> {
        let timestamp = now_millis();
        let prepared = coinex_prepared(method.as_str(), path, query, &body, timestamp);
        let signature = sign_hex(self.credentials.expose_secret(), &prepared);

        let url = if query.is_empty() {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}{}?{}", self.base_url, path, query)
        };

        let mut request = self
            .client
            .request(method, &url)
            .header("X-COINEX-KEY", self.credentials.api_key())
            .header("X-COINEX-SIGN", signature)
            .header("X-COINEX-TIMESTAMP", timestamp.to_string())
            .header(CONTENT_TYPE, "application/json");
        if !body.is_empty() {
            request = request.body(body);
        }

        let resp = request.send().await?;
        let (status, text) = read_body("CoinEx", resp).await?;
        decode_envelope(status, &text)
    }

    async fn mark_price(&self, market: &str) -> Result<f64, ExchangeError> {
        let tickers: Vec<Ticker> = self.get("/v2/futures/ticker", &[("market", market)]).await?;
        let ticker = tickers
            .iter()
            .find(|t| t.market == market)
            .ok_or_else(|| ExchangeError::Decode(format!("no ticker for {}", market)))?;

        parse_decimal("mark_price", &ticker.mark_price)
    }

    async fn available_balance(&self) -> Result<f64, ExchangeError> {
        let balances: Vec<Balance> = self.get("/v2/assets/futures/balance", &[]).await?;

        match balances.iter().find(|b| b.ccy == self.sizing.quote_asset) {
            Some(balance) => parse_decimal("available", &balance.available),
            None => Ok(0.0),
        }
    }

    async fn pending_positions(&self, market: &str) -> Result<Vec<Position>, ExchangeError> {
        self.get(
            "/v2/futures/pending-position",
            &[("market", market), ("market_type", MARKET_TYPE)],
        )
        .await
    }
}

#[async_trait]
impl ExchangeAdapter for CoinexAdapter {
    fn kind(&self) -> ExchangeKind {
        ExchangeKind::Coinex
    }

    async fn compute_position_size(
        &self,
        market: &str,
        leverage: u32,
    ) -> Result<f64, ExchangeError> {
        let mark_price = self.mark_price(market).await?;
        let available = self.available_balance().await?;
        let quantity = self.sizing.position_size(available, leverage, mark_price)?;

        debug!(
            "CoinEx sizing {}: available={} leverage={} mark={} qty={}",
            market, available, leverage, mark_price, quantity
        );
        Ok(quantity)
    }

    async fn open_position(
        &self,
        side: Side,
        market: &str,
        quantity: f64,
        trigger_price: &str,
    ) -> Result<OrderHandle, ExchangeError> {
        let req = StopOrderRequest {
            market,
            market_type: MARKET_TYPE,
            side: side.order_side(),
            order_type: "market",
            amount: format_quantity(quantity),
            trigger_price_type: PRICE_TYPE,
            trigger_price,
        };

        info!(
            "CoinEx stop order: {} {} {} @ {}",
            req.side, req.amount, market, trigger_price
        );
        let ack: StopOrderAck = self.post("/v2/futures/stop-order", &req).await?;
        Ok(OrderHandle(ack.stop_id.to_string()))
    }

    async fn attach_take_profit(&self, market: &str, price: &str) -> Result<(), ExchangeError> {
        let req = TakeProfitRequest {
            market,
            market_type: MARKET_TYPE,
            take_profit_type: PRICE_TYPE,
            take_profit_price: price,
        };
        let _: Value = self
            .post("/v2/futures/set-position-take-profit", &req)
            .await?;
        Ok(())
    }

    async fn attach_stop_loss(&self, market: &str, price: &str) -> Result<(), ExchangeError> {
        let req = StopLossRequest {
            market,
            market_type: MARKET_TYPE,
            stop_loss_type: PRICE_TYPE,
            stop_loss_price: price,
        };
        let _: Value = self.post("/v2/futures/set-position-stop-loss", &req).await?;
        Ok(())
    }

    async fn poll_position(&self, market: &str) -> Result<bool, ExchangeError> {
        let positions = self.pending_positions(market).await?;
        Ok(positions.iter().any(|p| p.market == market && p.is_open()))
    }

    async fn cancel_all_orders(&self, market: &str) -> Result<(), ExchangeError> {
        let req = CancelAllRequest {
            market,
            market_type: MARKET_TYPE,
        };
        let _: Value = self.post("/v2/futures/cancel-all-order", &req).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::stub;

    fn ok(data: &str) -> String {
        format!(r#"{{"code":0,"message":"OK","data":{}}}"#, data)
    }

    fn adapter(base_url: &str) -> CoinexAdapter {
        CoinexAdapter::new(
            base_url,
            Credentials::new("coinex-key", "coinex-secret"),
            SizingPolicy::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_position_size_from_mark_price_and_balance() {
        let (base_url, _) = stub::serve(vec![
            (
                "/v2/futures/ticker",
                200,
                ok(r#"[{"market":"BTCUSDT","last":"50100","mark_price":"50000"}]"#),
            ),
            (
                "/v2/assets/futures/balance",
                200,
                ok(r#"[{"ccy":"USDC","available":"900"},{"ccy":"USDT","available":"100","frozen":"0"}]"#),
            ),
        ])
        .await;

        let qty = adapter(&base_url)
            .compute_position_size("BTCUSDT", 10)
            .await
            .unwrap();

        assert!((qty - 0.002).abs() < 1e-12, "got {}", qty);
    }

    #[tokio::test]
    async fn test_low_balance_is_insufficient() {
        let (base_url, _) = stub::serve(vec![
            (
                "/v2/futures/ticker",
                200,
                ok(r#"[{"market":"BTCUSDT","last":"50100","mark_price":"50000"}]"#),
            ),
            (
                "/v2/assets/futures/balance",
                200,
                ok(r#"[{"ccy":"USDT","available":"1.5"}]"#),
            ),
        ])
        .await;

        let err = adapter(&base_url)
            .compute_position_size("BTCUSDT", 20)
            .await
            .unwrap_err();

        assert!(matches!(err, ExchangeError::InsufficientBalance { .. }));
    }

    #[tokio::test]
    async fn test_stop_order_is_signed() {
        let (base_url, recorded) =
            stub::serve(vec![("/v2/futures/stop-order", 200, ok(r#"{"stop_id":987654}"#))]).await;

        let handle = adapter(&base_url)
            .open_position(Side::Short, "BTCUSDT", 0.002, "50000")
            .await
            .unwrap();
        assert_eq!(handle, OrderHandle("987654".to_string()));

        let requests = recorded.lock().unwrap().clone();
        let request = &requests[0];
        assert!(request.request_line().starts_with("POST /v2/futures/stop-order"));
        assert!(request.body.contains(r#""side":"sell""#));
        assert!(request.body.contains(r#""amount":"0.002""#));
        assert_eq!(request.header("x-coinex-key"), Some("coinex-key"));

        let timestamp: i64 = request
            .header("x-coinex-timestamp")
            .unwrap()
            .parse()
            .unwrap();
        let expected = sign_hex(
            "coinex-secret",
            &coinex_prepared("POST", "/v2/futures/stop-order", "", &request.body, timestamp),
        );
        assert_eq!(request.header("x-coinex-sign"), Some(expected.as_str()));
    }

    #[tokio::test]
    async fn test_poll_position_reads_pending_positions() {
        let (base_url, recorded) = stub::serve(vec![(
            "/v2/futures/pending-position",
            200,
            ok(r#"[{"market":"BTCUSDT","side":"long","open_interest":"0.002"}]"#),
        )])
        .await;

        assert!(adapter(&base_url).poll_position("BTCUSDT").await.unwrap());

        let requests = recorded.lock().unwrap().clone();
        assert!(
            requests[0]
                .request_line()
                .contains("/v2/futures/pending-position?market=BTCUSDT&market_type=FUTURES")
        );
    }

    #[tokio::test]
    async fn test_empty_position_list_means_closed() {
        let (base_url, _) =
            stub::serve(vec![("/v2/futures/pending-position", 200, ok("[]"))]).await;

        assert!(!adapter(&base_url).poll_position("BTCUSDT").await.unwrap());
    }

    #[tokio::test]
    async fn test_http_failure_is_api_error() {
        let (base_url, _) = stub::serve(vec![(
            "/v2/futures/cancel-all-order",
            503,
            "upstream unavailable".to_string(),
        )])
        .await;

        let err = adapter(&base_url)
            .cancel_all_orders("BTCUSDT")
            .await
            .unwrap_err();

        assert!(matches!(err, ExchangeError::Api { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_envelope_error_on_take_profit() {
        let (base_url, _) = stub::serve(vec![(
            "/v2/futures/set-position-take-profit",
            200,
            r#"{"code":3109,"message":"position not exist","data":{}}"#.to_string(),
        )])
        .await;

        let err = adapter(&base_url)
            .attach_take_profit("BTCUSDT", "52000")
            .await
            .unwrap_err();

        assert!(matches!(err, ExchangeError::Api { status: 200, .. }));
    }
}
