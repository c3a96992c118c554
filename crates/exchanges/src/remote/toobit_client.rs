use async_trait::async_trait;
use common::models::{Credentials, Side};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::ExchangeError;
use crate::factory::ExchangeKind;
use crate::remote::toobit_response::{
    Balance, MarkPrice, OrderAck, Position, contract_symbol, decode_payload,
};
use crate::remote::{http_client, now_millis, read_body};
use crate::signer::toobit_signed_params;
use crate::sizing::{SizingPolicy, format_quantity, parse_decimal};
use crate::traits::{ExchangeAdapter, OrderHandle};

const TRIGGER_BY: &str = "MARK_PRICE";

/// Toobit USDT-margined perpetual account.
pub struct ToobitAdapter {
    client: Client,
    base_url: String,
    credentials: Credentials,
    sizing: SizingPolicy,
}

impl ToobitAdapter {
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

    async fn signed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ExchangeError> {
        let signed = toobit_signed_params(self.credentials.expose_secret(), params, now_millis());

        // POST carries the signed string as a form body, GET/DELETE as the query.
        let request = if method == Method::POST {
            self.client
                .request(method, format!("{}{}", self.base_url, path))
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(signed)
        } else {
            self.client
                .request(method, format!("{}{}?{}", self.base_url, path, signed))
        };

        let resp = request
            .header("X-BB-APIKEY", self.credentials.api_key())
            .send()
            .await?;
        let (status, text) = read_body("Toobit", resp).await?;
        decode_payload(status, &text)
    }

    async fn mark_price(&self, symbol: &str) -> Result<f64, ExchangeError> {
        let url = format!("{}/quote/v1/markPrice", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("symbol", symbol)])
            .send()
            .await?;
        let (status, text) = read_body("Toobit", resp).await?;

        let mark: MarkPrice = decode_payload(status, &text)?;
        if mark.symbol_id != symbol {
            return Err(ExchangeError::Decode(format!(
                "mark price for {} answered with {}",
                symbol, mark.symbol_id
            )));
        }
        parse_decimal("price", &mark.price)
    }

    async fn available_balance(&self) -> Result<f64, ExchangeError> {
        let balances: Vec<Balance> = self
            .signed(Method::GET, "/api/v1/futures/balance", &[])
            .await?;

        match balances.iter().find(|b| b.asset == self.sizing.quote_asset) {
            Some(balance) => parse_decimal("availableBalance", &balance.available_balance),
            None => Ok(0.0),
        }
    }

    async fn positions(&self, symbol: &str) -> Result<Vec<Position>, ExchangeError> {
        self.signed(
            Method::GET,
            "/api/v1/futures/positions",
            &[("symbol", symbol.to_string())],
        )
        .await
    }

    /// Trading-stop needs the side of the live position it protects.
    async fn set_trading_stop(
        &self,
        market: &str,
        price_key: &str,
        trigger_key: &str,
        price: &str,
    ) -> Result<(), ExchangeError> {
        let symbol = contract_symbol(market);
        let positions = self.positions(&symbol).await?;
        let position = positions
            .iter()
            .find(|p| p.symbol == symbol && p.is_open())
            .ok_or_else(|| ExchangeError::Decode(format!("no open position for {}", symbol)))?;

        let params = [
            ("symbol", symbol.clone()),
            ("side", position.side.clone()),
            (price_key, price.to_string()),
            (trigger_key, TRIGGER_BY.to_string()),
        ];
        let _: Value = self
            .signed(Method::POST, "/api/v1/futures/position/trading-stop", &params)
            .await?;
        Ok(())
    }
}

fn open_side(side: Side) -> &'static str {
    match side {
        Side::Long => "BUY_OPEN",
        Side::Short => "SELL_OPEN",
    }
}

#[async_trait]
impl ExchangeAdapter for ToobitAdapter {
    fn kind(&self) -> ExchangeKind {
        ExchangeKind::Toobit
    }

    async fn compute_position_size(
        &self,
        market: &str,
        leverage: u32,
    ) -> Result<f64, ExchangeError> {
        let mark_price = self.mark_price(&contract_symbol(market)).await?;
        let available = self.available_balance().await?;
        let quantity = self.sizing.position_size(available, leverage, mark_price)?;

        debug!(
            "Toobit sizing {}: available={} leverage={} mark={} qty={}",
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
        let symbol = contract_symbol(market);
        let params = [
            ("symbol", symbol.clone()),
            ("side", open_side(side).to_string()),
            ("type", "STOP".to_string()),
            ("quantity", format_quantity(quantity)),
            ("stopPrice", trigger_price.to_string()),
            ("priceType", "MARKET".to_string()),
            ("newClientOrderId", Uuid::new_v4().simple().to_string()),
        ];

        info!(
            "Toobit stop order: {} {} {} @ {}",
            open_side(side),
            format_quantity(quantity),
            symbol,
            trigger_price
        );
        let ack: OrderAck = self
            .signed(Method::POST, "/api/v1/futures/order", &params)
            .await?;
        Ok(OrderHandle(ack.id()?))
    }

    async fn attach_take_profit(&self, market: &str, price: &str) -> Result<(), ExchangeError> {
        self.set_trading_stop(market, "takeProfit", "tpTriggerBy", price)
            .await
    }

    async fn attach_stop_loss(&self, market: &str, price: &str) -> Result<(), ExchangeError> {
        self.set_trading_stop(market, "stopLoss", "slTriggerBy", price)
            .await
    }

    async fn poll_position(&self, market: &str) -> Result<bool, ExchangeError> {
        let symbol = contract_symbol(market);
        let positions = self.positions(&symbol).await?;
        Ok(positions.iter().any(|p| p.symbol == symbol && p.is_open()))
    }

    async fn cancel_all_orders(&self, market: &str) -> Result<(), ExchangeError> {
        let _: Value = self
            .signed(
                Method::DELETE,
                "/api/v1/futures/batchOrders",
                &[("symbol", contract_symbol(market))],
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::stub;
    use crate::signer::sign_hex;

    fn adapter(base_url: &str) -> ToobitAdapter {
        ToobitAdapter::new(
            base_url,
            Credentials::new("toobit-key", "toobit-secret"),
            SizingPolicy::default(),
        )
        .unwrap()
    }

    /// Splits `...&signature=<hex>` and checks the hex against the preceding bytes.
    fn assert_signed(signed: &str) {
        let (payload, signature) = signed.rsplit_once("&signature=").unwrap();
        assert_eq!(sign_hex("toobit-secret", payload), signature);
        assert!(payload.contains("timestamp="));
    }

    #[tokio::test]
    async fn test_position_size() {
        let (base_url, recorded) = stub::serve(vec![
            (
                "/quote/v1/markPrice",
                200,
                r#"{"exchangeId":301,"symbolId":"BTC-SWAP-USDT","price":"50000","time":1700000000000}"#
                    .to_string(),
            ),
            (
                "/api/v1/futures/balance",
                200,
                r#"[{"asset":"USDT","balance":"100","availableBalance":"100"}]"#.to_string(),
            ),
        ])
        .await;

        let qty = adapter(&base_url)
            .compute_position_size("BTCUSDT", 10)
            .await
            .unwrap();
        assert!((qty - 0.002).abs() < 1e-12, "got {}", qty);

        let requests = recorded.lock().unwrap().clone();
        let balance = requests
            .iter()
            .find(|r| r.request_line().contains("/api/v1/futures/balance"))
            .unwrap();
        assert_eq!(balance.header("x-bb-apikey"), Some("toobit-key"));

        let query = balance
            .request_line()
            .split_whitespace()
            .nth(1)
            .and_then(|target| target.split_once('?'))
            .map(|(_, query)| query.to_string())
            .unwrap();
        assert_signed(&query);
    }

    #[tokio::test]
    async fn test_open_position_posts_signed_form() {
        let (base_url, recorded) = stub::serve(vec![(
            "/api/v1/futures/order",
            200,
            r#"{"orderId":"1470930457684189696","symbol":"BTC-SWAP-USDT"}"#.to_string(),
        )])
        .await;

        let handle = adapter(&base_url)
            .open_position(Side::Long, "BTCUSDT", 0.002, "50000")
            .await
            .unwrap();
        assert_eq!(handle.0, "1470930457684189696");

        let requests = recorded.lock().unwrap().clone();
        let body = &requests[0].body;
        assert!(body.starts_with("symbol=BTC-SWAP-USDT&side=BUY_OPEN&type=STOP&quantity=0.002"));
        assert!(body.contains("stopPrice=50000"));
        assert_signed(body);
    }

    #[tokio::test]
    async fn test_take_profit_uses_live_position_side() {
        let (base_url, recorded) = stub::serve(vec![
            (
                "/api/v1/futures/positions",
                200,
                r#"[{"symbol":"BTC-SWAP-USDT","side":"SHORT","position":"3","avgPrice":"50000"}]"#
                    .to_string(),
            ),
            (
                "/api/v1/futures/position/trading-stop",
                200,
                r#"{"symbol":"BTC-SWAP-USDT","takeProfit":"48000"}"#.to_string(),
            ),
        ])
        .await;

        adapter(&base_url)
            .attach_take_profit("BTCUSDT", "48000")
            .await
            .unwrap();

        let requests = recorded.lock().unwrap().clone();
        let trading_stop = requests
            .iter()
            .find(|r| r.request_line().contains("trading-stop"))
            .unwrap();
        assert!(trading_stop.body.contains("side=SHORT"));
        assert!(trading_stop.body.contains("takeProfit=48000&tpTriggerBy=MARK_PRICE"));
    }

    #[tokio::test]
    async fn test_stop_loss_without_position_fails() {
        let (base_url, _) =
            stub::serve(vec![("/api/v1/futures/positions", 200, "[]".to_string())]).await;

        let err = adapter(&base_url)
            .attach_stop_loss("BTCUSDT", "49000")
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::Decode(_)));
    }

    #[tokio::test]
    async fn test_poll_and_cancel() {
        let (base_url, recorded) = stub::serve(vec![
            ("/api/v1/futures/positions", 200, "[]".to_string()),
            ("/api/v1/futures/batchOrders", 200, r#"{"code":200,"message":"success"}"#.to_string()),
        ])
        .await;

        let adapter = adapter(&base_url);
        assert!(!adapter.poll_position("BTCUSDT").await.unwrap());
        adapter.cancel_all_orders("BTCUSDT").await.unwrap();

        let requests = recorded.lock().unwrap().clone();
        assert!(requests[1].request_line().starts_with("DELETE /api/v1/futures/batchOrders?symbol=BTC-SWAP-USDT"));
    }

    #[tokio::test]
    async fn test_rejected_order() {
        let (base_url, _) = stub::serve(vec![(
            "/api/v1/futures/order",
            400,
            r#"{"code":-1130,"msg":"Data sent for parameter 'quantity' is not valid."}"#.to_string(),
        )])
        .await;

        let err = adapter(&base_url)
            .open_position(Side::Long, "BTCUSDT", 0.0, "50000")
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::Api { status: 400, .. }));
    }
}
