use hmac::{Hmac, Mac};
use sha2::Sha256;
use url::form_urlencoded;

type HmacSha256 = Hmac<Sha256>;

/// Lowercase hex HMAC-SHA256 of `message` keyed with `secret`.
pub fn sign_hex(secret: &str, message: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// CoinEx v2 canonical string: method, path, `?query` (if any), body, timestamp.
pub fn coinex_prepared(method: &str, path: &str, query: &str, body: &str, timestamp: i64) -> String {
    let query = if query.is_empty() {
        String::new()
    } else {
        format!("?{}", query)
    };
    format!("{}{}{}{}{}", method.to_uppercase(), path, query, body, timestamp)
}

/// Toobit signed parameter string.
///
/// Parameters are form-encoded in the given order, `timestamp` goes last and
/// the HMAC of that exact string is appended as `signature`.
pub fn toobit_signed_params(secret: &str, params: &[(&str, String)], timestamp: i64) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        serializer.append_pair(key, value);
    }
    serializer.append_pair("timestamp", &timestamp.to_string());
    let total_params = serializer.finish();

    let signature = sign_hex(secret, &total_params);
    format!("{}&signature={}", total_params, signature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_known_vector() {
        // Binance-style documented vector; both exchanges use plain HMAC-SHA256 hex.
        let secret = "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j";
        let query = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";

        assert_eq!(
            sign_hex(secret, query),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn test_coinex_get_signature() {
        let prepared = coinex_prepared(
            "GET",
            "/v2/futures/pending-position",
            "market=BTCUSDT&market_type=FUTURES",
            "",
            1_700_000_000_000,
        );

        assert_eq!(
            prepared,
            "GET/v2/futures/pending-position?market=BTCUSDT&market_type=FUTURES1700000000000"
        );
        assert_eq!(
            sign_hex("secret", &prepared),
            "dfe0a6c414e35843b174a181e895b666fce9c6f623b74e588632301e1cdfa295"
        );
    }

    #[test]
    fn test_coinex_post_signature() {
        let body = r#"{"market":"BTCUSDT","market_type":"FUTURES"}"#;
        let prepared = coinex_prepared(
            "post",
            "/v2/futures/cancel-all-order",
            "",
            body,
            1_700_000_000_000,
        );

        assert_eq!(
            sign_hex("secret", &prepared),
            "82b1804418f031a10025b5f17f6c7cd8242b001ee0b8a5c84d233c3daba45a30"
        );
    }

    #[test]
    fn test_toobit_signed_params() {
        let signed = toobit_signed_params(
            "secret",
            &[("symbol", "BTC-SWAP-USDT".to_string())],
            1_700_000_000_000,
        );

        assert_eq!(
            signed,
            "symbol=BTC-SWAP-USDT&timestamp=1700000000000\
             &signature=c926d6ad0997835e581f5b4801787d28edfd9ba7866bc2852ff9650ca079f0a8"
        );
    }

    #[test]
    fn test_toobit_preserves_parameter_order() {
        let signed = toobit_signed_params(
            "secret",
            &[("zebra", "1".to_string()), ("alpha", "2".to_string())],
            1000,
        );

        assert!(signed.starts_with("zebra=1&alpha=2&timestamp=1000&signature="));
    }
}
