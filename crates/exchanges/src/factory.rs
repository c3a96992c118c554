use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use common::config::{DEFAULT_COINEX_BASE_URL, DEFAULT_TOOBIT_BASE_URL};
use common::models::Credentials;

use crate::error::ExchangeError;
use crate::remote::{CoinexAdapter, ToobitAdapter};
use crate::sizing::SizingPolicy;
use crate::traits::ExchangeAdapter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeKind {
    Coinex,
    Toobit,
}

impl ExchangeKind {
    pub const ALL: [ExchangeKind; 2] = [ExchangeKind::Coinex, ExchangeKind::Toobit];

    pub fn name(&self) -> &'static str {
        match self {
            ExchangeKind::Coinex => "Coinex",
            ExchangeKind::Toobit => "Toobit",
        }
    }

    pub fn homepage(&self) -> &'static str {
        match self {
            ExchangeKind::Coinex => "https://www.coinex.com",
            ExchangeKind::Toobit => "https://www.toobit.com",
        }
    }
}

impl FromStr for ExchangeKind {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "coinex" => Ok(ExchangeKind::Coinex),
            "toobit" => Ok(ExchangeKind::Toobit),
            _ => Err(ExchangeError::UnsupportedExchange(s.to_string())),
        }
    }
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeEndpoints {
    pub coinex: String,
    pub toobit: String,
}

impl Default for ExchangeEndpoints {
    fn default() -> Self {
        Self {
            coinex: DEFAULT_COINEX_BASE_URL.to_string(),
            toobit: DEFAULT_TOOBIT_BASE_URL.to_string(),
        }
    }
}

/// Builds one adapter instance per subscriber account.
#[derive(Debug, Clone, Default)]
pub struct AdapterFactory {
    endpoints: ExchangeEndpoints,
    sizing: SizingPolicy,
}

impl AdapterFactory {
    pub fn new(endpoints: ExchangeEndpoints, sizing: SizingPolicy) -> Self {
        Self { endpoints, sizing }
    }

    pub fn build(
        &self,
        kind: ExchangeKind,
        credentials: &Credentials,
    ) -> Result<Arc<dyn ExchangeAdapter>, ExchangeError> {
        let adapter: Arc<dyn ExchangeAdapter> = match kind {
            ExchangeKind::Coinex => Arc::new(CoinexAdapter::new(
                &self.endpoints.coinex,
                credentials.clone(),
                self.sizing.clone(),
            )?),
            ExchangeKind::Toobit => Arc::new(ToobitAdapter::new(
                &self.endpoints.toobit,
                credentials.clone(),
                self.sizing.clone(),
            )?),
        };
        Ok(adapter)
    }

    /// Resolves an exchange by the name a subscriber picked.
    pub fn build_named(
        &self,
        exchange: &str,
        credentials: &Credentials,
    ) -> Result<Arc<dyn ExchangeAdapter>, ExchangeError> {
        self.build(exchange.parse()?, credentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_are_case_insensitive() {
        assert_eq!("Coinex".parse::<ExchangeKind>().unwrap(), ExchangeKind::Coinex);
        assert_eq!(" TOOBIT ".parse::<ExchangeKind>().unwrap(), ExchangeKind::Toobit);
    }

    #[test]
    fn test_unknown_exchange_fails_fast() {
        let factory = AdapterFactory::default();
        let creds = Credentials::new("key", "secret");

        let err = factory.build_named("Binance", &creds).err().unwrap();
        assert!(matches!(err, ExchangeError::UnsupportedExchange(name) if name == "Binance"));
    }

    #[test]
    fn test_builds_each_kind() {
        let factory = AdapterFactory::default();
        let creds = Credentials::new("key", "secret");

        for kind in ExchangeKind::ALL {
            let adapter = factory.build(kind, &creds).unwrap();
            assert_eq!(adapter.kind(), kind);
        }
    }
}
