use crate::error::ExchangeError;

/// How much of the free balance a single signal may commit as margin.
#[derive(Debug, Clone, PartialEq)]
pub struct SizingPolicy {
    pub margin_fraction: f64,
    pub min_margin: f64,
    pub quote_asset: String,
}

impl Default for SizingPolicy {
    fn default() -> Self {
        Self {
            margin_fraction: 0.10,
            min_margin: 2.0,
            quote_asset: "USDT".to_string(),
        }
    }
}

impl SizingPolicy {
    /// `(max(available * fraction, min_margin) * leverage) / mark_price`
    pub fn position_size(
        &self,
        available: f64,
        leverage: u32,
        mark_price: f64,
    ) -> Result<f64, ExchangeError> {
        if available < self.min_margin {
            return Err(ExchangeError::InsufficientBalance {
                available,
                minimum: self.min_margin,
            });
        }
        if !mark_price.is_finite() || mark_price <= 0.0 {
            return Err(ExchangeError::Decode(format!(
                "mark price must be positive, got {}",
                mark_price
            )));
        }

        let margin = (available * self.margin_fraction).max(self.min_margin);
        let quantity = margin * f64::from(leverage) / mark_price;
        if format_quantity(quantity) == "0" {
            return Err(ExchangeError::Decode(format!(
                "position size {:e} rounds to zero at mark price {}",
                quantity, mark_price
            )));
        }
        Ok(quantity)
    }
}

/// Renders a quantity with at most eight decimals and no trailing zeros.
pub fn format_quantity(quantity: f64) -> String {
    let fixed = format!("{:.8}", quantity);
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Parses a decimal string field of an exchange payload.
pub(crate) fn parse_decimal(field: &str, raw: &str) -> Result<f64, ExchangeError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| ExchangeError::Decode(format!("{} is not a number: {:?}", field, raw)))
}
