use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A trade instruction lifted out of a channel post.
///
/// Every value is the normalized text found in the message; typed views are
/// derived on demand so the extracted signal stays a faithful copy of the post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    pub market: String,
    pub position: String,
    pub entry_points: Vec<String>,
    pub targets: Vec<String>,
    pub stop_loss: String,
    pub leverage: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignalError {
    #[error("unknown position side: {0:?}")]
    UnknownSide(String),
    #[error("invalid leverage: {0:?}")]
    InvalidLeverage(String),
    #[error("signal has no {0}")]
    Empty(&'static str),
}

impl Signal {
    pub fn side(&self) -> Result<Side, SignalError> {
        self.position.parse()
    }

    /// Leverage as a multiplier. `10`, `10x` and `X10` are all accepted.
    pub fn leverage_multiplier(&self) -> Result<u32, SignalError> {
        let digits = self.leverage.trim_matches(|c| c == 'x' || c == 'X');
        match digits.parse::<u32>() {
            Ok(value) if value > 0 => Ok(value),
            _ => Err(SignalError::InvalidLeverage(self.leverage.clone())),
        }
    }

    pub fn first_entry(&self) -> Result<&str, SignalError> {
        self.entry_points
            .first()
            .map(String::as_str)
            .ok_or(SignalError::Empty("entry point"))
    }

    pub fn first_target(&self) -> Result<&str, SignalError> {
        self.targets
            .first()
            .map(String::as_str)
            .ok_or(SignalError::Empty("target"))
    }
}

impl Side {
    /// Lowercase order side used by exchanges that speak buy/sell.
    pub fn order_side(&self) -> &'static str {
        match self {
            Side::Long => "buy",
            Side::Short => "sell",
        }
    }
}

impl std::str::FromStr for Side {
    type Err = SignalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "long" | "buy" => Ok(Side::Long),
            "short" | "sell" => Ok(Side::Short),
            _ => Err(SignalError::UnknownSide(s.to_string())),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "Long"),
            Side::Short => write!(f, "Short"),
        }
    }
}
