use std::collections::HashSet;

use serde::Deserialize;

use crate::models::Credentials;

/// Chat identity of a subscriber.
pub type SubscriptionId = i64;

/// Point-in-time view of a subscription as published by the conversational layer.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionSnapshot {
    pub subscription_id: SubscriptionId,
    #[serde(default)]
    pub exchange: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub channels: HashSet<String>,
}

impl SubscriptionSnapshot {
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.api_key.clone(), self.secret_key.clone())
    }
}
