use common::models::Signal;

use crate::extractor::{FieldKeys, ValidationError, extract_with};

/// A source channel that knows how to read its own posts.
pub trait SignalParser: Send + Sync {
    fn name(&self) -> &str;

    fn parse_signal(&self, message: &str) -> Result<Signal, ValidationError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelProfile {
    pub name: &'static str,
    /// Numeric channel id without the bot-API `-100` prefix.
    pub channel_id: i64,
    pub url: &'static str,
    pub keys: FieldKeys,
}

pub const CRYPTO_TRADE_066: ChannelProfile = ChannelProfile {
    name: "CryptoTrade066",
    channel_id: 1261856999,
    url: "https://t.me/CryptoTrade066",
    keys: FieldKeys::PERSIAN,
};

pub fn available_channels() -> Vec<ChannelProfile> {
    vec![CRYPTO_TRADE_066]
}

impl ChannelProfile {
    /// Whether a bot-API chat id (`-100<id>`) or a raw MTProto id refers to this channel.
    pub fn matches_chat(&self, chat_id: i64) -> bool {
        chat_id == self.channel_id || chat_id == self.bot_api_chat_id()
    }

    pub fn bot_api_chat_id(&self) -> i64 {
        -1_000_000_000_000 - self.channel_id
    }
}

impl SignalParser for ChannelProfile {
    fn name(&self) -> &str {
        self.name
    }

    fn parse_signal(&self, message: &str) -> Result<Signal, ValidationError> {
        extract_with(message, &self.keys)
    }
}
