pub mod channels;
pub mod extractor;

pub use channels::{CRYPTO_TRADE_066, ChannelProfile, SignalParser, available_channels};
pub use extractor::{FieldKeys, ValidationError, extract, extract_with};
