pub mod credentials;
pub mod signal;
pub mod subscription;

pub use credentials::Credentials;
pub use signal::{Side, Signal, SignalError};
pub use subscription::{SubscriptionId, SubscriptionSnapshot};
