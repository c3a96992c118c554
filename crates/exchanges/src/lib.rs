pub mod error;
pub mod factory;
pub mod remote;
pub mod signer;
pub mod sizing;
pub mod traits;

pub use error::ExchangeError;
pub use factory::{AdapterFactory, ExchangeEndpoints, ExchangeKind};
pub use sizing::SizingPolicy;
pub use traits::{ExchangeAdapter, OrderHandle};

#[cfg(any(test, feature = "mock"))]
pub use traits::MockExchangeAdapter;
