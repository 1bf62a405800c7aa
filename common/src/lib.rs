//! pricefx Common Types
//!
//! Shared value types used across pricefx: currency codes, display
//! settings, exchange rate snapshots and amount normalization.

pub mod amount;
pub mod currency;
pub mod error;
pub mod snapshot;
pub mod time;

pub use amount::*;
pub use currency::*;
pub use error::*;
pub use snapshot::*;
pub use time::*;
