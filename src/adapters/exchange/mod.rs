//! Exchange Adapters - Market Price Sources
//!
//! REST ticker client feeding the EXCHANGE price source of each
//! deposit currency's pricer.

pub mod ticker;

pub use ticker::TickerFeed;
