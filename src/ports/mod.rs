//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the usecases layer requires
//! from the outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `CurrencyConnector`: Per-currency node access (balance, send, confirm)
//! - `OrderStore`: Durable order records and the transition audit log
//! - `RateFeed`: External exchange price source

pub mod connector;
pub mod rate_feed;
pub mod storage;
