//! Use Cases Layer - Application Business Logic
//!
//! Orchestrates domain logic with port interfaces to implement the
//! order pipeline. Orders flow scanner → router → sender → router →
//! monitor → router, with the router persisting every transition
//! before handing the order on.
//!
//! Use cases:
//! - `Actor`: In-flight set plus per-item task, ticked by a poll loop
//! - `Controller`: Pause flag and stop fan-out for every loop
//! - `Currencies`: Connector and pricer registry
//! - `DepositScan`, `SendPayout`, `Confirm`: The three stage tasks
//! - `RouterTask`: Persist-then-route hub
//! - `Model`: Assembly, recovery, queries, operator retry
//! - `PriceRefresher`: Exchange polling with internal failover
//! - `AdminApi`, `PublicApi`: Operator and user operations

#[warn(missing_docs)]
pub mod actor;
pub mod admin;
pub mod controller;
pub mod currencies;
pub mod lookup;
pub mod model;
pub mod monitor;
pub mod price_refresher;
pub mod public;
pub mod router;
pub mod scanner;
pub mod sender;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
