//! Domain layer - Orders, work items, prices, errors.
//!
//! Pure data and rules for the OTC pipeline. Nothing in here performs
//! I/O; ports and usecases build on these types.

pub mod errors;
pub mod order;
pub mod pricing;
#[warn(missing_docs)]
pub mod work;

// Re-export core types for convenience
pub use errors::{ConnectorError, CurrencyError, ModelError, StageError};
pub use order::{Currency, Destination, DropAddress, Order, OrderId, Status, Times, User};
pub use pricing::{Price, PriceQuote, Pricer, Source};
pub use work::{Backoff, SharedOrder, StageResult, WorkItem};
