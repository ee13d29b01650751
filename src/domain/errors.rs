//! Error taxonomy for the pipeline.
//!
//! Connector errors are split into transient faults (retried on the next
//! tick) and definitive rejections. Stage errors are what a stage hands
//! back to the router when it gives up on an order.

use thiserror::Error;

use super::order::{Currency, OrderId, Status};

/// Failure reported by a currency connector.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Node unreachable, timed out, or temporarily failing.
    #[error("connector unavailable: {0}")]
    Unavailable(String),
    /// The node understood the request and refused it.
    #[error("connector rejected request: {0}")]
    Rejected(String),
    /// Anything else (malformed response, local failure).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ConnectorError {
    /// Transient faults are retried in place instead of failing the stage.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Failure from the currency registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CurrencyError {
    #[error("connection already exists for {0}")]
    ConnectionExists(Currency),
    #[error("connection missing for {0}")]
    ConnectionMissing(Currency),
    #[error("price missing for {0}")]
    PriceMissing(Currency),
    #[error("zero amount")]
    ZeroAmount,
}

/// Why a stage gave up on an order.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Connector(#[from] ConnectorError),
    #[error(transparent)]
    Currency(#[from] CurrencyError),
    /// Payout was started earlier but its result was never persisted.
    #[error("send outcome unknown for order started at {started_at}; verify on chain before retrying")]
    SendOutcomeUnknown { started_at: i64 },
    #[error("order has no txid to confirm")]
    MissingTxid,
    #[error("invalid transition {from} -> {to}")]
    InvalidTransition { from: Status, to: Status },
    #[error("storage: {0}")]
    Storage(String),
}

impl StageError {
    /// Whether the stage should keep the order and try again next tick.
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Connector(e) => e.is_transient(),
            Self::Storage(_) => true,
            _ => false,
        }
    }
}

/// Failure surfaced by the model and its operator/public facades.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("order missing: {0}")]
    OrderMissing(String),
    #[error("order already exists: {0}")]
    DuplicateOrder(OrderId),
    #[error("service is paused")]
    Paused,
    #[error("unsupported currency: {0}")]
    Unsupported(String),
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("order {id} is already {status}")]
    AlreadyFinished { id: OrderId, status: Status },
    #[error(transparent)]
    Currency(#[from] CurrencyError),
    #[error(transparent)]
    Stage(#[from] StageError),
    #[error("storage: {0:#}")]
    Storage(#[from] anyhow::Error),
}
