//! Order domain types.
//!
//! Defines the unit of work moved through the pipeline: currencies,
//! addresses, the order status machine, and the persisted order record.
//! These types are the inner ring of the hexagonal architecture and
//! serialize directly to the per-order JSON record on disk.

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────
// Identifiers
// ────────────────────────────────────────────

/// Stable order identifier: `{destination}:{drop_currency}:{drop_address}`.
pub type OrderId = String;

/// Current unix time in seconds.
pub fn now_unix() -> i64 {
    Utc::now().timestamp()
}

// ────────────────────────────────────────────
// Currency
// ────────────────────────────────────────────

/// Currencies the exchange can accept deposits in or pay out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Currency {
    /// Bitcoin, amounts in satoshis.
    BTC,
    /// Skycoin, amounts in droplets (1e-6 SKY).
    SKY,
    /// Ether, amounts in wei.
    ETH,
}

impl Currency {
    /// All supported currencies.
    pub const ALL: [Self; 3] = [Self::BTC, Self::SKY, Self::ETH];

    /// Ticker symbol as used on the wire and in order identifiers.
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::BTC => "BTC",
            Self::SKY => "SKY",
            Self::ETH => "ETH",
        }
    }

    /// Decimal places of the base unit (satoshi, droplet, wei).
    pub const fn decimals(self) -> u32 {
        match self {
            Self::BTC => 8,
            Self::SKY => 6,
            Self::ETH => 18,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Error returned when parsing an unknown currency symbol.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported currency: {0}")]
pub struct UnknownCurrency(pub String);

impl FromStr for Currency {
    type Err = UnknownCurrency;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BTC" => Ok(Self::BTC),
            "SKY" => Ok(Self::SKY),
            "ETH" => Ok(Self::ETH),
            _ => Err(UnknownCurrency(s.to_string())),
        }
    }
}

// ────────────────────────────────────────────
// Status machine
// ────────────────────────────────────────────

/// Lifecycle status of an order.
///
/// Transitions only move forward through
/// `PendingDeposit → PendingSend → PendingConfirm → Done`, except the
/// deposit timeout `PendingDeposit → Expired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// Waiting for the user to fund the drop address.
    #[serde(rename = "waiting_deposit")]
    PendingDeposit,
    /// Deposit observed; payout not yet sent.
    #[serde(rename = "waiting_send")]
    PendingSend,
    /// Payout sent; waiting for chain confirmation.
    #[serde(rename = "waiting_confirm")]
    PendingConfirm,
    /// Payout confirmed.
    #[serde(rename = "done")]
    Done,
    /// No deposit arrived before the expiration window closed.
    #[serde(rename = "expired")]
    Expired,
}

impl Status {
    /// Whether no further stage will ever pick this order up.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Expired)
    }

    /// Position on the forward path, used to check monotonic progress.
    const fn rank(self) -> u8 {
        match self {
            Self::PendingDeposit => 0,
            Self::PendingSend => 1,
            Self::PendingConfirm => 2,
            Self::Done => 3,
            Self::Expired => 4,
        }
    }

    /// Whether moving from `self` to `next` respects the forward-only rule.
    ///
    /// Staying in place is allowed (a failed stage is re-persisted in its
    /// last good state). `Expired` is only reachable from `PendingDeposit`.
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (a, b) if a.rank() == b.rank() => true,
            (Self::PendingDeposit, Self::Expired) => true,
            (_, Self::Expired) | (Self::Expired | Self::Done, _) => false,
            (a, b) => a.rank() < b.rank(),
        }
    }

    /// Wire name, matching the serialized form.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PendingDeposit => "waiting_deposit",
            Self::PendingSend => "waiting_send",
            Self::PendingConfirm => "waiting_confirm",
            Self::Done => "done",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ────────────────────────────────────────────
// Order record
// ────────────────────────────────────────────

/// The address a user must send funds to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropAddress {
    /// Deposit address allocated by the currency connector.
    pub address: String,
    /// Currency expected at the drop address.
    pub currency: Currency,
}

impl DropAddress {
    /// Lookup key for status queries: `{currency}:{address}`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.currency, self.address)
    }
}

/// Where the payout goes once the deposit is confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    /// Payout address.
    pub address: String,
    /// Payout currency.
    pub currency: Currency,
}

/// Exchange rate applied when the payout was computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rate {
    /// Drop-currency units per destination unit.
    pub value: u64,
    /// Price source the value was read from.
    pub source: String,
}

/// Lifecycle timestamps in unix seconds; zero means not reached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Times {
    pub created_at: i64,
    pub updated_at: i64,
    pub deposited_at: i64,
    pub sent_at: i64,
    pub confirmed_at: i64,
    /// Set right before the payout is submitted; see `Order::send_in_doubt`.
    #[serde(default)]
    pub send_started_at: i64,
}

/// An exchange order as persisted in its per-order JSON record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub status: Status,
    pub drop: DropAddress,
    pub destination: Destination,
    /// Observed deposit amount in drop-currency base units.
    #[serde(default)]
    pub amount: u64,
    /// Payout amount in destination-currency base units.
    #[serde(default)]
    pub sent_amount: u64,
    #[serde(default)]
    pub rate: Option<Rate>,
    #[serde(default)]
    pub txid: Option<String>,
    #[serde(rename = "timestamps")]
    pub times: Times,
    /// Last hard error, kept until the order moves on or an operator retries.
    #[serde(default)]
    pub last_error: Option<String>,
}

impl Order {
    /// Create a fresh order waiting for its deposit.
    pub fn new(drop: DropAddress, destination: Destination) -> Self {
        let now = now_unix();
        Self {
            id: Self::make_id(&destination.address, drop.currency, &drop.address),
            status: Status::PendingDeposit,
            drop,
            destination,
            amount: 0,
            sent_amount: 0,
            rate: None,
            txid: None,
            times: Times {
                created_at: now,
                updated_at: now,
                ..Times::default()
            },
            last_error: None,
        }
    }

    /// Build the stable identifier for an order.
    pub fn make_id(destination: &str, drop_currency: Currency, drop_address: &str) -> OrderId {
        format!("{destination}:{drop_currency}:{drop_address}")
    }

    /// Split an identifier back into its three parts.
    ///
    /// Returns `None` unless the id has exactly three non-empty parts and a
    /// known currency in the middle.
    pub fn parse_id(id: &str) -> Option<(&str, Currency, &str)> {
        let mut parts = id.splitn(3, ':');
        let destination = parts.next().filter(|p| !p.is_empty())?;
        let currency = parts.next()?.parse().ok()?;
        let drop = parts.next().filter(|p| !p.is_empty() && !p.contains(':'))?;
        Some((destination, currency, drop))
    }

    /// Whether the deposit window has closed.
    pub const fn is_expired(&self, now: i64, expiration_secs: i64) -> bool {
        expiration_secs > 0 && now - self.times.created_at > expiration_secs
    }

    /// A payout was started but its outcome never made it to disk.
    pub const fn send_in_doubt(&self) -> bool {
        self.times.send_started_at != 0 && self.txid.is_none()
    }
}

/// Orders grouped by destination address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub address: String,
    pub orders: Vec<OrderId>,
}
