//! Core types - Strong typing for safety

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Tradeable symbol as the venue spells it (e.g., "XBTUSD")
///
/// Venue symbols are case-sensitive (`XBt` vs `XBT`), so no normalisation is applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "Buy"),
            Side::Sell => write!(f, "Sell"),
        }
    }
}

/// Top of book for the tracked symbol
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    pub bid: Decimal,
    pub ask: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Market-data push event: `[price, size]` on each side
#[derive(Debug, Clone)]
pub struct QuoteEvent {
    pub symbol: Symbol,
    pub bid: (Decimal, Decimal),
    pub ask: (Decimal, Decimal),
    pub timestamp: DateTime<Utc>,
}

/// Execution push event
#[derive(Debug, Clone)]
pub struct FillEvent {
    pub symbol: Symbol,
    pub side: Side,
    pub fill_size: Decimal,
    pub fill_price: Decimal,
}

/// Settlement currency of a contract, as far as notional sizing is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// `XBt`: margined in satoshi
    Satoshi,
    /// `USDt`: margined in millionths of a USDT
    MicroUsdt,
    /// Anything else; resolvable, but cannot be sized
    Other(String),
}

impl Settlement {
    pub fn parse(code: &str) -> Self {
        match code {
            "XBt" => Self::Satoshi,
            "USDt" => Self::MicroUsdt,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Contract metadata for one symbol. Immutable once resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Instrument {
    pub symbol: Symbol,
    pub tick_size: Decimal,
    pub lot_size: u64,
    pub mark_price: Decimal,
    pub is_inverse: bool,
    pub multiplier: Decimal,
    pub settlement: Settlement,
}

impl Instrument {
    pub fn lot(&self) -> Decimal {
        Decimal::from(self.lot_size)
    }
}

/// Instrument row as the venue returns it. Every field may be missing or null;
/// [`Instrument::try_from`] decides which ones are required.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawInstrument {
    pub symbol: Option<String>,
    pub tick_size: Option<Decimal>,
    pub lot_size: Option<Decimal>,
    pub mark_price: Option<Decimal>,
    pub is_inverse: Option<bool>,
    pub multiplier: Option<Decimal>,
    #[serde(rename = "settlCurrency")]
    pub settl_currency: Option<String>,
}

/// One open position row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionEntry {
    pub symbol: Symbol,
    /// Signed contracts, positive = long
    pub net_size: i64,
}

/// One OHLC bar; only the range matters here
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub high: Decimal,
    pub low: Decimal,
}

/// Candle bucket width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    OneMinute,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::OneMinute => "1m",
        }
    }
}

/// A limit order the grid wants resting. Built fresh every cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderIntent {
    pub side: Side,
    pub price: Decimal,
    pub size: Decimal,
}

/// Venue acknowledgement of a created order
#[derive(Debug, Clone)]
pub struct OrderAck {
    pub order_id: String,
}
