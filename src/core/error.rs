//! Error handling - One hierarchy for the whole quoting core

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// aleph-grid error hierarchy
#[derive(Debug, Error)]
pub enum Error {
    /// Symbol absent from venue metadata
    #[error("Instrument not found: {0}")]
    NotFound(String),

    /// Notional target cannot be expressed in whole lots
    #[error("Sizing error: {0}")]
    Sizing(String),

    /// No usable candle history to derive spacing from
    #[error("No candle data: {0}")]
    NoCandleData(String),

    /// Transport or venue-reported failure
    #[error("Venue error: {0}")]
    Venue(String),

    /// Venue row failed typed validation
    #[error("Parse error: {symbol}.{field}: {reason}")]
    Parse {
        symbol: String,
        field: &'static str,
        reason: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid state
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl Error {
    pub fn parse(symbol: impl Into<String>, field: &'static str, reason: impl Into<String>) -> Self {
        Self::Parse {
            symbol: symbol.into(),
            field,
            reason: reason.into(),
        }
    }
}
