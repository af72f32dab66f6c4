//! Latest top-of-book for the tracked symbol.
//!
//! Written by the market-data pump, read by the engine once per cycle. The whole
//! quote is swapped under one lock so a reader never sees a half-updated pair.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use tracing::debug;

use crate::core::{Quote, QuoteEvent, Symbol};

struct CacheState {
    symbol: Symbol,
    quote: Option<Quote>,
}

pub struct QuoteCache {
    state: RwLock<CacheState>,
}

impl QuoteCache {
    pub fn new(symbol: Symbol) -> Self {
        Self {
            state: RwLock::new(CacheState {
                symbol,
                quote: None,
            }),
        }
    }

    /// Replace bid/ask if `symbol` is the tracked one. Returns whether the
    /// update was applied; crossed books are dropped.
    pub fn update(&self, symbol: &Symbol, bid: Decimal, ask: Decimal, timestamp: DateTime<Utc>) -> bool {
        let mut state = self.state.write();
        if state.symbol != *symbol {
            return false;
        }
        if bid > ask {
            debug!(%symbol, %bid, %ask, "Dropping crossed quote");
            return false;
        }
        state.quote = Some(Quote { bid, ask, timestamp });
        true
    }

    pub fn apply(&self, event: &QuoteEvent) -> bool {
        self.update(&event.symbol, event.bid.0, event.ask.0, event.timestamp)
    }

    /// Latest quote, `None` until the first one arrives
    pub fn snapshot(&self) -> Option<Quote> {
        self.state.read().quote
    }

    pub fn is_quoted(&self) -> bool {
        self.state.read().quote.is_some()
    }

    pub fn symbol(&self) -> Symbol {
        self.state.read().symbol.clone()
    }

    /// Track a different symbol. The old quote is discarded.
    pub fn retarget(&self, symbol: Symbol) {
        let mut state = self.state.write();
        state.symbol = symbol;
        state.quote = None;
    }
}
