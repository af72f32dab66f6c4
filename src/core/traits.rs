//! Core traits - The venue seam the quoting core talks through

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::core::{Result, types::*};

/// Trading venue collaborator.
///
/// Transport, authentication and encoding live behind this trait; the core only
/// sees typed rows. Any `Err` is treated as a venue-call failure.
#[async_trait]
pub trait Venue: Send + Sync {
    /// Venue name for logging
    fn name(&self) -> &str;

    // ─────────────────────────────────────────────────────────────
    // Market Data
    // ─────────────────────────────────────────────────────────────

    /// Push stream of top-of-book updates for `symbol`
    async fn subscribe_quotes(&self, symbol: &Symbol) -> Result<flume::Receiver<QuoteEvent>>;

    /// Push stream of own fills on `symbol`
    async fn subscribe_fills(&self, symbol: &Symbol) -> Result<flume::Receiver<FillEvent>>;

    /// One page of instrument metadata, `count` rows starting at offset `start`
    async fn fetch_instrument_page(&self, start: usize, count: usize) -> Result<Vec<RawInstrument>>;

    /// Current mark price of a (reference) symbol
    async fn fetch_mark_price(&self, symbol: &Symbol) -> Result<Decimal>;

    /// Most recent batch of candles; entries may be `None`
    async fn fetch_candles(&self, symbol: &Symbol, granularity: Granularity) -> Result<Vec<Option<Candle>>>;

    // ─────────────────────────────────────────────────────────────
    // Trading
    // ─────────────────────────────────────────────────────────────

    /// All open positions; a missing symbol means flat
    async fn fetch_positions(&self) -> Result<Vec<PositionEntry>>;

    /// Cancel every resting order on `symbol`
    async fn cancel_all_orders(&self, symbol: &Symbol) -> Result<()>;

    /// Place one limit order
    async fn create_limit_order(
        &self,
        symbol: &Symbol,
        side: Side,
        size: Decimal,
        price: Decimal,
    ) -> Result<OrderAck>;
}
