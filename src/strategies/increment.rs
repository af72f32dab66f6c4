//! Rung spacing from recent 1-minute price range.
//!
//! A quarter of the high-low range over the batch stands in for one standard
//! deviation of price over the window.

use rust_decimal::Decimal;
use tracing::debug;

use crate::core::{Candle, Error, Granularity, Result, Symbol, Venue};

#[derive(Debug, Clone, Copy)]
pub struct IncrementEstimator {
    multiplier: Decimal,
}

impl IncrementEstimator {
    pub fn new(multiplier: Decimal) -> Self {
        Self { multiplier }
    }

    /// Fetch the latest candle batch for `symbol` and derive spacing from it.
    /// Venue failures propagate; an unusable batch is `NoCandleData`.
    pub async fn estimate<V: Venue + ?Sized>(&self, venue: &V, symbol: &Symbol) -> Result<Decimal> {
        let candles = venue.fetch_candles(symbol, Granularity::OneMinute).await?;
        let increment = increment_from_candles(&candles, self.multiplier)?;
        debug!(%symbol, candles = candles.len(), %increment, "Estimated increment");
        Ok(increment)
    }
}

/// `multiplier * (max high - min low) / 4` over the non-empty candles.
/// Only a batch with nothing usable is an error.
pub fn increment_from_candles(candles: &[Option<Candle>], multiplier: Decimal) -> Result<Decimal> {
    let mut usable = candles.iter().flatten();
    let first = usable
        .next()
        .ok_or_else(|| Error::NoCandleData(format!("{} candles, none usable", candles.len())))?;

    let (high, low) = usable.fold((first.high, first.low), |(high, low), c| {
        (high.max(c.high), low.min(c.low))
    });

    // a flat range gives zero; the planner floors spacing at one tick
    let range = (high - low).max(Decimal::ZERO);
    Ok(multiplier * range / Decimal::from(4))
}
