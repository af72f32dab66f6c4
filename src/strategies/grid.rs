//! Grid planner - symmetric ladder of limit orders around the touch

use rust_decimal::{Decimal, RoundingStrategy};
use tracing::debug;

use crate::core::{Error, GridConfig, Instrument, OrderIntent, Quote, Result, Side};
use crate::risk::PositionLimit;

/// Round `value` to the nearest exact multiple of `increment`, ties to even.
pub fn round_to(value: Decimal, increment: Decimal) -> Decimal {
    if increment.is_zero() {
        return value;
    }
    (value / increment).round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven) * increment
}

/// Round a price to the instrument's tick grid
pub fn round_to_tick(price: Decimal, tick: Decimal) -> Decimal {
    round_to(price, tick)
}

/// Grid shape parameters
#[derive(Debug, Clone)]
pub struct GridPlanner {
    rung_count: usize,
    size_multiple: Decimal,
    limit_multiple: Decimal,
}

impl GridPlanner {
    pub fn new(config: &GridConfig) -> Self {
        Self {
            rung_count: config.rung_count,
            size_multiple: config.size_multiple,
            limit_multiple: config.limit_multiple,
        }
    }

    pub fn rung_count(&self) -> usize {
        self.rung_count
    }

    /// Contracts per rung, a whole number of lots
    pub fn order_size(&self, base_size: Decimal, instrument: &Instrument) -> Decimal {
        round_to(self.size_multiple * base_size, instrument.lot())
    }

    /// [`order_size`](Self::order_size), or `Sizing` when it rounds to zero lots
    pub fn checked_order_size(&self, base_size: Decimal, instrument: &Instrument) -> Result<Decimal> {
        let size = self.order_size(base_size, instrument);
        if size <= Decimal::ZERO {
            return Err(Error::Sizing(format!(
                "{} x {} rounds to zero lots of {}",
                self.size_multiple, base_size, instrument.lot_size
            )));
        }
        Ok(size)
    }

    pub fn position_limit(&self, base_size: Decimal) -> PositionLimit {
        PositionLimit::new(self.limit_multiple * base_size)
    }

    /// Tick-aligned price of rung `rung` (1-based) on `side`
    pub fn rung_price(side: Side, rung: usize, quote: &Quote, increment: Decimal, tick: Decimal) -> Decimal {
        let offset = Decimal::from(rung) * increment;
        let price = match side {
            Side::Sell => quote.ask + offset,
            Side::Buy => quote.bid - offset,
        };
        round_to_tick(price, tick)
    }

    /// Orders to rest this cycle, rung by rung, sell before buy.
    ///
    /// A side is left out entirely once `net_position` reaches the limit on
    /// that side. Spacing narrower than one tick, zero included, is widened
    /// to one tick so rungs never collapse onto the same price.
    pub fn build(
        &self,
        quote: &Quote,
        increment: Decimal,
        net_position: i64,
        instrument: &Instrument,
        base_size: Decimal,
    ) -> Result<Vec<OrderIntent>> {
        let size = self.checked_order_size(base_size, instrument)?;
        let step = increment.max(instrument.tick_size);
        let limit = self.position_limit(base_size);
        let sides: Vec<Side> = [Side::Sell, Side::Buy]
            .into_iter()
            .filter(|side| limit.allows(*side, net_position))
            .collect();

        let mut intents = Vec::with_capacity(self.rung_count * sides.len());
        for rung in 1..=self.rung_count {
            for side in &sides {
                let price = Self::rung_price(*side, rung, quote, step, instrument.tick_size);
                if price <= Decimal::ZERO {
                    debug!(rung, %price, "Skipping non-positive rung");
                    continue;
                }
                intents.push(OrderIntent {
                    side: *side,
                    price,
                    size,
                });
            }
        }
        Ok(intents)
    }
}
