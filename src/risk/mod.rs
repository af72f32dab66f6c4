//! Risk management - Net position lookup and per-side quoting limits

use rust_decimal::Decimal;
use tracing::info;

use crate::core::{Result, Side, Symbol, Venue};

/// Symmetric net-position bound, in contracts.
///
/// Not a hard stop: once net exposure reaches the bound on one side, that side
/// stops quoting while the other side keeps working the position back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionLimit {
    limit: Decimal,
}

impl PositionLimit {
    pub fn new(limit: Decimal) -> Self {
        Self { limit: limit.abs() }
    }

    /// Whether `side` may quote at signed exposure `net_position`
    pub fn allows(&self, side: Side, net_position: i64) -> bool {
        let net = Decimal::from(net_position);
        match side {
            Side::Sell => net > -self.limit,
            Side::Buy => net < self.limit,
        }
    }
}

/// Fetches net exposure fresh on every call; nothing is cached between cycles.
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionTracker;

impl PositionTracker {
    pub fn new() -> Self {
        Self
    }

    /// Signed contracts held in `symbol`; zero when the venue lists none.
    pub async fn net_position<V: Venue + ?Sized>(&self, venue: &V, symbol: &Symbol) -> Result<i64> {
        let net = venue
            .fetch_positions()
            .await?
            .into_iter()
            .find(|p| p.symbol == *symbol)
            .map(|p| p.net_size)
            .unwrap_or(0);
        info!("Position: {}", net);
        Ok(net)
    }
}
