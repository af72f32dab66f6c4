//! Execution layer - Flattening and re-quoting resting orders

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::core::{Error, GridConfig, OrderAck, OrderIntent, Result, Symbol, Venue};

/// Order synchronizer - cancels everything resting, then places the new grid
pub struct OrderSynchronizer {
    venue: Arc<dyn Venue>,
    cancel_backoff: Duration,
    cancel_retry_limit: Option<u32>,
    rate_limit_delay: Duration,
}

impl OrderSynchronizer {
    pub fn new(venue: Arc<dyn Venue>, config: &GridConfig) -> Self {
        Self {
            venue,
            cancel_backoff: config.cancel_backoff(),
            cancel_retry_limit: config.cancel_retry_limit,
            rate_limit_delay: config.rate_limit_delay(),
        }
    }

    /// Cancel every resting order on `symbol`, retrying with a fixed backoff
    /// until the venue confirms. Without a retry limit this does not return
    /// while the venue keeps failing. Returns the number of attempts made.
    pub async fn cancel_all(&self, symbol: &Symbol) -> Result<u32> {
        info!("Cancelling all orders at {} of {}", self.venue.name(), symbol);
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.venue.cancel_all_orders(symbol).await {
                Ok(()) => return Ok(attempt),
                Err(e) => {
                    warn!(attempt, error = %e, "Error cancelling orders");
                    if self.cancel_retry_limit.is_some_and(|limit| attempt >= limit) {
                        return Err(Error::Venue(format!(
                            "cancel-all on {symbol} still failing after {attempt} attempts: {e}"
                        )));
                    }
                    tokio::time::sleep(self.cancel_backoff).await;
                }
            }
        }
    }

    /// Best-effort [`cancel_all`](Self::cancel_all) for shutdown paths; failures
    /// are logged, never returned.
    pub async fn flatten(&self, symbol: &Symbol) {
        if let Err(e) = self.cancel_all(symbol).await {
            error!(%symbol, error = %e, "Flatten abandoned, orders may still be resting");
        }
    }

    /// Place `intents` one at a time, pausing between calls. The first failure
    /// aborts the remainder.
    pub async fn submit(&self, symbol: &Symbol, intents: &[OrderIntent]) -> Result<Vec<OrderAck>> {
        let mut acks = Vec::with_capacity(intents.len());
        for (n, intent) in intents.iter().enumerate() {
            if n > 0 {
                tokio::time::sleep(self.rate_limit_delay).await;
            }
            let ack = self
                .venue
                .create_limit_order(symbol, intent.side, intent.size, intent.price)
                .await?;
            debug!(
                order_id = %ack.order_id,
                side = %intent.side,
                size = %intent.size,
                price = %intent.price,
                "Order placed"
            );
            acks.push(ack);
        }
        Ok(acks)
    }
}
