//! Market-data pump: venue push streams into the quote cache and the log

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::core::{Result, Symbol, Venue};
use crate::feeds::QuoteCache;

/// Owns the background tasks draining the quote and fill streams of one symbol.
pub struct MarketDataFeed {
    cache: Arc<QuoteCache>,
    tasks: Vec<JoinHandle<()>>,
}

impl MarketDataFeed {
    pub fn new(cache: Arc<QuoteCache>) -> Self {
        Self { cache, tasks: vec![] }
    }

    /// Subscribe to `symbol`, replacing any previous subscription.
    pub async fn follow<V: Venue + ?Sized>(&mut self, venue: &V, symbol: &Symbol) -> Result<()> {
        self.stop();

        let quotes = venue.subscribe_quotes(symbol).await?;
        let fills = venue.subscribe_fills(symbol).await?;

        let cache = self.cache.clone();
        let quote_symbol = symbol.clone();
        self.tasks.push(tokio::spawn(async move {
            while let Ok(event) = quotes.recv_async().await {
                cache.apply(&event);
            }
            debug!(symbol = %quote_symbol, "Quote stream closed");
        }));

        let fill_symbol = symbol.clone();
        self.tasks.push(tokio::spawn(async move {
            while let Ok(fill) = fills.recv_async().await {
                if fill.symbol == fill_symbol {
                    info!("{} of {} {} at {}", fill.side, fill.fill_size, fill.symbol, fill.fill_price);
                }
            }
            debug!(symbol = %fill_symbol, "Fill stream closed");
        }));

        info!("📡 Subscribed to {} market data on {}", symbol, venue.name());
        Ok(())
    }

    pub fn stop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for MarketDataFeed {
    fn drop(&mut self) {
        self.stop();
    }
}
