//! Paper venue - In-memory matching against published quotes

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::*;
use crate::strategies::grid::round_to;

/// Bars kept per symbol, matching a typical venue candle page
const MAX_CANDLES: usize = 1000;

#[derive(Debug, Clone)]
struct RestingOrder {
    id: Uuid,
    symbol: Symbol,
    side: Side,
    size: Decimal,
    price: Decimal,
}

#[derive(Debug, Clone, Copy)]
struct Bar {
    minute: i64,
    high: Decimal,
    low: Decimal,
}

#[derive(Default)]
struct PaperState {
    instruments: Vec<RawInstrument>,
    resting: Vec<RestingOrder>,
    positions: HashMap<Symbol, i64>,
    mids: HashMap<Symbol, Decimal>,
    bars: HashMap<Symbol, VecDeque<Bar>>,
    quote_subs: Vec<(Symbol, flume::Sender<QuoteEvent>)>,
    fill_subs: Vec<(Symbol, flume::Sender<FillEvent>)>,
}

/// Simulated venue: serves configured instrument rows, rests limit orders and
/// fills them when a published quote trades through their price.
pub struct PaperVenue {
    name: String,
    state: Mutex<PaperState>,
}

impl PaperVenue {
    pub fn new(name: impl Into<String>, instruments: Vec<RawInstrument>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(PaperState {
                instruments,
                ..Default::default()
            }),
        }
    }

    /// Feed one top-of-book update: record the bar, cross resting orders,
    /// then fan the quote out to subscribers.
    pub fn publish_quote(&self, symbol: &Symbol, bid: Decimal, ask: Decimal, timestamp: DateTime<Utc>) {
        let mut state = self.state.lock();

        state.mids.insert(symbol.clone(), (bid + ask) / Decimal::TWO);
        record_bar(state.bars.entry(symbol.clone()).or_default(), timestamp, bid, ask);

        let (filled, resting): (Vec<_>, Vec<_>) = std::mem::take(&mut state.resting)
            .into_iter()
            .partition(|o| {
                o.symbol == *symbol
                    && match o.side {
                        Side::Buy => o.price >= ask,
                        Side::Sell => o.price <= bid,
                    }
            });
        state.resting = resting;

        for order in filled {
            let contracts = order.size.to_i64().unwrap_or(0);
            let position = state.positions.entry(order.symbol.clone()).or_insert(0);
            match order.side {
                Side::Buy => *position += contracts,
                Side::Sell => *position -= contracts,
            }
            debug!(id = %order.id, side = %order.side, price = %order.price, "Paper fill");
            let fill = FillEvent {
                symbol: order.symbol.clone(),
                side: order.side,
                fill_size: order.size,
                fill_price: order.price,
            };
            state
                .fill_subs
                .retain(|(s, tx)| *s != order.symbol || tx.send(fill.clone()).is_ok());
        }

        let event = QuoteEvent {
            symbol: symbol.clone(),
            bid: (bid, Decimal::ONE),
            ask: (ask, Decimal::ONE),
            timestamp,
        };
        state
            .quote_subs
            .retain(|(s, tx)| s != symbol || tx.send(event.clone()).is_ok());
    }

    pub fn resting_orders(&self, symbol: &Symbol) -> usize {
        self.state.lock().resting.iter().filter(|o| o.symbol == *symbol).count()
    }

    pub fn net_position(&self, symbol: &Symbol) -> i64 {
        self.state.lock().positions.get(symbol).copied().unwrap_or(0)
    }

    /// Publish a slow oscillation around the configured mark of `symbol`,
    /// one tick wide, every `every`.
    pub fn drive_quotes(self: Arc<Self>, symbol: Symbol, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let row = self
                .state
                .lock()
                .instruments
                .iter()
                .find(|r| r.symbol.as_deref() == Some(symbol.as_str()))
                .cloned();
            let (Some(mark), Some(tick)) = (
                row.as_ref().and_then(|r| r.mark_price),
                row.as_ref().and_then(|r| r.tick_size),
            ) else {
                warn!("Paper venue has no mark/tick for {}, not quoting", symbol);
                return;
            };

            let mut step: u64 = 0;
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let wave = Decimal::from_f64((step as f64 / 20.0).sin() * 0.003).unwrap_or_default();
                let bid = round_to(mark * (Decimal::ONE + wave), tick);
                self.publish_quote(&symbol, bid, bid + tick, Utc::now());
                step += 1;
            }
        })
    }

    /// [`drive_quotes`](Self::drive_quotes) for whichever symbol `symbols`
    /// currently holds, switching over when it changes.
    pub fn drive_followed(self: Arc<Self>, mut symbols: watch::Receiver<Symbol>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let symbol = symbols.borrow_and_update().clone();
                debug!(%symbol, "Paper quotes following");
                let driver = self.clone().drive_quotes(symbol, every);
                if symbols.changed().await.is_err() {
                    // nobody can switch any more, keep the last symbol quoted
                    let _ = driver.await;
                    return;
                }
                driver.abort();
            }
        })
    }
}

fn record_bar(bars: &mut VecDeque<Bar>, timestamp: DateTime<Utc>, bid: Decimal, ask: Decimal) {
    let minute = timestamp.timestamp().div_euclid(60);
    match bars.back_mut() {
        Some(bar) if bar.minute == minute => {
            bar.high = bar.high.max(ask);
            bar.low = bar.low.min(bid);
        }
        _ => {
            bars.push_back(Bar {
                minute,
                high: ask,
                low: bid,
            });
            if bars.len() > MAX_CANDLES {
                bars.pop_front();
            }
        }
    }
}

#[async_trait]
impl Venue for PaperVenue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn subscribe_quotes(&self, symbol: &Symbol) -> Result<flume::Receiver<QuoteEvent>> {
        let (tx, rx) = flume::unbounded();
        self.state.lock().quote_subs.push((symbol.clone(), tx));
        Ok(rx)
    }

    async fn subscribe_fills(&self, symbol: &Symbol) -> Result<flume::Receiver<FillEvent>> {
        let (tx, rx) = flume::unbounded();
        self.state.lock().fill_subs.push((symbol.clone(), tx));
        Ok(rx)
    }

    async fn fetch_instrument_page(&self, start: usize, count: usize) -> Result<Vec<RawInstrument>> {
        let state = self.state.lock();
        Ok(state.instruments.iter().skip(start).take(count).cloned().collect())
    }

    async fn fetch_mark_price(&self, symbol: &Symbol) -> Result<Decimal> {
        let state = self.state.lock();
        if let Some(mid) = state.mids.get(symbol) {
            return Ok(*mid);
        }
        state
            .instruments
            .iter()
            .find(|r| r.symbol.as_deref() == Some(symbol.as_str()))
            .and_then(|r| r.mark_price)
            .ok_or_else(|| Error::Venue(format!("no mark price for {symbol}")))
    }

    async fn fetch_candles(&self, symbol: &Symbol, granularity: Granularity) -> Result<Vec<Option<Candle>>> {
        debug!(%symbol, granularity = granularity.as_str(), "Paper candles");
        let state = self.state.lock();
        Ok(state
            .bars
            .get(symbol)
            .map(|bars| {
                bars.iter()
                    .map(|b| Some(Candle { high: b.high, low: b.low }))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn fetch_positions(&self) -> Result<Vec<PositionEntry>> {
        let state = self.state.lock();
        Ok(state
            .positions
            .iter()
            .filter(|(_, size)| **size != 0)
            .map(|(symbol, size)| PositionEntry {
                symbol: symbol.clone(),
                net_size: *size,
            })
            .collect())
    }

    async fn cancel_all_orders(&self, symbol: &Symbol) -> Result<()> {
        self.state.lock().resting.retain(|o| o.symbol != *symbol);
        Ok(())
    }

    async fn create_limit_order(
        &self,
        symbol: &Symbol,
        side: Side,
        size: Decimal,
        price: Decimal,
    ) -> Result<OrderAck> {
        if size <= Decimal::ZERO || price <= Decimal::ZERO {
            return Err(Error::Venue(format!("invalid order {side} {size} @ {price}")));
        }
        let id = Uuid::new_v4();
        self.state.lock().resting.push(RestingOrder {
            id,
            symbol: symbol.clone(),
            side,
            size,
            price,
        });
        Ok(OrderAck {
            order_id: id.to_string(),
        })
    }
}
