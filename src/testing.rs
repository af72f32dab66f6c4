//! Scripted venue for unit tests: canned responses, recorded calls.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use tokio::time::Instant;

use crate::core::*;

#[derive(Default)]
struct Script {
    calls: Vec<(&'static str, Instant)>,
    instruments: Vec<RawInstrument>,
    marks: HashMap<String, Decimal>,
    positions: Vec<PositionEntry>,
    candles: Vec<Option<Candle>>,
    /// Queued cancel outcomes; `false` = venue reports an error. Empty = success.
    cancel_outcomes: VecDeque<bool>,
    /// Position queries report a venue error
    positions_fail: bool,
    /// Fail the n-th (0-based) order submission
    failing_order: Option<usize>,
    orders: Vec<(Symbol, Side, Decimal, Decimal)>,
    quote_subscribers: Vec<flume::Sender<QuoteEvent>>,
    fill_subscribers: Vec<flume::Sender<FillEvent>>,
}

pub(crate) struct ScriptedVenue {
    script: Mutex<Script>,
}

impl ScriptedVenue {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(Script::default()),
        }
    }

    fn record(&self, call: &'static str) {
        self.script.lock().calls.push((call, Instant::now()));
    }

    pub fn set_instruments(&self, rows: Vec<RawInstrument>) {
        self.script.lock().instruments = rows;
    }

    pub fn set_mark(&self, symbol: &str, mark: Decimal) {
        self.script.lock().marks.insert(symbol.to_string(), mark);
    }

    pub fn set_positions(&self, positions: Vec<PositionEntry>) {
        self.script.lock().positions = positions;
    }

    pub fn fail_positions(&self) {
        self.script.lock().positions_fail = true;
    }

    pub fn set_candles(&self, candles: Vec<Option<Candle>>) {
        self.script.lock().candles = candles;
    }

    pub fn script_cancels(&self, outcomes: &[bool]) {
        self.script.lock().cancel_outcomes = outcomes.iter().copied().collect();
    }

    pub fn fail_order(&self, index: usize) {
        self.script.lock().failing_order = Some(index);
    }

    pub fn push_quote(&self, symbol: &str, bid: Decimal, ask: Decimal) {
        let event = QuoteEvent {
            symbol: Symbol::new(symbol),
            bid: (bid, Decimal::ONE),
            ask: (ask, Decimal::ONE),
            timestamp: Utc::now(),
        };
        self.script
            .lock()
            .quote_subscribers
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.script.lock().calls.iter().map(|(c, _)| *c).collect()
    }

    pub fn calls_to(&self, call: &str) -> usize {
        self.script.lock().calls.iter().filter(|(c, _)| *c == call).count()
    }

    pub fn call_times(&self, call: &str) -> Vec<Instant> {
        self.script
            .lock()
            .calls
            .iter()
            .filter(|(c, _)| *c == call)
            .map(|(_, t)| *t)
            .collect()
    }

    pub fn orders(&self) -> Vec<(Symbol, Side, Decimal, Decimal)> {
        self.script.lock().orders.clone()
    }
}

/// XBTUSD-like inverse contract row
pub(crate) fn xbtusd_row() -> RawInstrument {
    RawInstrument {
        symbol: Some("XBTUSD".to_string()),
        tick_size: Some(Decimal::new(5, 1)),
        lot_size: Some(Decimal::from(100)),
        mark_price: Some(Decimal::from(60000)),
        is_inverse: Some(true),
        multiplier: Some(Decimal::from(-100_000_000)),
        settl_currency: Some("XBt".to_string()),
    }
}

#[async_trait]
impl Venue for ScriptedVenue {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn subscribe_quotes(&self, _symbol: &Symbol) -> Result<flume::Receiver<QuoteEvent>> {
        self.record("subscribe_quotes");
        let (tx, rx) = flume::unbounded();
        self.script.lock().quote_subscribers.push(tx);
        Ok(rx)
    }

    async fn subscribe_fills(&self, _symbol: &Symbol) -> Result<flume::Receiver<FillEvent>> {
        self.record("subscribe_fills");
        let (tx, rx) = flume::unbounded();
        self.script.lock().fill_subscribers.push(tx);
        Ok(rx)
    }

    async fn fetch_instrument_page(&self, start: usize, count: usize) -> Result<Vec<RawInstrument>> {
        self.record("fetch_instrument_page");
        let script = self.script.lock();
        Ok(script
            .instruments
            .iter()
            .skip(start)
            .take(count)
            .cloned()
            .collect())
    }

    async fn fetch_mark_price(&self, symbol: &Symbol) -> Result<Decimal> {
        self.record("fetch_mark_price");
        self.script
            .lock()
            .marks
            .get(symbol.as_str())
            .copied()
            .ok_or_else(|| Error::Venue(format!("no mark for {symbol}")))
    }

    async fn fetch_candles(&self, _symbol: &Symbol, _granularity: Granularity) -> Result<Vec<Option<Candle>>> {
        self.record("fetch_candles");
        Ok(self.script.lock().candles.clone())
    }

    async fn fetch_positions(&self) -> Result<Vec<PositionEntry>> {
        self.record("fetch_positions");
        let script = self.script.lock();
        if script.positions_fail {
            return Err(Error::Venue("positions unavailable".into()));
        }
        Ok(script.positions.clone())
    }

    async fn cancel_all_orders(&self, _symbol: &Symbol) -> Result<()> {
        self.record("cancel_all_orders");
        match self.script.lock().cancel_outcomes.pop_front() {
            Some(false) => Err(Error::Venue("cancel timed out".into())),
            _ => Ok(()),
        }
    }

    async fn create_limit_order(
        &self,
        symbol: &Symbol,
        side: Side,
        size: Decimal,
        price: Decimal,
    ) -> Result<OrderAck> {
        self.record("create_limit_order");
        let mut script = self.script.lock();
        let index = script.orders.len();
        if script.failing_order == Some(index) {
            script.failing_order = None;
            return Err(Error::Venue("order rejected".into()));
        }
        script.orders.push((symbol.clone(), side, size, price));
        Ok(OrderAck {
            order_id: format!("scripted-{index}"),
        })
    }
}
