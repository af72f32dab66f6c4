//! Grid engine - the fixed-cadence quoting loop.
//!
//! ```text
//! Idle ──resolve──▶ AwaitingFirstQuote ──first quote──▶ Running ──error/shutdown──▶ Terminated
//! ```
//!
//! Every cycle cancels what is resting, re-reads position and volatility, and
//! lays a fresh grid. Cycles start `interval` apart measured start-to-start; an
//! overrunning cycle is followed immediately by the next one. Any cycle error
//! flattens the book and stops the loop for good: restarting is left to
//! whatever supervises the process.

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::core::{Config, Error, GridConfig, Instrument, Result, Symbol, Venue};
use crate::execution::OrderSynchronizer;
use crate::exchanges::InstrumentResolver;
use crate::feeds::{MarketDataFeed, QuoteCache};
use crate::risk::PositionTracker;
use crate::strategies::{GridPlanner, IncrementEstimator, round_to_tick};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    AwaitingFirstQuote,
    Running,
    Terminated,
}

/// Wait before the next cycle: what is left of `interval` after `elapsed`,
/// never negative.
pub fn next_delay(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Shutdown,
}

/// Metadata of the symbol being quoted
#[derive(Debug, Clone)]
struct Active {
    instrument: Instrument,
    base_size: Decimal,
}

/// Control side of a running engine
#[derive(Debug, Clone)]
pub struct EngineHandle {
    symbol: watch::Sender<Symbol>,
    shutdown: watch::Sender<bool>,
}

impl EngineHandle {
    /// Quote `symbol` from the next cycle on
    pub fn switch_symbol(&self, symbol: Symbol) {
        self.symbol.send_replace(symbol);
    }

    /// Follow the symbol the engine is asked to quote
    pub fn watch_symbol(&self) -> watch::Receiver<Symbol> {
        self.symbol.subscribe()
    }

    /// Interrupt the current wait, flatten and stop
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}

pub struct GridEngine {
    venue: Arc<dyn Venue>,
    config: GridConfig,
    quotes: Arc<QuoteCache>,
    feed: MarketDataFeed,
    resolver: InstrumentResolver,
    estimator: IncrementEstimator,
    planner: GridPlanner,
    tracker: PositionTracker,
    synchronizer: OrderSynchronizer,
    target: watch::Receiver<Symbol>,
    shutdown: watch::Receiver<bool>,
    state: EngineState,
    symbol: Symbol,
    active: Option<Active>,
    cycles: u64,
}

impl GridEngine {
    pub fn new(venue: Arc<dyn Venue>, config: &Config) -> (Self, EngineHandle) {
        let grid = config.grid.clone();
        let symbol = config.venue.symbol.clone();
        let quotes = Arc::new(QuoteCache::new(symbol.clone()));
        let (symbol_tx, target) = watch::channel(symbol.clone());
        let (shutdown_tx, shutdown) = watch::channel(false);

        let engine = Self {
            feed: MarketDataFeed::new(quotes.clone()),
            resolver: InstrumentResolver::new(
                config.venue.instrument_page_size,
                grid.rate_limit_delay(),
                config.venue.reference_symbol.clone(),
            ),
            estimator: IncrementEstimator::new(grid.spacing_multiplier),
            planner: GridPlanner::new(&grid),
            tracker: PositionTracker::new(),
            synchronizer: OrderSynchronizer::new(venue.clone(), &grid),
            venue,
            config: grid,
            quotes,
            target,
            shutdown,
            state: EngineState::Idle,
            symbol,
            active: None,
            cycles: 0,
        };
        let handle = EngineHandle {
            symbol: symbol_tx,
            shutdown: shutdown_tx,
        };
        (engine, handle)
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn quotes(&self) -> Arc<QuoteCache> {
        self.quotes.clone()
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Completed cycles
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Drive the engine until shutdown (`Ok`) or the first failure (`Err`).
    pub async fn run(&mut self) -> Result<()> {
        if self.state != EngineState::Idle {
            return Err(Error::InvalidState(format!("engine already {:?}", self.state)));
        }

        let symbol = self.target.borrow_and_update().clone();
        if let Err(e) = self.activate(symbol).await {
            error!(error = %e, "No usable instrument data - ending");
            self.state = EngineState::Terminated;
            return Err(e);
        }
        info!("Completed {} specific setup", self.venue.name());

        self.state = EngineState::AwaitingFirstQuote;
        if self.await_first_quote().await == Flow::Shutdown {
            return self.terminate().await;
        }

        info!("Starting to repeat every {}s", self.config.interval_secs);
        self.state = EngineState::Running;
        loop {
            let started = Instant::now();
            match self.run_cycle().await {
                Ok(Flow::Continue) => self.cycles += 1,
                Ok(Flow::Shutdown) => return self.terminate().await,
                Err(e) => {
                    warn!("Cycle failed: cancelling all orders");
                    self.synchronizer.flatten(&self.symbol).await;
                    error!(error = %e, cycles = self.cycles, "Grid halted");
                    self.feed.stop();
                    self.state = EngineState::Terminated;
                    return Err(e);
                }
            }

            let delay = next_delay(self.config.interval(), started.elapsed());
            if delay.is_zero() {
                warn!(elapsed = ?started.elapsed(), "Cycle overran interval, next starts now");
            }
            if self.wait(delay).await == Flow::Shutdown {
                return self.terminate().await;
            }
        }
    }

    async fn run_cycle(&mut self) -> Result<Flow> {
        self.synchronizer.cancel_all(&self.symbol).await?;

        if self.check_symbol_change().await? == Flow::Shutdown {
            return Ok(Flow::Shutdown);
        }
        let Active { instrument, base_size } = self
            .active
            .clone()
            .ok_or_else(|| Error::InvalidState("no active instrument".into()))?;

        let net = self.tracker.net_position(self.venue.as_ref(), &self.symbol).await?;
        let increment = self.estimator.estimate(self.venue.as_ref(), &self.symbol).await?;
        let quote = self
            .quotes
            .snapshot()
            .ok_or_else(|| Error::InvalidState(format!("no quote for {}", self.symbol)))?;

        let intents = self.planner.build(&quote, increment, net, &instrument, base_size)?;
        info!(
            "{} x {} {} each {} (net {})",
            self.planner.rung_count(),
            self.planner.order_size(base_size, &instrument),
            self.symbol,
            round_to_tick(increment, instrument.tick_size),
            net
        );

        self.synchronizer.submit(&self.symbol, &intents).await?;
        Ok(Flow::Continue)
    }

    /// Resolve and size `symbol`, then point the quote cache and market-data
    /// subscriptions at it.
    async fn activate(&mut self, symbol: Symbol) -> Result<()> {
        let instrument = self.resolver.resolve(self.venue.as_ref(), &symbol).await?;
        let base_size = self
            .resolver
            .standard_size(self.venue.as_ref(), &instrument, self.config.base_notional)
            .await?;
        let order_size = self.planner.checked_order_size(base_size, &instrument)?;
        info!(%symbol, %base_size, %order_size, "Standard size resolved");

        if self.quotes.symbol() != symbol {
            self.quotes.retarget(symbol.clone());
        }
        self.feed.follow(self.venue.as_ref(), &symbol).await?;

        self.symbol = symbol;
        self.active = Some(Active { instrument, base_size });
        Ok(())
    }

    async fn check_symbol_change(&mut self) -> Result<Flow> {
        let target = self.target.borrow_and_update().clone();
        if target == self.symbol {
            return Ok(Flow::Continue);
        }

        info!("Switching symbol {} -> {}", self.symbol, target);
        self.activate(target).await?;
        if self.await_first_quote().await == Flow::Shutdown {
            return Ok(Flow::Shutdown);
        }
        self.synchronizer.cancel_all(&self.symbol).await?;
        Ok(Flow::Continue)
    }

    async fn await_first_quote(&mut self) -> Flow {
        if self.quotes.is_quoted() {
            return Flow::Continue;
        }
        info!("Waiting {}s at a time for first {} quote", self.config.quote_poll_secs, self.symbol);
        loop {
            if self.wait(self.config.quote_poll()).await == Flow::Shutdown {
                return Flow::Shutdown;
            }
            if self.quotes.is_quoted() {
                return Flow::Continue;
            }
        }
    }

    /// Sleep for `delay` unless shutdown is requested first.
    async fn wait(&mut self, delay: Duration) -> Flow {
        let deadline = Instant::now() + delay;
        loop {
            if *self.shutdown.borrow_and_update() {
                return Flow::Shutdown;
            }
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return Flow::Continue,
                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        // handle dropped, shutdown can no longer be requested
                        tokio::time::sleep_until(deadline).await;
                        return Flow::Continue;
                    }
                }
            }
        }
    }

    async fn terminate(&mut self) -> Result<()> {
        info!("Shutdown requested: cancelling all orders");
        self.synchronizer.flatten(&self.symbol).await;
        self.feed.stop();
        self.state = EngineState::Terminated;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Candle, PositionEntry, RawInstrument, Side};
    use crate::testing::{ScriptedVenue, xbtusd_row};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn config(rungs: usize) -> Config {
        let mut config = Config::default();
        config.grid.rung_count = rungs;
        config
    }

    fn venue() -> Arc<ScriptedVenue> {
        let venue = Arc::new(ScriptedVenue::new());
        venue.set_instruments(vec![xbtusd_row()]);
        venue.set_mark("XBT", dec!(60000));
        venue.set_candles(vec![
            Some(Candle { high: dec!(60100), low: dec!(60020) }),
            None,
            Some(Candle { high: dec!(60080), low: dec!(60000) }),
        ]);
        venue
    }

    fn seed_quote(engine: &GridEngine) {
        engine
            .quotes()
            .update(&Symbol::new("XBTUSD"), dec!(60050), dec!(60050.5), Utc::now());
    }

    #[test]
    fn test_overrun_clamps_to_zero() {
        let interval = Duration::from_secs(60);
        assert_eq!(next_delay(interval, Duration::from_secs(65)), Duration::ZERO);
        assert_eq!(next_delay(interval, Duration::from_secs(60)), Duration::ZERO);
        assert_eq!(next_delay(interval, Duration::from_secs(12)), Duration::from_secs(48));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycles_on_cadence_until_shutdown() {
        let venue = venue();
        let (mut engine, handle) = GridEngine::new(venue.clone(), &config(2));
        seed_quote(&engine);

        let task = tokio::spawn(async move {
            let result = engine.run().await;
            (engine, result)
        });
        tokio::time::sleep(Duration::from_secs(90)).await;
        handle.shutdown();
        let (engine, result) = task.await.unwrap();

        assert!(result.is_ok());
        assert_eq!(engine.state(), EngineState::Terminated);
        assert_eq!(engine.cycles(), 2);
        // two cycles plus the shutdown flatten
        assert_eq!(venue.calls_to("cancel_all_orders"), 3);
        assert_eq!(venue.calls_to("fetch_positions"), 2);

        let orders = venue.orders();
        assert_eq!(orders.len(), 8);
        // range 100 / 4 = 25 per rung
        let first_cycle: Vec<_> = orders[..4].iter().map(|(_, side, size, price)| (*side, *size, *price)).collect();
        assert_eq!(
            first_cycle,
            vec![
                (Side::Sell, dec!(100), dec!(60075.5)),
                (Side::Buy, dec!(100), dec!(60025)),
                (Side::Sell, dec!(100), dec!(60100.5)),
                (Side::Buy, dec!(100), dec!(60000)),
            ]
        );

        let starts = venue.call_times("fetch_positions");
        assert_eq!(starts[1] - starts[0], Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_candle_failure_flattens_and_halts() {
        let venue = venue();
        venue.set_candles(vec![None, None]);
        let (mut engine, _handle) = GridEngine::new(venue.clone(), &config(2));
        seed_quote(&engine);

        let result = engine.run().await;
        assert!(matches!(result, Err(Error::NoCandleData(_))));
        assert_eq!(engine.state(), EngineState::Terminated);
        assert_eq!(engine.cycles(), 0);

        let calls = venue.calls();
        let failed_at = calls.iter().position(|c| *c == "fetch_candles").unwrap();
        assert_eq!(&calls[failed_at + 1..], &["cancel_all_orders"]);

        // nothing further is ever scheduled
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(venue.calls_to("fetch_positions"), 1);
        assert_eq!(venue.calls_to("cancel_all_orders"), 2);
        assert!(venue.orders().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_position_failure_flattens_and_halts() {
        let venue = venue();
        venue.fail_positions();
        let (mut engine, _handle) = GridEngine::new(venue.clone(), &config(2));
        seed_quote(&engine);

        assert!(matches!(engine.run().await, Err(Error::Venue(_))));
        assert_eq!(engine.state(), EngineState::Terminated);

        let calls = venue.calls();
        let failed_at = calls.iter().position(|c| *c == "fetch_positions").unwrap();
        assert_eq!(&calls[failed_at + 1..], &["cancel_all_orders"]);

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(venue.calls_to("fetch_positions"), 1);
        assert_eq!(venue.calls_to("fetch_candles"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_order_flattens_and_halts() {
        let venue = venue();
        venue.fail_order(1);
        let (mut engine, _handle) = GridEngine::new(venue.clone(), &config(2));
        seed_quote(&engine);

        assert!(matches!(engine.run().await, Err(Error::Venue(_))));
        assert_eq!(engine.cycles(), 0);

        // first order placed, second rejected, the rest never sent
        assert_eq!(venue.orders().len(), 1);
        assert_eq!(venue.calls_to("create_limit_order"), 2);
        let calls = venue.calls();
        assert_eq!(calls.last(), Some(&"cancel_all_orders"));

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(venue.calls_to("cancel_all_orders"), 2);
        assert_eq!(venue.calls_to("fetch_positions"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flat_market_keeps_quoting_one_tick_apart() {
        let venue = venue();
        venue.set_candles(vec![Some(Candle { high: dec!(60050), low: dec!(60050) })]);
        let (mut engine, handle) = GridEngine::new(venue.clone(), &config(2));
        seed_quote(&engine);

        let task = tokio::spawn(async move {
            let result = engine.run().await;
            (engine, result)
        });
        tokio::time::sleep(Duration::from_secs(90)).await;
        handle.shutdown();
        let (engine, result) = task.await.unwrap();

        assert!(result.is_ok());
        assert_eq!(engine.cycles(), 2);
        let prices: Vec<_> = venue.orders()[..4].iter().map(|(_, side, _, price)| (*side, *price)).collect();
        assert_eq!(
            prices,
            vec![
                (Side::Sell, dec!(60051)),
                (Side::Buy, dec!(60049.5)),
                (Side::Sell, dec!(60051.5)),
                (Side::Buy, dec!(60049)),
            ]
        );
        assert_eq!(venue.orders().len(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_lot_order_size_never_starts() {
        let venue = venue();
        let mut config = config(2);
        // 0.4 x 100 contracts rounds to zero 100-contract lots
        config.grid.size_multiple = dec!(0.4);
        let (mut engine, _handle) = GridEngine::new(venue.clone(), &config);
        seed_quote(&engine);

        assert!(matches!(engine.run().await, Err(Error::Sizing(_))));
        assert_eq!(engine.state(), EngineState::Terminated);
        assert_eq!(venue.calls_to("subscribe_quotes"), 0);
        assert_eq!(venue.calls_to("cancel_all_orders"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_reference_mark_never_starts() {
        let venue = venue();
        venue.set_mark("XBT", Decimal::ZERO);
        let (mut engine, _handle) = GridEngine::new(venue.clone(), &config(2));

        assert!(matches!(engine.run().await, Err(Error::Sizing(_))));
        assert_eq!(engine.state(), EngineState::Terminated);
        assert_eq!(venue.calls_to("cancel_all_orders"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_symbol_never_starts() {
        let venue = venue();
        let mut config = config(2);
        config.venue.symbol = Symbol::new("DOGEUSD");
        let (mut engine, _handle) = GridEngine::new(venue.clone(), &config);

        let result = engine.run().await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert_eq!(engine.state(), EngineState::Terminated);
        assert_eq!(venue.calls_to("subscribe_quotes"), 0);
        assert_eq!(venue.calls_to("cancel_all_orders"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_degenerate_notional_never_starts() {
        let venue = venue();
        let mut config = config(2);
        config.grid.base_notional = dec!(10);
        let (mut engine, _handle) = GridEngine::new(venue.clone(), &config);

        assert!(matches!(engine.run().await, Err(Error::Sizing(_))));
        assert_eq!(venue.calls_to("fetch_positions"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_first_quote() {
        let venue = venue();
        let (mut engine, handle) = GridEngine::new(venue.clone(), &config(1));

        let task = tokio::spawn(async move {
            let result = engine.run().await;
            (engine, result)
        });
        tokio::time::sleep(Duration::from_secs(7)).await;
        assert_eq!(venue.calls_to("cancel_all_orders"), 0);

        venue.push_quote("XBTUSD", dec!(60050), dec!(60050.5));
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(venue.calls_to("fetch_positions"), 1);

        handle.shutdown();
        let (engine, result) = task.await.unwrap();
        assert!(result.is_ok());
        assert_eq!(engine.cycles(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_position_quotes_sells_only() {
        let venue = venue();
        // limit = 3 standard sizes = 300 contracts
        venue.set_positions(vec![PositionEntry { symbol: Symbol::new("XBTUSD"), net_size: 300 }]);
        let (mut engine, handle) = GridEngine::new(venue.clone(), &config(3));
        seed_quote(&engine);

        let task = tokio::spawn(async move { engine.run().await });
        tokio::time::sleep(Duration::from_secs(5)).await;
        handle.shutdown();
        task.await.unwrap().unwrap();

        let orders = venue.orders();
        assert_eq!(orders.len(), 3);
        assert!(orders.iter().all(|(_, side, _, _)| *side == Side::Sell));
    }

    #[tokio::test(start_paused = true)]
    async fn test_symbol_switch_re_resolves() {
        let venue = venue();
        venue.set_instruments(vec![
            xbtusd_row(),
            RawInstrument {
                symbol: Some("ETHUSDT".into()),
                tick_size: Some(dec!(0.05)),
                lot_size: Some(dec!(1)),
                mark_price: Some(dec!(3000)),
                is_inverse: Some(false),
                multiplier: Some(dec!(1000)),
                settl_currency: Some("USDt".into()),
            },
        ]);
        let (mut engine, handle) = GridEngine::new(venue.clone(), &config(1));
        seed_quote(&engine);

        let task = tokio::spawn(async move {
            let result = engine.run().await;
            (engine, result)
        });
        let pusher = {
            let venue = venue.clone();
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    venue.push_quote("ETHUSDT", dec!(3000), dec!(3000.05));
                }
            })
        };

        let target = handle.watch_symbol();
        tokio::time::sleep(Duration::from_secs(30)).await;
        handle.switch_symbol(Symbol::new("ETHUSDT"));
        assert!(target.has_changed().unwrap());
        tokio::time::sleep(Duration::from_secs(40)).await;
        handle.shutdown();
        let (engine, result) = task.await.unwrap();
        pusher.abort();

        assert!(result.is_ok());
        assert_eq!(engine.symbol(), &Symbol::new("ETHUSDT"));
        let eth: Vec<_> = venue
            .orders()
            .into_iter()
            .filter(|(symbol, _, _, _)| symbol.as_str() == "ETHUSDT")
            .collect();
        // $3 per lot: 120 / 3 = 40 contracts
        assert_eq!(eth.len(), 2);
        assert!(eth.iter().all(|(_, _, size, _)| *size == dec!(40)));
        assert_eq!(venue.calls_to("subscribe_quotes"), 2);
    }
}
