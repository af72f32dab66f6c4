//! Instrument resolution and notional sizing.
//!
//! Raw venue rows are validated into [`Instrument`] at this boundary; nothing
//! downstream sees optional fields.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::time::Duration;
use tracing::{debug, info};

use crate::core::{Error, Instrument, RawInstrument, Result, Settlement, Symbol, Venue};

/// Satoshi per bitcoin
const SATOSHI_PER_XBT: u64 = 100_000_000;

impl TryFrom<RawInstrument> for Instrument {
    type Error = Error;

    fn try_from(raw: RawInstrument) -> Result<Self> {
        let symbol = raw
            .symbol
            .ok_or_else(|| Error::parse("?", "symbol", "missing"))?;

        let tick_size = raw
            .tick_size
            .ok_or_else(|| Error::parse(&symbol, "tickSize", "missing"))?;
        if tick_size <= Decimal::ZERO {
            return Err(Error::parse(&symbol, "tickSize", format!("must be positive, got {tick_size}")));
        }

        let lot = raw
            .lot_size
            .ok_or_else(|| Error::parse(&symbol, "lotSize", "missing"))?;
        let lot_size = lot
            .normalize()
            .to_u64()
            .filter(|l| *l > 0 && lot.fract().is_zero())
            .ok_or_else(|| Error::parse(&symbol, "lotSize", format!("must be a positive integer, got {lot}")))?;

        let mark_price = raw
            .mark_price
            .ok_or_else(|| Error::parse(&symbol, "markPrice", "missing"))?;
        if mark_price <= Decimal::ZERO {
            return Err(Error::parse(&symbol, "markPrice", format!("must be positive, got {mark_price}")));
        }

        let multiplier = raw
            .multiplier
            .ok_or_else(|| Error::parse(&symbol, "multiplier", "missing"))?;
        if multiplier.is_zero() {
            return Err(Error::parse(&symbol, "multiplier", "must be non-zero"));
        }

        let settlement = raw
            .settl_currency
            .as_deref()
            .map(Settlement::parse)
            .ok_or_else(|| Error::parse(&symbol, "settlCurrency", "missing"))?;

        Ok(Instrument {
            symbol: Symbol::new(symbol),
            tick_size,
            lot_size,
            mark_price,
            is_inverse: raw.is_inverse.unwrap_or(false),
            multiplier,
            settlement,
        })
    }
}

/// Looks up contract metadata on a venue.
#[derive(Debug, Clone)]
pub struct InstrumentResolver {
    page_size: usize,
    page_delay: Duration,
    reference_symbol: Symbol,
}

impl InstrumentResolver {
    pub fn new(page_size: usize, page_delay: Duration, reference_symbol: Symbol) -> Self {
        Self {
            page_size: page_size.max(1),
            page_delay,
            reference_symbol,
        }
    }

    /// Every tradeable row the venue lists. Pages are requested until one
    /// comes back short; rows without a settlement currency or mark price are
    /// not tradeable and are skipped.
    pub async fn fetch_all<V: Venue + ?Sized>(&self, venue: &V) -> Result<Vec<RawInstrument>> {
        let mut rows = vec![];
        let mut start = 0;

        loop {
            let page = venue.fetch_instrument_page(start, self.page_size).await?;
            let count = page.len();
            start += count;
            rows.extend(
                page.into_iter()
                    .filter(|r| r.settl_currency.as_deref().is_some_and(|c| !c.is_empty()))
                    .filter(|r| r.mark_price.is_some()),
            );
            debug!(instrument_count = start, "Fetched instrument page");

            if count < self.page_size {
                break;
            }
            tokio::time::sleep(self.page_delay).await;
        }

        Ok(rows)
    }

    /// Typed metadata for `symbol`, or `NotFound`
    pub async fn resolve<V: Venue + ?Sized>(&self, venue: &V, symbol: &Symbol) -> Result<Instrument> {
        info!("Getting instrument data for {} on {}", symbol, venue.name());
        let raw = self
            .fetch_all(venue)
            .await?
            .into_iter()
            .find(|r| r.symbol.as_deref() == Some(symbol.as_str()))
            .ok_or_else(|| Error::NotFound(format!("{} on {}", symbol, venue.name())))?;

        let instrument = Instrument::try_from(raw)?;
        info!(
            "Tick size: {}; Lot size: {}",
            instrument.tick_size, instrument.lot_size
        );
        Ok(instrument)
    }

    /// Contracts (a whole number of lots) worth roughly `notional`, fetching the
    /// reference mark when the contract settles in satoshi.
    pub async fn standard_size<V: Venue + ?Sized>(
        &self,
        venue: &V,
        instrument: &Instrument,
        notional: Decimal,
    ) -> Result<Decimal> {
        let reference_mark = match instrument.settlement {
            Settlement::Satoshi => Some(venue.fetch_mark_price(&self.reference_symbol).await?),
            _ => None,
        };
        lots_for_notional(instrument, notional, reference_mark)
    }
}

/// Pure sizing arithmetic behind [`InstrumentResolver::standard_size`].
///
/// One lot is worth `lot * settlement_unit * |multiplier| * price` where price
/// is inverted for inverse contracts. The result is rounded down to whole lots.
pub fn lots_for_notional(
    instrument: &Instrument,
    notional: Decimal,
    reference_mark: Option<Decimal>,
) -> Result<Decimal> {
    let price = if instrument.is_inverse {
        Decimal::ONE / instrument.mark_price
    } else {
        instrument.mark_price
    };
    let price_multiplier = instrument.multiplier.abs() * price;

    let settlement_unit = match &instrument.settlement {
        Settlement::Satoshi => {
            let mark = reference_mark.ok_or_else(|| {
                Error::Sizing(format!("{} settles in XBt but no reference mark is known", instrument.symbol))
            })?;
            if mark <= Decimal::ZERO {
                return Err(Error::Sizing(format!("reference mark {mark} is not positive")));
            }
            mark / Decimal::from(SATOSHI_PER_XBT)
        }
        Settlement::MicroUsdt => Decimal::new(1, 6),
        Settlement::Other(code) => {
            return Err(Error::Sizing(format!(
                "{} settles in unsupported currency {code}",
                instrument.symbol
            )));
        }
    };

    let minimum = instrument.lot() * settlement_unit * price_multiplier;
    if minimum <= Decimal::ZERO {
        return Err(Error::Sizing(format!("{} has no positive lot value", instrument.symbol)));
    }
    if notional <= minimum {
        return Err(Error::Sizing(format!(
            "notional {notional} does not exceed one lot of {} (~{})",
            instrument.symbol,
            minimum.round_dp(4)
        )));
    }

    let multiple = (notional / minimum).floor();
    Ok(multiple * instrument.lot())
}
