//! Configuration - Type-safe, validated config
//!
//! Loaded once at startup from a TOML file and shared read-only afterwards.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::{Error, RawInstrument, Result, Symbol};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Application settings
    #[serde(default)]
    pub app: AppConfig,

    /// Venue and instrument selection
    #[serde(default)]
    pub venue: VenueConfig,

    /// Grid quoting parameters
    #[serde(default)]
    pub grid: GridConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Log filter used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueConfig {
    /// Venue name (only "paper" is built in)
    #[serde(default = "default_venue_name")]
    pub name: String,

    /// Symbol to quote
    #[serde(default = "default_symbol")]
    pub symbol: Symbol,

    /// Reference asset whose mark converts satoshi-settled notionals
    #[serde(default = "default_reference_symbol")]
    pub reference_symbol: Symbol,

    /// Rows per instrument metadata request
    #[serde(default = "default_page_size")]
    pub instrument_page_size: usize,

    /// Paper venue: instrument rows served as metadata
    #[serde(default)]
    pub instruments: Vec<RawInstrument>,

    /// Paper venue: JSON dump of instrument rows, appended to `instruments`
    #[serde(default)]
    pub instruments_file: Option<PathBuf>,
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            name: default_venue_name(),
            symbol: default_symbol(),
            reference_symbol: default_reference_symbol(),
            instrument_page_size: default_page_size(),
            instruments: vec![],
            instruments_file: None,
        }
    }
}

/// Grid parameters. Sizes and limits are multiples of the standard size
/// derived from `base_notional`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// Rungs per side
    #[serde(default = "default_rung_count")]
    pub rung_count: usize,

    /// Order size per rung, in standard sizes
    #[serde(default = "default_size_multiple")]
    pub size_multiple: Decimal,

    /// Net position beyond which one side stops quoting, in standard sizes
    #[serde(default = "default_limit_multiple")]
    pub limit_multiple: Decimal,

    /// Multiple of the volatility increment between rungs
    #[serde(default = "default_spacing_multiplier")]
    pub spacing_multiplier: Decimal,

    /// Seconds between cycle starts
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Quote-currency value of one standard size (rounded down to whole lots)
    #[serde(default = "default_base_notional")]
    pub base_notional: Decimal,

    /// Seconds between polls while waiting for a first quote
    #[serde(default = "default_quote_poll_secs")]
    pub quote_poll_secs: u64,

    /// Pause between consecutive order submissions / metadata pages
    #[serde(default = "default_rate_limit_delay_ms")]
    pub rate_limit_delay_ms: u64,

    /// Pause between failed cancel-all attempts
    #[serde(default = "default_cancel_backoff_ms")]
    pub cancel_backoff_ms: u64,

    /// Give up cancelling after this many attempts (unset = retry forever)
    #[serde(default)]
    pub cancel_retry_limit: Option<u32>,
}

fn default_log_level() -> String {
    "info,aleph_grid=debug".to_string()
}
fn default_venue_name() -> String {
    "paper".to_string()
}
fn default_symbol() -> Symbol {
    Symbol::new("XBTUSD")
}
fn default_reference_symbol() -> Symbol {
    Symbol::new("XBT")
}
fn default_page_size() -> usize {
    500
}
fn default_rung_count() -> usize {
    5
}
fn default_size_multiple() -> Decimal {
    Decimal::ONE
}
fn default_limit_multiple() -> Decimal {
    Decimal::from(3)
}
fn default_spacing_multiplier() -> Decimal {
    Decimal::ONE
}
fn default_interval_secs() -> u64 {
    60
}
fn default_base_notional() -> Decimal {
    Decimal::from(120)
}
fn default_quote_poll_secs() -> u64 {
    2
}
fn default_rate_limit_delay_ms() -> u64 {
    100
}
fn default_cancel_backoff_ms() -> u64 {
    1000
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            rung_count: default_rung_count(),
            size_multiple: default_size_multiple(),
            limit_multiple: default_limit_multiple(),
            spacing_multiplier: default_spacing_multiplier(),
            interval_secs: default_interval_secs(),
            base_notional: default_base_notional(),
            quote_poll_secs: default_quote_poll_secs(),
            rate_limit_delay_ms: default_rate_limit_delay_ms(),
            cancel_backoff_ms: default_cancel_backoff_ms(),
            cancel_retry_limit: None,
        }
    }
}

impl GridConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn quote_poll(&self) -> Duration {
        Duration::from_secs(self.quote_poll_secs)
    }

    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_millis(self.rate_limit_delay_ms)
    }

    pub fn cancel_backoff(&self) -> Duration {
        Duration::from_millis(self.cancel_backoff_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rung_count == 0 {
            return Err(Error::Config("grid.rung_count must be at least 1".into()));
        }
        for (name, value) in [
            ("size_multiple", self.size_multiple),
            ("limit_multiple", self.limit_multiple),
            ("spacing_multiplier", self.spacing_multiplier),
            ("base_notional", self.base_notional),
        ] {
            if value <= Decimal::ZERO {
                return Err(Error::Config(format!("grid.{name} must be positive, got {value}")));
            }
        }
        if self.interval_secs == 0 {
            return Err(Error::Config("grid.interval_secs must be positive".into()));
        }
        if self.quote_poll_secs == 0 {
            return Err(Error::Config("grid.quote_poll_secs must be positive".into()));
        }
        if self.cancel_retry_limit == Some(0) {
            return Err(Error::Config("grid.cancel_retry_limit must be at least 1 when set".into()));
        }
        Ok(())
    }
}

impl Config {
    /// Load from TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.venue.instrument_page_size == 0 {
            return Err(Error::Config("venue.instrument_page_size must be positive".into()));
        }
        self.grid.validate()
    }

    /// Configured instrument rows plus the optional JSON dump
    pub fn paper_instruments(&self) -> Result<Vec<RawInstrument>> {
        let mut rows = self.venue.instruments.clone();
        if let Some(path) = &self.venue.instruments_file {
            let content = std::fs::read_to_string(path).map_err(|e| {
                Error::Config(format!("Failed to read {}: {}", path.display(), e))
            })?;
            let dumped: Vec<RawInstrument> = serde_json::from_str(&content)?;
            rows.extend(dumped);
        }
        Ok(rows)
    }
}
