//! Market data feeds - Push streams and the quote cache they maintain

pub mod market_data;
pub mod quote_cache;

pub use market_data::MarketDataFeed;
pub use quote_cache::QuoteCache;
