//! Core module - Common types, traits, and error handling

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::{Config, GridConfig};
pub use error::{Error, Result};
pub use traits::*;
pub use types::*;
