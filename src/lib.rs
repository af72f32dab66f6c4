//! Aleph Grid - Core Library
//! Volatility-spaced grid market maker

// Public modules
pub mod core;
pub mod engine;
pub mod exchanges;
pub mod execution;
pub mod feeds;
pub mod risk;
pub mod strategies;

#[cfg(test)]
mod testing;

// Re-exports
pub use core::{Config, Error, Result};
pub use engine::{EngineHandle, EngineState, GridEngine};
