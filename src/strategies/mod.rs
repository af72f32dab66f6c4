//! Quoting strategy - Grid shape and rung spacing

pub mod grid;
pub mod increment;

pub use grid::{GridPlanner, round_to, round_to_tick};
pub use increment::{IncrementEstimator, increment_from_candles};
