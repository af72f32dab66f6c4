//! Exchange layer - Instrument metadata and venue implementations

pub mod instrument;
pub mod paper;

pub use instrument::{InstrumentResolver, lots_for_notional};
pub use paper::PaperVenue;
