//! Market-data and signal provider seams.

pub mod provider;

pub use provider::{InMemoryPrices, InMemorySignals, PriceSource, SignalSource};
