//! Domain types for AllocLab

pub mod bar;
pub mod order;
pub mod point;
pub mod signal;
pub mod trade;

pub use bar::{DailyBar, PriceLookup};
pub use order::{Order, OrderSide};
pub use point::TimeseriesPoint;
pub use signal::{Signal, SignalSet};
pub use trade::Trade;

/// Symbol type alias
pub type Symbol = String;
