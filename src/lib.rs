// Library crate - exports the zone pipeline and signal engine

pub mod bars;
pub mod data;
pub mod indicators;
pub mod session;
pub mod state;
pub mod zones;
pub mod signal;

// Re-export commonly used types
pub use bars::{Bar, Timeframe};
pub use indicators::IndicatorBar;
pub use zones::{Band, Confidence, Zone, ZoneKind, ZoneStatus};
pub use signal::{OptionSide, TradeSignal};
