//! Support/resistance zone pipeline
//!
//! Per timeframe: reversal swings are clustered into bands, volume-profile,
//! VWAP, gap and prior-day fallback zones are added, zones are tagged with
//! flip/retest status and live metadata, then scored and filtered. The
//! per-timeframe lists are finally merged into one unified set.

pub mod model;
pub mod swing;
pub mod cluster;
pub mod volume_profile;
pub mod vwap;
pub mod builder;
pub mod scorer;
pub mod filter;
pub mod multi_tf;

// Re-export commonly used types
pub use model::{Band, Confidence, Zone, ZoneKind, ZoneSource, ZoneStatus, ZoneSubtype};
pub use swing::{detect_reversal_swings, SwingConfig, SwingPoint};
pub use cluster::{cluster_levels, ClusterConfig};
pub use builder::{active_zones, BuilderConfig};
pub use scorer::{score_zones, ScoreWeights};
pub use filter::{filter_and_validate_zones, FilterConfig};
pub use multi_tf::{build_zones_multi_tf, merge_timeframe_zones};
