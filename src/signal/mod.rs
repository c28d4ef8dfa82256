//! Signal generation
//!
//! Candlestick pattern recognition, volatility regime classification, the
//! multi-factor entry score, and the engine that combines them with the
//! zone pipeline into a final trade decision.

pub mod patterns;
pub mod volatility;
pub mod entry;
pub mod engine;

// Re-export commonly used types
pub use patterns::{detect_patterns, PatternBias, PatternRecord};
pub use volatility::{volatility_regime, Regime};
pub use entry::{entry_threshold, evaluate_entry_score, is_entry_allowed, EntryConfig, EntryMode};
pub use engine::{
    generate_trade_signal, infer_bias, infer_trend, EngineConfig, OptionSide, StrikeHint,
    TradeSignal, Trend,
};
