//! Daily signal-usage and risk state
//!
//! One CE and one PE signal may be consumed per trading day, with a
//! cooldown before flipping sides. The state is owned by the driver: it is
//! loaded before an evaluation cycle, passed in read-only, and written back
//! once a signal is actually taken. Persisted as plain JSON.

use crate::signal::OptionSide;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Minimum seconds before an opposite-side entry after a trade
pub const OPPOSITE_SIDE_COOLDOWN_SECS: i64 = 1800;

/// Per-day signal usage flags plus the last trade taken
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySignalState {
    pub trade_date: NaiveDate,
    pub ce_used: bool,
    pub pe_used: bool,
    pub last_trade_time: Option<DateTime<Utc>>,
    pub last_side: Option<OptionSide>,
    /// Realized P&L for the day, maintained by the execution collaborator
    #[serde(default)]
    pub realized_pnl: f64,
}

impl DailySignalState {
    pub fn new(trade_date: NaiveDate) -> Self {
        Self {
            trade_date,
            ce_used: false,
            pe_used: false,
            last_trade_time: None,
            last_side: None,
            realized_pnl: 0.0,
        }
    }

    pub fn is_used(&self, side: OptionSide) -> bool {
        match side {
            OptionSide::Ce => self.ce_used,
            OptionSide::Pe => self.pe_used,
        }
    }

    /// Record a taken signal, returning the updated state
    pub fn mark_used(mut self, side: OptionSide, at: DateTime<Utc>) -> Self {
        match side {
            OptionSide::Ce => self.ce_used = true,
            OptionSide::Pe => self.pe_used = true,
        }
        self.last_trade_time = Some(at);
        self.last_side = Some(side);
        self
    }

    /// Opposite-side entries are blocked for a cooldown window after the
    /// last trade
    pub fn in_cooldown(&self, side: OptionSide, now: DateTime<Utc>) -> bool {
        match (self.last_side, self.last_trade_time) {
            (Some(last), Some(at)) if last != side => {
                (now - at).num_seconds() < OPPOSITE_SIDE_COOLDOWN_SECS
            }
            _ => false,
        }
    }

    /// Reset the flags when a new trading day has started
    pub fn rolled_to(self, today: NaiveDate) -> Self {
        if self.trade_date == today {
            self
        } else {
            info!("New trading day {} - resetting signal flags", today);
            Self::new(today)
        }
    }
}

/// Load signal state from disk, defaulting to a fresh day when missing
pub fn load_signal_state(path: &Path, today: NaiveDate) -> Result<DailySignalState> {
    if !path.exists() {
        return Ok(DailySignalState::new(today));
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let state: DailySignalState =
        serde_json::from_str(&raw).with_context(|| format!("bad state file {}", path.display()))?;
    Ok(state.rolled_to(today))
}

pub fn save_signal_state(path: &Path, state: &DailySignalState) -> Result<()> {
    let json = serde_json::to_string_pretty(state)?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    info!("Signal state saved to {}", path.display());
    Ok(())
}
