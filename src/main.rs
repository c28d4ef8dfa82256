//! CLI driver for the zone pipeline and signal engine
//!
//! `evaluate` runs one cycle over exported candle CSVs and prints the
//! decision record; `zones` dumps the merged zone list; `backtest` replays
//! 5m sessions bar by bar with the daily signal-state gates applied.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use nifty_sniper::bars::{Bar, Timeframe};
use nifty_sniper::data::{load_bars, resample};
use nifty_sniper::indicators::enrich_with_indicators;
use nifty_sniper::session;
use nifty_sniper::signal::engine::{generate_trade_signal, EngineConfig, TradeSignal};
use nifty_sniper::state::DailySignalState;
use nifty_sniper::zones::builder::{session_date, BuilderConfig};
use nifty_sniper::zones::multi_tf::build_zones_multi_tf;
use nifty_sniper::zones::Zone;

#[derive(Parser, Debug)]
#[command(name = "nifty-sniper")]
#[command(about = "NIFTY intraday S/R zone detection & options signal engine")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Print verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one evaluation cycle and print the decision record as JSON
    Evaluate {
        /// 5-minute index candle CSV (timestamp,open,high,low,close,volume)
        #[arg(short, long)]
        spot: PathBuf,

        /// 5-minute futures candle CSV for volume evidence
        #[arg(short, long)]
        futures: Option<PathBuf>,
    },

    /// Build and print the merged multi-timeframe zone list as JSON
    Zones {
        /// 5-minute index candle CSV
        #[arg(short, long)]
        spot: PathBuf,

        /// 5-minute futures candle CSV for volume evidence
        #[arg(short, long)]
        futures: Option<PathBuf>,

        /// Keep only the top N zones by normalized score
        #[arg(short, long)]
        top: Option<usize>,
    },

    /// Replay 5m session files bar-by-bar and log the signals taken
    Backtest {
        /// Directory of 5-minute candle CSVs, one series per file
        #[arg(short, long, default_value = "data")]
        data_dir: PathBuf,

        /// Output directory for the signal log
        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,

        /// Bars of warmup before the first evaluation
        #[arg(long, default_value = "60")]
        warmup: usize,

        /// Evaluate every Nth bar
        #[arg(long, default_value = "1")]
        stride: usize,
    },
}

/// Assemble the per-timeframe frames the zone pipeline consumes, deriving
/// 15m/1h series from the 5m exports
fn build_frames(
    spot_5m: &[Bar],
    fut_5m: Option<&[Bar]>,
) -> Vec<(Timeframe, Vec<Bar>, Option<Vec<Bar>>)> {
    Timeframe::ALL
        .iter()
        .map(|&tf| {
            let spot = match tf {
                Timeframe::M5 => spot_5m.to_vec(),
                _ => resample(spot_5m, tf),
            };
            let fut = fut_5m.map(|fut| match tf {
                Timeframe::M5 => fut.to_vec(),
                _ => resample(fut, tf),
            });
            (tf, spot, fut)
        })
        .collect()
}

fn evaluate_once(spot_5m: &[Bar], fut_5m: Option<&[Bar]>) -> (Vec<Zone>, TradeSignal) {
    let frames = build_frames(spot_5m, fut_5m);
    let zones = build_zones_multi_tf(&frames, &BuilderConfig::default(), None);

    for (i, z) in zones.iter().take(5).enumerate() {
        info!(
            "Zone rank #{} | score={:.2} | {} | band [{:.2}-{:.2}] | {:?} | tfs={:?}",
            i + 1,
            z.score,
            z.kind,
            z.band.low,
            z.band.high,
            z.confidence,
            z.timeframes
        );
    }

    let indicators = enrich_with_indicators(spot_5m);
    let signal = generate_trade_signal(spot_5m, &indicators, &zones, &EngineConfig::default());
    (zones, signal)
}

fn run_evaluate(spot: &Path, futures: Option<&Path>) -> Result<()> {
    let spot_bars = load_bars(spot)?;
    if spot_bars.len() < 20 {
        bail!("insufficient candle data: {} bars", spot_bars.len());
    }
    let fut_bars = futures.map(load_bars).transpose()?;

    let (_, signal) = evaluate_once(&spot_bars, fut_bars.as_deref());
    info!(
        "Signal: direction={:?} allowed={} score={:.2} threshold={:.2} ({})",
        signal.direction, signal.allowed, signal.entry_score, signal.threshold, signal.debug_reason
    );
    println!("{}", serde_json::to_string_pretty(&signal)?);
    Ok(())
}

fn run_zones(spot: &Path, futures: Option<&Path>, top: Option<usize>) -> Result<()> {
    let spot_bars = load_bars(spot)?;
    let fut_bars = futures.map(load_bars).transpose()?;

    let frames = build_frames(&spot_bars, fut_bars.as_deref());
    let zones = build_zones_multi_tf(&frames, &BuilderConfig::default(), top);
    println!("{}", serde_json::to_string_pretty(&zones)?);
    Ok(())
}

/// One logged signal from a backtest replay
#[derive(Debug, serde::Serialize)]
struct SignalRow {
    timestamp: String,
    source_file: String,
    direction: String,
    strike: String,
    entry_score: f64,
    threshold: f64,
    confidence: String,
    pattern: String,
    regime: String,
    trend: String,
    zone_low: Option<f64>,
    zone_high: Option<f64>,
    debug_reason: String,
}

fn replay_file(path: &Path, warmup: usize, stride: usize) -> Result<Vec<SignalRow>> {
    let bars = load_bars(path)?;
    if bars.len() <= warmup {
        warn!("{}: fewer bars than warmup, skipped", path.display());
        return Ok(Vec::new());
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut rows = Vec::new();
    let mut state = DailySignalState::new(session_date(&bars[0]));

    for i in (warmup..bars.len()).step_by(stride.max(1)) {
        let now = bars[i].timestamp;
        state = state.rolled_to(session_date(&bars[i]));

        if !session::is_market_open(now) || !session::is_within_entry_window(now) {
            continue;
        }

        let window = &bars[..=i];
        let (_, signal) = evaluate_once(window, None);

        let Some(direction) = signal.direction else {
            continue;
        };
        if !signal.allowed {
            continue;
        }
        // Driver-side gates: one signal per direction per day, cooldown
        // before flipping sides
        if state.is_used(direction) || state.in_cooldown(direction, now) {
            continue;
        }
        state = state.mark_used(direction, now);

        info!(
            "{} {} @ {} | score={:.2} ({})",
            file_name, direction, now, signal.entry_score, signal.debug_reason
        );
        rows.push(SignalRow {
            timestamp: now.to_rfc3339(),
            source_file: file_name.clone(),
            direction: direction.to_string(),
            strike: format!("{:?}", signal.strike),
            entry_score: signal.entry_score,
            threshold: signal.threshold,
            confidence: format!("{:?}", signal.confidence),
            pattern: signal.pattern.name.to_string(),
            regime: signal.regime.to_string(),
            trend: signal.trend.to_string(),
            zone_low: signal.zone.as_ref().map(|z| z.band.low),
            zone_high: signal.zone.as_ref().map(|z| z.band.high),
            debug_reason: signal.debug_reason,
        });
    }

    Ok(rows)
}

fn run_backtest(data_dir: &Path, output_dir: &Path, warmup: usize, stride: usize) -> Result<()> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(data_dir)
        .with_context(|| format!("failed to read {}", data_dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "csv"))
        .collect();
    files.sort();
    if files.is_empty() {
        bail!("no CSV files found in {}", data_dir.display());
    }
    info!("Backtesting {} session file(s)", files.len());

    // Session files are independent; replay them in parallel
    let results: Vec<Result<Vec<SignalRow>>> = files
        .par_iter()
        .map(|path| replay_file(path, warmup, stride))
        .collect();

    let mut rows = Vec::new();
    for (path, result) in files.iter().zip(results) {
        match result {
            Ok(mut r) => rows.append(&mut r),
            Err(e) => warn!("{}: replay failed: {:#}", path.display(), e),
        }
    }

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;
    let out_path = output_dir.join("signals.csv");
    let mut writer = csv::Writer::from_path(&out_path)
        .with_context(|| format!("failed to open {}", out_path.display()))?;
    for row in &rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    info!("Wrote {} signal(s) to {}", rows.len(), out_path.display());
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Commands::Evaluate { spot, futures } => {
            run_evaluate(&spot, futures.as_deref())?;
        }
        Commands::Zones { spot, futures, top } => {
            run_zones(&spot, futures.as_deref(), top)?;
        }
        Commands::Backtest {
            data_dir,
            output_dir,
            warmup,
            stride,
        } => {
            run_backtest(&data_dir, &output_dir, warmup, stride)?;
        }
    }

    Ok(())
}
