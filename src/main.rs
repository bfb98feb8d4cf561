use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crypto_signal_pipeline::config::{load_config, to_toml};
use crypto_signal_pipeline::ml::macro_f1;
use crypto_signal_pipeline::rules::SignalRules;
use crypto_signal_pipeline::{CandleSeries, FeatureFrame, ModelCache, SignalPipeline};

#[derive(Parser)]
#[command(name = "crypto-signal-pipeline")]
#[command(version = "0.1.0")]
#[command(about = "Online entry/exit signal prediction over OHLCV candles", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log as JSON lines
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay candle files (JSON arrays) through the pipeline, one pair per file
    Run {
        /// Candle files; the file stem is used as the pair name
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Candles in the first window
        #[arg(short, long, default_value = "1000")]
        warmup: usize,
        /// Candles added per invocation
        #[arg(short, long, default_value = "1")]
        step: usize,
    },
    /// Replay generated sine-wave instruments
    Synthetic {
        /// Number of instruments
        #[arg(short, long, default_value = "2")]
        pairs: usize,
        /// Candles per instrument
        #[arg(short = 'n', long, default_value = "2000")]
        candles: usize,
        /// Wave period in candles
        #[arg(long, default_value = "48")]
        period: f64,
        /// Relative noise
        #[arg(long, default_value = "0.001")]
        noise: f64,
        #[arg(short, long, default_value = "1500")]
        warmup: usize,
        #[arg(short, long, default_value = "50")]
        step: usize,
    },
    /// Print the effective configuration as TOML
    ShowConfig,
}

fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);
    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json)?;

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run { inputs, warmup, step } => {
            let series = inputs
                .iter()
                .map(|path| load_candles(path))
                .collect::<Result<Vec<_>>>()?;
            let pipeline = SignalPipeline::new(config)?;
            replay(&pipeline, series, warmup, step)?;
        }
        Commands::Synthetic {
            pairs,
            candles,
            period,
            noise,
            warmup,
            step,
        } => {
            // vary the wave a little per instrument
            let waves: BTreeMap<String, f64> = (0..pairs)
                .map(|i| (format!("SINE{}/USD", i + 1), period * (1.0 + 0.25 * i as f64)))
                .collect();
            let series = waves
                .iter()
                .enumerate()
                .map(|(i, (pair, wave))| {
                    let candles = CandleSeries::synthetic_sine(candles, *wave, 0.05, noise, 27 + i as u64);
                    (pair.clone(), candles)
                })
                .collect();
            let pipeline = SignalPipeline::new(config)?;
            let frames = replay(&pipeline, series, warmup, step)?;
            for (pair, frame) in &frames {
                if let Some(wave) = waves.get(pair) {
                    info!("{}: held-out trough/peak macro F1 {:.3}", pair, trough_peak_f1(frame, *wave, warmup)?);
                }
            }
        }
        Commands::ShowConfig => {
            println!("{}", to_toml(&config)?);
        }
    }
    Ok(())
}

fn load_candles(path: &Path) -> Result<(String, CandleSeries)> {
    let pair = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow!("cannot derive a pair name from {}", path.display()))?
        .to_string();
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let series = CandleSeries::from_json(&text).with_context(|| format!("parsing {}", path.display()))?;
    info!("Loaded {} candles for {}", series.len(), pair);
    Ok((pair, series))
}

/// Feed growing windows of each series to the pipeline, as a live host would
/// on every new candle, then apply the rule layer to the final frames.
fn replay(
    pipeline: &SignalPipeline,
    series: Vec<(String, CandleSeries)>,
    warmup: usize,
    step: usize,
) -> Result<BTreeMap<String, FeatureFrame>> {
    let longest = series.iter().map(|(_, c)| c.len()).max().unwrap_or(0);
    if longest == 0 {
        return Err(anyhow!("no candles to process"));
    }

    let mut cache = ModelCache::new();
    let mut latest: BTreeMap<String, FeatureFrame> = BTreeMap::new();
    let mut end = warmup.clamp(1, longest);
    loop {
        let batch: Vec<(String, CandleSeries)> = series
            .iter()
            .filter(|(_, candles)| candles.len() >= end)
            .map(|(pair, candles)| (pair.clone(), candles.head(end)))
            .collect();

        for (pair, frame) in pipeline.process_batch(&mut cache, batch)? {
            match frame {
                Ok(frame) => {
                    latest.insert(pair, frame);
                }
                Err(e) => error!("{}: {}", pair, e),
            }
        }

        if end >= longest {
            break;
        }
        end = (end + step.max(1)).min(longest);
    }

    let rules = SignalRules::default();
    for (pair, frame) in latest.iter_mut() {
        let signals = rules.apply(frame)?;
        info!(
            "{}: {} rows, {} entry signals, {} exit signals",
            pair,
            frame.len(),
            signals.entry_count(),
            signals.exit_count()
        );
    }

    println!("{}", cache);
    println!("{}", pipeline.ledger());
    Ok(latest)
}

/// Macro F1 of `predict_entry > predict_exit` against the known troughs
/// (positive) and peaks of a synthetic wave, on rows after `from`.
fn trough_peak_f1(frame: &FeatureFrame, period: f64, from: usize) -> Result<f64> {
    let entry = frame.column("predict_entry")?;
    let exit = frame.column("predict_exit")?;
    let (mut truth, mut predicted) = (Vec::new(), Vec::new());
    for i in from..frame.len() {
        let phase = (2.0 * std::f64::consts::PI * i as f64 / period).sin();
        if phase.abs() < 0.99 {
            continue;
        }
        truth.push(if phase < 0.0 { 1.0 } else { 0.0 });
        predicted.push(if entry[i] > exit[i] { 1.0 } else { 0.0 });
    }
    Ok(macro_f1(&truth, &predicted))
}
