use std::sync::Arc;

use tracing::{debug, warn};

use super::policy::{DefaultLabelPolicy, LabelPolicy};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::indicators::{
    clip, crossed_above, crossed_below, highest, lowest, max_of, mean, min_of, rolling_forward, rolling_std,
    rolling_sum, sample_std, shift, sign_flag, sma,
};
use crate::ml::sampling::positives;
use crate::signal::{DecomposeMode, SignalDecomposer};
use crate::types::{FeatureFrame, DEBUG_PREFIX};

/// Label-side columns copied onto the live frame as `%` diagnostics.
pub const DEBUG_LABEL_COLUMNS: [&str; 8] = [
    "full_decomposed",
    "train_entry",
    "train_exit",
    "future_gain",
    "future_min",
    "future_max",
    "profit_threshold",
    "loss_threshold",
];

/// Training targets plus the detached frame they were derived from.
#[derive(Debug, Clone)]
pub struct LabelSet {
    pub entries: Vec<f64>,
    pub exits: Vec<f64>,
    /// Whole-window profit threshold: mean future profit plus the configured
    /// number of standard deviations.
    pub overall_profit_threshold: f64,
    pub overall_loss_threshold: f64,
    frame: FeatureFrame,
}

impl LabelSet {
    pub fn frame(&self) -> &FeatureFrame {
        &self.frame
    }

    pub fn entry_count(&self) -> usize {
        positives(&self.entries)
    }

    pub fn exit_count(&self) -> usize {
        positives(&self.exits)
    }

    /// `%`-prefixed copies of the label diagnostics.
    pub fn debug_columns(&self) -> Vec<(String, Vec<f64>)> {
        DEBUG_LABEL_COLUMNS
            .iter()
            .filter_map(|name| {
                self.frame
                    .get(name)
                    .map(|col| (format!("{}{}", DEBUG_PREFIX, name), col.to_vec()))
            })
            .collect()
    }
}

/// Derives entry/exit labels by looking ahead in a private copy of the
/// feature frame. The caller's frame is only ever borrowed immutably.
#[derive(Debug, Clone)]
pub struct LabelBuilder {
    lookahead: usize,
    n_profit_stddevs: f64,
    n_loss_stddevs: f64,
    long_window: usize,
    decomposer: SignalDecomposer,
    policy: Arc<dyn LabelPolicy>,
}

impl LabelBuilder {
    pub fn new(config: &PipelineConfig) -> Self {
        let d = &config.decomposition;
        Self {
            lookahead: config.lookahead(),
            n_profit_stddevs: config.labels.n_profit_stddevs,
            n_loss_stddevs: config.labels.n_loss_stddevs,
            long_window: d.window,
            decomposer: SignalDecomposer::new(d.wavelet, d.threshold_mode, d.window),
            policy: Arc::new(DefaultLabelPolicy::default()),
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn LabelPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn lookahead(&self) -> usize {
        self.lookahead
    }

    pub fn window(&self) -> usize {
        self.lookahead.max(14)
    }

    pub fn policy(&self) -> &dyn LabelPolicy {
        self.policy.as_ref()
    }

    /// Build labels for every row of `frame`. Rows inside the decomposition
    /// warm-up, or without a complete forward window, are never positive.
    pub fn build(&self, frame: &FeatureFrame) -> Result<LabelSet> {
        let mut df = frame.clone();

        // the whole-series decomposition is only allowed on this copy
        let close = df.column("close")?.to_vec();
        df.insert("full_decomposed", self.decomposer.decompose(&close, DecomposeMode::Full))?;

        self.add_hidden_indicators(&mut df)?;
        let (overall_profit_threshold, overall_loss_threshold) = self.add_future_data(&mut df)?;

        let warmup = self.long_window.min(df.len());
        let mut entries = self.policy.entries(&df)?;
        let mut exits = self.policy.exits(&df)?;
        for (name, labels) in [("train_entry", &entries), ("train_exit", &exits)] {
            if labels.len() != df.len() {
                return Err(PipelineError::ColumnLength {
                    name: name.to_string(),
                    expected: df.len(),
                    actual: labels.len(),
                });
            }
        }
        // zero-filled warm-up indicators would read as extremes
        entries[..warmup].fill(0.0);
        exits[..warmup].fill(0.0);
        df.insert("train_entry", entries.clone())?;
        df.insert("train_exit", exits.clone())?;

        let (n_entries, n_exits) = (positives(&entries), positives(&exits));
        if n_entries < 3 {
            warn!("<3 ({}) entry signals generated. Check training criteria", n_entries);
        }
        if n_exits < 3 {
            warn!("<3 ({}) exit signals generated. Check training criteria", n_exits);
        }
        debug!(
            "Labels ({}): {} entries, {} exits over {} rows",
            self.policy.name(),
            n_entries,
            n_exits,
            df.len()
        );

        Ok(LabelSet {
            entries,
            exits,
            overall_profit_threshold,
            overall_loss_threshold,
            frame: df,
        })
    }

    /// Backward-looking statistics that only the label rules consume.
    fn add_hidden_indicators(&self, df: &mut FeatureFrame) -> Result<()> {
        let win = self.window();
        let close = df.column("close")?.to_vec();
        let decomposed = df.column("decomposed")?.to_vec();
        let smooth = df.column("decomposed_smooth")?.to_vec();
        let profit = df.column("decomposed_profit")?.to_vec();
        let loss = df.column("decomposed_loss")?.to_vec();
        let dir = df.column("decomposed_dir")?.to_vec();
        let nseq_up = df.column("decomposed_nseq_up")?.to_vec();
        let nseq_dn = df.column("decomposed_nseq_dn")?.to_vec();

        let deriv = gradient(&smooth);
        let zero = vec![0.0; deriv.len()];
        df.insert("decomposed_top", binary(crossed_below(&deriv, &zero)))?;
        df.insert("decomposed_bottom", binary(crossed_above(&deriv, &zero)))?;
        df.insert("decomposed_deriv", deriv)?;

        df.insert("decomposed_diff", pct_change(&close, &decomposed))?;
        df.insert("decomposed_smooth_diff", pct_change(&smooth, &decomposed))?;
        df.insert(
            "decomposed_trend",
            sign_flag(rolling_sum(&dir, 5).iter().map(|s| *s > 3.0)),
        )?;

        df.insert("decomposed_mean", sma(&decomposed, win))?;
        df.insert("decomposed_std", rolling_std(&decomposed, win))?;
        df.insert("decomposed_profit_mean", sma(&profit, win))?;
        df.insert("decomposed_profit_std", rolling_std(&profit, win))?;
        df.insert("decomposed_loss_mean", sma(&loss, win))?;
        df.insert("decomposed_loss_std", rolling_std(&loss, win))?;

        // run-length statistics and the rows where a run is unusually long
        for (name, runs, n_std) in [
            ("decomposed_nseq_up", &nseq_up, self.n_profit_stddevs),
            ("decomposed_nseq_dn", &nseq_dn, self.n_loss_stddevs),
        ] {
            let avg = sma(runs, win);
            let std = rolling_std(runs, win);
            let thresh: Vec<f64> = avg.iter().zip(&std).map(|(m, s)| m + n_std * s).collect();
            let long = binary(runs.iter().zip(&thresh).map(|(r, t)| r > t));
            df.insert(format!("{}_mean", name), avg)?;
            df.insert(format!("{}_std", name), std)?;
            df.insert(format!("{}_thresh", name), thresh)?;
            df.insert(format!("{}_long", name), long)?;
        }

        let recent_min = lowest(&decomposed, win);
        let recent_max = highest(&decomposed, win);
        df.insert("decomposed_maxmin", pct_change(&recent_max, &recent_min).iter().map(|v| -v).collect())?;
        df.insert("decomposed_delta_min", pct_change(&close, &recent_min))?;
        df.insert("decomposed_delta_max", pct_change(&close, &recent_max))?;
        df.insert("decomposed_recent_min", recent_min)?;
        df.insert("decomposed_recent_max", recent_max)?;

        let low = lowest(&smooth, self.long_window);
        let high = highest(&smooth, self.long_window);
        df.insert("decomposed_at_low", binary(smooth.iter().zip(&low).map(|(s, l)| s <= l)))?;
        df.insert("decomposed_at_high", binary(smooth.iter().zip(&high).map(|(s, h)| s >= h)))?;
        df.insert("decomposed_low", low)?;
        df.insert("decomposed_high", high)?;
        Ok(())
    }

    /// Forward-looking columns. Returns the whole-window profit and loss
    /// thresholds.
    fn add_future_data(&self, df: &mut FeatureFrame) -> Result<(f64, f64)> {
        let win = self.window();
        let lookahead = self.lookahead as isize;
        let close = df.column("close")?.to_vec();
        let price = df.column("full_decomposed")?.to_vec();

        let future_price = shift(&price, -lookahead);
        let gain = clip(&pct_change(&price, &future_price), -5.0, 5.0);
        let profit = clip(&gain, 0.0, f64::INFINITY);
        let loss = clip(&gain, f64::NEG_INFINITY, 0.0);

        // trailing windows: the values themselves already look forward
        for (name, values) in [("profit", &profit), ("loss", &loss)] {
            df.insert(format!("{}_mean", name), sma(values, win))?;
            df.insert(format!("{}_std", name), rolling_std(values, win))?;
            df.insert(format!("{}_max", name), highest(values, win))?;
            df.insert(format!("{}_min", name), lowest(values, win))?;
        }

        let profit_mean = df.column("decomposed_profit_mean")?.to_vec();
        let profit_std = df.column("decomposed_profit_std")?.to_vec();
        let loss_mean = df.column("decomposed_loss_mean")?.to_vec();
        let loss_std = df.column("decomposed_loss_std")?.to_vec();
        let profit_threshold: Vec<f64> = profit_mean
            .iter()
            .zip(&profit_std)
            .map(|(m, s)| m + self.n_profit_stddevs * s.abs())
            .collect();
        let loss_threshold: Vec<f64> = loss_mean
            .iter()
            .zip(&loss_std)
            .map(|(m, s)| m - self.n_loss_stddevs * s.abs())
            .collect();
        df.insert(
            "profit_diff",
            profit.iter().zip(&profit_threshold).map(|(p, t)| (p - t) * 10.0).collect(),
        )?;
        df.insert(
            "loss_diff",
            loss.iter().zip(&loss_threshold).map(|(l, t)| (l - t) * 10.0).collect(),
        )?;
        df.insert("profit_threshold", profit_threshold)?;
        df.insert("loss_threshold", loss_threshold)?;

        let rising = |values: &[f64]| {
            let prev = shift(values, 1);
            sign_flag(values.iter().zip(&prev).map(|(v, p)| v >= p))
        };
        let trend = rising(&price);
        let ftrend = rising(&future_price);
        df.insert("curr_trend", sign_flag(rolling_sum(&trend, 3).iter().map(|s| *s > 0.0)))?;
        df.insert("future_trend", sign_flag(rolling_sum(&ftrend, 3).iter().map(|s| *s > 0.0)))?;

        // run lengths one window ahead, summarised over a forward window
        for (name, n_std) in [("nseq_up", self.n_profit_stddevs), ("nseq_dn", self.n_loss_stddevs)] {
            let runs = shift(df.column(&format!("decomposed_{}", name))?, -(win as isize));
            let avg = rolling_forward(&runs, win, mean);
            let std = rolling_forward(&runs, win, sample_std);
            let thresh: Vec<f64> = avg.iter().zip(&std).map(|(m, s)| m + n_std * s).collect();
            df.insert(format!("future_{}", name), runs)?;
            df.insert(format!("future_{}_mean", name), avg)?;
            df.insert(format!("future_{}_std", name), std)?;
            df.insert(format!("future_{}_thresh", name), thresh)?;
        }

        let future_min = rolling_forward(&price, win, min_of);
        let future_max = rolling_forward(&price, win, max_of);
        let maxmin: Vec<f64> = future_max
            .iter()
            .zip(&future_min)
            .map(|(hi, lo)| 100.0 * (hi - lo) / hi)
            .collect();
        df.insert("future_maxmin", clip(&maxmin, 0.0, 10.0))?;
        df.insert("future_delta_min", pct_change(&close, &future_min))?;
        df.insert("future_delta_max", pct_change(&close, &future_max))?;
        df.insert("future_min", future_min)?;
        df.insert("future_max", future_max)?;
        df.insert("future_decomposed", future_price)?;
        df.insert("future_profit", profit.clone())?;
        df.insert("future_loss", loss.clone())?;
        df.insert("future_gain", gain)?;

        let finite = |values: &[f64]| -> Vec<f64> { values.iter().copied().filter(|v| v.is_finite()).collect() };
        let (profit, loss) = (finite(&profit), finite(&loss));
        let overall_profit = mean(&profit) + self.n_profit_stddevs * sample_std(&profit);
        let overall_loss = mean(&loss) - self.n_loss_stddevs * sample_std(&loss).abs();
        debug!("Profit threshold {:.4}, loss threshold {:.4}", overall_profit, overall_loss);
        Ok((overall_profit, overall_loss))
    }
}

/// Central differences with one-sided edges.
fn gradient(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    match n {
        0 => Vec::new(),
        1 => vec![0.0],
        _ => (0..n)
            .map(|i| match i {
                0 => values[1] - values[0],
                i if i == n - 1 => values[n - 1] - values[n - 2],
                i => (values[i + 1] - values[i - 1]) / 2.0,
            })
            .collect(),
    }
}

/// `100 * (to - from) / from`, element-wise.
fn pct_change(from: &[f64], to: &[f64]) -> Vec<f64> {
    from.iter().zip(to).map(|(f, t)| 100.0 * (t - f) / f).collect()
}

fn binary(condition: impl IntoIterator<Item = bool>) -> Vec<f64> {
    condition.into_iter().map(|c| if c { 1.0 } else { 0.0 }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::IndicatorEngine;
    use crate::types::candle::fixtures::sine_series;

    const PERIOD: f64 = 48.0;

    fn live_frame(n: usize, seed: u64) -> FeatureFrame {
        let config = PipelineConfig::default();
        IndicatorEngine::new(&config)
            .compute(&sine_series(n, PERIOD, 0.05, 0.001, seed))
            .unwrap()
    }

    #[test]
    fn test_build_leaves_live_frame_untouched() {
        let frame = live_frame(600, 1);
        let before = frame.clone();
        let labels = LabelBuilder::new(&PipelineConfig::default()).build(&frame).unwrap();

        assert_eq!(frame, before);
        assert!(!frame.has("future_gain"));
        assert!(labels.frame().has("future_gain"));
        assert!(labels.frame().has("full_decomposed"));
        assert_eq!(labels.entries.len(), frame.len());
        assert_eq!(labels.exits.len(), frame.len());
    }

    #[test]
    fn test_labels_sit_at_troughs_and_peaks() {
        let frame = live_frame(1000, 2);
        let labels = LabelBuilder::new(&PipelineConfig::default()).build(&frame).unwrap();
        assert!(labels.entry_count() >= 3, "entries: {}", labels.entry_count());
        assert!(labels.exit_count() >= 3, "exits: {}", labels.exit_count());

        let phase = |i: usize| (2.0 * std::f64::consts::PI * i as f64 / PERIOD).sin();
        assert!(labels.entries[..128].iter().all(|v| *v == 0.0));
        for (i, (e, x)) in labels.entries.iter().zip(&labels.exits).enumerate() {
            if *e > 0.5 {
                assert!(phase(i) < 0.0, "entry at row {} is not in a trough", i);
            }
            if *x > 0.5 {
                assert!(phase(i) > 0.0, "exit at row {} is not at a peak", i);
            }
        }
    }

    #[test]
    fn test_no_labels_near_the_end() {
        let frame = live_frame(600, 3);
        let builder = LabelBuilder::new(&PipelineConfig::default());
        let labels = builder.build(&frame).unwrap();
        let tail = frame.len() - builder.window() + 1;
        assert!(labels.entries[tail..].iter().all(|v| *v == 0.0));
        assert!(labels.exits[tail..].iter().all(|v| *v == 0.0));
        let gain = labels.frame().column("future_gain").unwrap();
        assert!(gain.iter().filter(|v| v.is_finite()).all(|v| (-5.0..=5.0).contains(v)));
    }

    #[test]
    fn test_too_few_labels_is_not_an_error() {
        let frame = live_frame(400, 4);
        let policy = DefaultLabelPolicy {
            oversold_mfi: -1.0,
            overbought_mfi: 101.0,
        };
        let labels = LabelBuilder::new(&PipelineConfig::default())
            .with_policy(Arc::new(policy))
            .build(&frame)
            .unwrap();
        assert_eq!(labels.entry_count(), 0);
        assert_eq!(labels.exit_count(), 0);
    }

    #[test]
    fn test_debug_columns_are_prefixed() {
        let frame = live_frame(300, 5);
        let labels = LabelBuilder::new(&PipelineConfig::default()).build(&frame).unwrap();
        let columns = labels.debug_columns();
        assert_eq!(columns.len(), DEBUG_LABEL_COLUMNS.len());
        assert!(columns.iter().all(|(name, col)| name.starts_with(DEBUG_PREFIX) && col.len() == 300));
    }

    #[test]
    fn test_gradient_edges() {
        assert_eq!(gradient(&[1.0, 2.0, 4.0, 7.0]), vec![1.0, 1.5, 2.5, 3.0]);
        assert_eq!(gradient(&[3.0]), vec![0.0]);
    }
}
