use tracing::{debug, warn};

use super::*;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::signal::{causal_gaussian, gaussian_filter, DecomposeMode, SignalDecomposer};
use crate::types::{CandleSeries, FeatureFrame};

/// Length of each run of equal consecutive values, counted from 1.
pub fn run_length(values: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let mut count = 0.0;
    for (i, v) in values.iter().enumerate() {
        count = if i > 0 && values[i - 1] == *v { count + 1.0 } else { 1.0 };
        out.push(count);
    }
    out
}

/// Derives the full feature frame from raw candles.
#[derive(Debug, Clone)]
pub struct IndicatorEngine {
    lookahead: usize,
    decomposer: SignalDecomposer,
    live_mode: DecomposeMode,
    smoothing_sigma: f64,
}

impl IndicatorEngine {
    pub fn new(config: &PipelineConfig) -> Self {
        let d = &config.decomposition;
        Self {
            lookahead: config.lookahead(),
            decomposer: SignalDecomposer::new(d.wavelet, d.threshold_mode, d.window),
            live_mode: d.live_mode,
            smoothing_sigma: d.smoothing_sigma,
        }
    }

    /// Rolling window for the averages and label statistics.
    pub fn window(&self) -> usize {
        self.lookahead.max(14)
    }

    pub fn decomposer(&self) -> &SignalDecomposer {
        &self.decomposer
    }

    pub fn smoothing_sigma(&self) -> f64 {
        self.smoothing_sigma
    }

    /// Smooth with the same causality as the live decomposition.
    fn smooth(&self, series: &[f64]) -> Vec<f64> {
        match self.live_mode {
            DecomposeMode::Causal => causal_gaussian(series, self.smoothing_sigma, self.decomposer.window()),
            DecomposeMode::Full => gaussian_filter(series, self.smoothing_sigma),
        }
    }

    /// Compute every feature column. Warm-up rows and ratios with a zero
    /// denominator are zero-filled after an explicit infinity check.
    pub fn compute(&self, candles: &CandleSeries) -> Result<FeatureFrame> {
        let win = self.window();
        let open = candles.opens();
        let high = candles.highs();
        let low = candles.lows();
        let close = candles.closes();
        let volume = candles.volumes();

        let mut frame = FeatureFrame::new(candles.timestamps());
        frame.insert("open", open.clone())?;
        frame.insert("high", high.clone())?;
        frame.insert("low", low.clone())?;
        frame.insert("close", close.clone())?;
        frame.insert("volume", volume.clone())?;

        // averages used by the rule layer
        let tema_win = tema(&close, win);
        frame.insert("sma", sma(&close, win))?;
        frame.insert("ema", ema(&close, win))?;
        frame.insert("tema_stddev", rolling_std(&tema_win, win))?;
        frame.insert("tema", tema_win)?;

        // RSI family
        let rsi_win = rsi(&close, win);
        let (srsi_k, srsi_d) = stoch_rsi(&rsi_win, 14, 3, 3);
        frame.insert("srsi_k", srsi_k)?;
        frame.insert("srsi_d", srsi_d)?;

        // Bollinger and Donchian bands
        let bb = bollinger_bands(&close, 20, 2.0);
        let per_close = |band: &[f64]| -> Vec<f64> { band.iter().zip(&close).map(|(b, c)| (b - c) / c).collect() };
        frame.insert("bb_width", bb.width())?;
        frame.insert("bb_gain", per_close(&bb.upper))?;
        frame.insert("bb_loss", per_close(&bb.lower))?;
        let dc = donchian(&high, &low, win);
        frame.insert("dcbb_dist_upper", zip_with(&dc.upper, &bb.upper, |a, b| a - b))?;
        frame.insert("dcbb_dist_lower", zip_with(&dc.lower, &bb.lower, |a, b| a - b))?;
        frame.insert("dc_dist", zip_with(&dc.upper, &dc.lower, |a, b| a - b))?;
        frame.insert("bb_lowerband", bb.lower)?;
        frame.insert("bb_middleband", bb.middle)?;
        frame.insert("bb_upperband", bb.upper)?;
        frame.insert("dc_upper", dc.upper)?;
        frame.insert("dc_lower", dc.lower)?;
        frame.insert("dc_mid", dc.middle)?;

        // Williams %R and Fisher transforms
        let r_14 = williams_r(&high, &low, &close, 14);
        let wr: Vec<f64> = r_14.iter().map(|r| 0.02 * (r + 50.0)).collect();
        let fisher = fisher_rsi(&rsi_win);
        frame.insert("fisher_wr", zip_with(&wr, &fisher, |a, b| (a + b) / 2.0))?;
        frame.insert("wr", wr)?;
        frame.insert("fisher_rsi", fisher)?;
        frame.insert("rsi", rsi_win)?;
        frame.insert("rsi_14", rsi(&close, 14))?;

        let sma_200 = sma(&close, 200);
        for lag in [20, 24] {
            let past = shift(&sma_200, lag);
            let flag = sign_flag(sma_200.iter().zip(&past).map(|(s, p)| s < p));
            frame.insert(format!("sma_200_dec_{}", lag), flag)?;
        }
        frame.insert("sma_200", sma_200)?;

        frame.insert("crsi", connors_rsi(&close))?;
        frame.insert("r_14", r_14)?;
        frame.insert("r_480", williams_r(&high, &low, &close, 480))?;
        frame.insert("roc_9", roc(&close, 9))?;

        // pump protection
        for period in [48, 36, 24, 12, 6] {
            frame.insert(format!("hl_pct_change_{}", period), range_percent_change(&high, &low, period))?;
        }

        // directional movement
        let dm = directional(&high, &low, &close, 14);
        frame.insert("adx", dm.adx)?;
        frame.insert("dm_delta", zip_with(&dm.dm_plus, &dm.dm_minus, |a, b| a - b))?;
        frame.insert("di_delta", zip_with(&dm.di_plus, &dm.di_minus, |a, b| a - b))?;
        frame.insert("dm_plus", dm.dm_plus)?;
        frame.insert("di_plus", dm.di_plus)?;
        frame.insert("dm_minus", dm.dm_minus)?;
        frame.insert("di_minus", dm.di_minus)?;

        let m = macd(&close, 12, 26, 9);
        let moist = sign_flag(crossed_above(&m.macd, &m.signal).into_iter());
        frame.insert("macd", m.macd)?;
        frame.insert("macdsignal", m.signal)?;
        frame.insert("macdhist", m.histogram)?;

        let (fastk, fastd) = stoch_fast(&high, &low, &close, 5, 3);
        frame.insert("fast_diff", zip_with(&fastd, &fastk, |d, k| d - k))?;
        frame.insert("fastd", fastd)?;
        frame.insert("fastk", fastk)?;
        frame.insert("mom", mom(&close, 14))?;

        // priming flags
        let color = sign_flag(close.iter().zip(&open).map(|(c, o)| c > o));
        let rsi_7 = rsi(&close, 7);
        let roc_6 = roc(&close, 6);
        let above_mean = |values: &[f64]| {
            let avg = sma(values, 12);
            sign_flag(values.iter().zip(&avg).map(|(v, a)| v > a))
        };
        frame.insert("primed", sign_flag(rolling_sum(&color, 3).iter().map(|s| *s == 3.0)))?;
        frame.insert("in_the_mood", above_mean(&rsi_7))?;
        frame.insert("moist", moist)?;
        frame.insert("throbbing", above_mean(&roc_6))?;
        frame.insert("color", color)?;
        frame.insert("rsi_7", rsi_7)?;
        frame.insert("roc_6", roc_6)?;

        frame.insert("mfi", mfi(&high, &low, &close, &volume, 14))?;
        frame.insert("atr", atr(&high, &low, &close, win))?;

        // oscillators
        frame.insert("ewo", ewo(&close, 50, 200))?;
        frame.insert("uo", ultimate_oscillator(&high, &low, &close))?;
        let ar = aroon(&high, &low, 14);
        frame.insert("aroonosc", ar.oscillator())?;
        frame.insert("aroonup", ar.up)?;
        frame.insert("aroondown", ar.down)?;
        frame.insert("ao", awesome_oscillator(&high, &low))?;
        frame.insert("cci", cci(&high, &low, &close, 14))?;

        self.add_decomposition(&mut frame, &close)?;

        let inf_columns = frame.check_inf();
        if !inf_columns.is_empty() {
            warn!("Infinite values in columns: {:?}", inf_columns);
        }
        let filled = frame.fill_non_finite(0.0);
        if filled > 0 {
            debug!("Zero-filled {} warm-up or non-finite values", filled);
        }
        Ok(frame)
    }

    /// Decomposed price proxy and its derived trend features.
    fn add_decomposition(&self, frame: &mut FeatureFrame, close: &[f64]) -> Result<()> {
        let decomposed = self.decomposer.decompose(close, self.live_mode);
        let decomposed_smooth = self.smooth(&decomposed);

        let prev = shift(&decomposed, 1);
        let gain: Vec<f64> = decomposed
            .iter()
            .zip(&prev)
            .map(|(d, p)| 100.0 * (d - p) / p)
            .collect();
        let dir = sign_flag(diff(&decomposed_smooth).iter().map(|d| *d > 0.0));
        let dir_up = clip(&dir, 0.0, f64::INFINITY);
        let dir_dn: Vec<f64> = clip(&dir, f64::NEG_INFINITY, 0.0).iter().map(|v| v.abs()).collect();
        let nseq = |flags: &[f64]| {
            let runs = run_length(flags);
            let counted: Vec<f64> = flags.iter().zip(&runs).map(|(f, r)| f * r).collect();
            clip(&counted, 0.0, 20.0)
        };

        frame.insert("smooth", self.smooth(close))?;
        frame.insert("decomposed_profit", clip(&gain, 0.0, f64::INFINITY))?;
        frame.insert("decomposed_loss", clip(&gain, f64::NEG_INFINITY, 0.0))?;
        frame.insert("decomposed_gain", gain)?;
        frame.insert("decomposed_nseq_up", nseq(&dir_up))?;
        frame.insert("decomposed_nseq_dn", nseq(&dir_dn))?;
        frame.insert("decomposed_dir", dir)?;
        frame.insert("decomposed_dir_up", dir_up)?;
        frame.insert("decomposed_dir_dn", dir_dn)?;
        frame.insert("decomposed_smooth", decomposed_smooth)?;
        frame.insert("decomposed", decomposed)?;
        Ok(())
    }
}

fn zip_with(a: &[f64], b: &[f64], f: impl Fn(f64, f64) -> f64) -> Vec<f64> {
    a.iter().zip(b).map(|(x, y)| f(*x, *y)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::candle::fixtures::sine_series;

    fn engine() -> IndicatorEngine {
        IndicatorEngine::new(&PipelineConfig::default())
    }

    #[test]
    fn test_run_length() {
        assert_eq!(
            run_length(&[1.0, 1.0, 0.0, 1.0, 1.0, 1.0]),
            vec![1.0, 2.0, 1.0, 1.0, 2.0, 3.0]
        );
        assert!(run_length(&[]).is_empty());
    }

    #[test]
    fn test_schema_is_complete_and_finite() {
        let candles = sine_series(600, 48.0, 0.05, 0.01, 1);
        let frame = engine().compute(&candles).unwrap();
        assert_eq!(frame.len(), 600);
        for name in [
            "sma", "tema", "srsi_k", "bb_gain", "dc_mid", "fisher_wr", "sma_200_dec_24", "crsi",
            "hl_pct_change_6", "di_delta", "macdhist", "fast_diff", "primed", "moist", "mfi", "ewo",
            "aroonosc", "cci", "decomposed", "decomposed_smooth", "decomposed_nseq_dn", "smooth",
        ] {
            assert!(frame.has(name), "missing {}", name);
        }
        assert!(frame.check_inf().is_empty());
        let matrix = frame.to_matrix();
        assert!(matrix.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_short_window_is_deterministic_and_finite() {
        let candles = sine_series(40, 48.0, 0.05, 0.01, 2);
        let a = engine().compute(&candles).unwrap();
        let b = engine().compute(&candles).unwrap();
        assert_eq!(a, b);
        assert!(a.to_matrix().iter().all(|v| v.is_finite()));
        // sma_200 never warms up here
        assert!(a.column("sma_200").unwrap().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_rows_do_not_depend_on_later_candles() {
        let full = sine_series(400, 48.0, 0.05, 0.02, 3);
        let head = full.head(300);
        let a = engine().compute(&head).unwrap();
        let b = engine().compute(&full).unwrap().head(300);
        for name in ["decomposed", "decomposed_smooth", "mfi", "tema", "decomposed_nseq_up"] {
            let (x, y) = (a.column(name).unwrap(), b.column(name).unwrap());
            for (i, (p, q)) in x.iter().zip(y).enumerate() {
                assert!((p - q).abs() < 1e-9, "{} differs at row {}", name, i);
            }
        }
    }

    #[test]
    fn test_nseq_counts_runs_up_to_cap() {
        let candles = sine_series(600, 96.0, 0.05, 0.0, 4);
        let frame = engine().compute(&candles).unwrap();
        let up = frame.column("decomposed_nseq_up").unwrap();
        let dir_up = frame.column("decomposed_dir_up").unwrap();
        assert!(up.iter().all(|v| (0.0..=20.0).contains(v)));
        assert!(up.iter().any(|v| *v == 20.0));
        for (u, d) in up.iter().zip(dir_up) {
            if *d == 0.0 {
                assert_eq!(*u, 0.0);
            }
        }
    }
}
