pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod engine;
pub mod macd;
pub mod oscillators;
pub mod rsi;
pub mod volume;

pub use atr::*;
pub use bollinger::*;
pub use ema::*;
pub use engine::*;
pub use macd::*;
pub use oscillators::*;
pub use rsi::*;
pub use volume::*;

/// Streaming indicator fed one value at a time.
pub trait Indicator {
    fn is_ready(&self) -> bool;
    fn reset(&mut self);
}

// Series helpers. Every function returns a vector aligned with its input;
// rows without a full window hold NaN.

/// Apply `f` to each complete trailing window. Windows containing NaN yield NaN.
pub fn rolling(values: &[f64], window: usize, f: impl Fn(&[f64]) -> f64) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if window == 0 {
        return out;
    }
    for i in (window - 1)..values.len() {
        let slice = &values[i + 1 - window..=i];
        if slice.iter().all(|v| !v.is_nan()) {
            out[i] = f(slice);
        }
    }
    out
}

/// Apply `f` to each complete forward window starting at the row.
pub fn rolling_forward(values: &[f64], window: usize, f: impl Fn(&[f64]) -> f64) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if window == 0 || values.len() < window {
        return out;
    }
    for i in 0..=(values.len() - window) {
        let slice = &values[i..i + window];
        if slice.iter().all(|v| !v.is_nan()) {
            out[i] = f(slice);
        }
    }
    out
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator).
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

pub fn max_of(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

pub fn min_of(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::INFINITY, f64::min)
}

pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    rolling(values, period, mean)
}

pub fn rolling_std(values: &[f64], period: usize) -> Vec<f64> {
    rolling(values, period, sample_std)
}

pub fn highest(values: &[f64], period: usize) -> Vec<f64> {
    rolling(values, period, max_of)
}

pub fn lowest(values: &[f64], period: usize) -> Vec<f64> {
    rolling(values, period, min_of)
}

pub fn rolling_sum(values: &[f64], period: usize) -> Vec<f64> {
    rolling(values, period, |w| w.iter().sum())
}

/// Shift forward by `periods` (positive: value from the past, negative: from the future).
pub fn shift(values: &[f64], periods: isize) -> Vec<f64> {
    let n = values.len() as isize;
    (0..n)
        .map(|i| {
            let src = i - periods;
            if src >= 0 && src < n {
                values[src as usize]
            } else {
                f64::NAN
            }
        })
        .collect()
}

pub fn diff(values: &[f64]) -> Vec<f64> {
    let prev = shift(values, 1);
    values.iter().zip(prev).map(|(v, p)| v - p).collect()
}

/// Momentum: change over `period` rows.
pub fn mom(values: &[f64], period: usize) -> Vec<f64> {
    let prev = shift(values, period as isize);
    values.iter().zip(prev).map(|(v, p)| v - p).collect()
}

/// Rate of change in percent.
pub fn roc(values: &[f64], period: usize) -> Vec<f64> {
    let prev = shift(values, period as isize);
    values
        .iter()
        .zip(prev)
        .map(|(v, p)| 100.0 * (v / p - 1.0))
        .collect()
}

/// Element-wise `+1.0` / `-1.0` flag. NaN comparisons yield `-1.0`.
pub fn sign_flag(condition: impl Iterator<Item = bool>) -> Vec<f64> {
    condition.map(|c| if c { 1.0 } else { -1.0 }).collect()
}

pub fn clip(values: &[f64], lower: f64, upper: f64) -> Vec<f64> {
    values
        .iter()
        .map(|v| if v.is_nan() { *v } else { v.clamp(lower, upper) })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma_alignment() {
        let out = sma(&[1.0, 2.0, 3.0, 4.0], 2);
        assert!(out[0].is_nan());
        assert_eq!(&out[1..], &[1.5, 2.5, 3.5]);
    }

    #[test]
    fn test_rolling_std_is_sample_std() {
        let out = rolling_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0], 8);
        assert!((out[7] - 2.138089935299395).abs() < 1e-12);
    }

    #[test]
    fn test_shift_both_directions() {
        let v = [1.0, 2.0, 3.0];
        let back = shift(&v, 1);
        let fwd = shift(&v, -1);
        assert!(back[0].is_nan());
        assert_eq!(back[2], 2.0);
        assert_eq!(fwd[0], 2.0);
        assert!(fwd[2].is_nan());
    }

    #[test]
    fn test_rolling_forward_window() {
        let out = rolling_forward(&[3.0, 1.0, 2.0, 5.0], 2, min_of);
        assert_eq!(&out[..3], &[1.0, 1.0, 2.0]);
        assert!(out[3].is_nan());
    }

    #[test]
    fn test_roc_and_mom() {
        let v = [100.0, 110.0, 121.0];
        assert!((roc(&v, 1)[2] - 10.0).abs() < 1e-9);
        assert_eq!(mom(&v, 2)[2], 21.0);
    }
}
