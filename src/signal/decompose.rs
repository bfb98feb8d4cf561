use serde::{Deserialize, Serialize};

use crate::indicators::mean;

/// Orthogonal Daubechies family used for the decomposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Wavelet {
    Haar,
    Db2,
    Db4,
}

const HAAR: [f64; 2] = [std::f64::consts::FRAC_1_SQRT_2, std::f64::consts::FRAC_1_SQRT_2];

const DB2: [f64; 4] = [
    -0.12940952255092145,
    0.22414386804185735,
    0.836516303737469,
    0.48296291314469025,
];

const DB4: [f64; 8] = [
    -0.010597401784997278,
    0.032883011666982945,
    0.030841381835986965,
    -0.18703481171888114,
    -0.02798376941698385,
    0.6308807679295904,
    0.7148465705525415,
    0.23037781330885523,
];

impl Wavelet {
    /// Low-pass analysis filter.
    pub fn low_pass(&self) -> &'static [f64] {
        match self {
            Wavelet::Haar => &HAAR,
            Wavelet::Db2 => &DB2,
            Wavelet::Db4 => &DB4,
        }
    }

    /// High-pass filter, the quadrature mirror of the low-pass one.
    pub fn high_pass(&self) -> Vec<f64> {
        let h = self.low_pass();
        let l = h.len();
        (0..l)
            .map(|k| if k % 2 == 0 { h[l - 1 - k] } else { -h[l - 1 - k] })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdMode {
    Hard,
    Soft,
}

impl ThresholdMode {
    fn apply(&self, value: f64, threshold: f64) -> f64 {
        match self {
            ThresholdMode::Hard => {
                if value.abs() > threshold {
                    value
                } else {
                    0.0
                }
            }
            ThresholdMode::Soft => value.signum() * (value.abs() - threshold).max(0.0),
        }
    }
}

/// Whether a row may see data after itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecomposeMode {
    /// Each row is recomputed from its trailing window only.
    Causal,
    /// One pass over the whole series. Label construction only.
    Full,
}

struct Coefficients {
    approx: Vec<f64>,
    // finest level first, each with the length of the signal it came from
    details: Vec<(Vec<f64>, usize)>,
}

/// Wavelet denoiser producing a smoothed price proxy.
#[derive(Debug, Clone)]
pub struct SignalDecomposer {
    wavelet: Wavelet,
    threshold: ThresholdMode,
    window: usize,
}

impl SignalDecomposer {
    pub fn new(wavelet: Wavelet, threshold: ThresholdMode, window: usize) -> Self {
        Self {
            wavelet,
            threshold,
            window: window.max(2),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn decompose(&self, series: &[f64], mode: DecomposeMode) -> Vec<f64> {
        match mode {
            DecomposeMode::Causal => self.causal(series),
            DecomposeMode::Full => self.denoise(series),
        }
    }

    /// Row `i` is the last value of the reconstruction of `series[i+1-window..=i]`.
    /// Rows before the first full window carry the raw input as a placeholder.
    pub fn causal(&self, series: &[f64]) -> Vec<f64> {
        let w = self.window;
        (0..series.len())
            .map(|i| {
                if i + 1 < w {
                    return series[i];
                }
                let rebuilt = self.denoise(&series[i + 1 - w..=i]);
                rebuilt.last().copied().unwrap_or(series[i])
            })
            .collect()
    }

    /// Denoise the whole series at once.
    pub fn denoise(&self, series: &[f64]) -> Vec<f64> {
        let n = series.len();
        if n < 2 || series.iter().any(|v| !v.is_finite()) {
            return series.to_vec();
        }
        let mu = mean(series);
        let sd = (series.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / n as f64).sqrt();
        if sd == 0.0 || !sd.is_finite() {
            return series.to_vec();
        }

        // mirror the window so the periodic boundary joins the series to itself
        let mut extended: Vec<f64> = series.iter().map(|v| (v - mu) / sd).collect();
        extended.extend(series.iter().rev().map(|v| (v - mu) / sd));

        let mut coeffs = self.wavedec(&extended);
        let Some((finest, _)) = coeffs.details.first() else {
            return series.to_vec();
        };
        let sigma = median_abs_deviation(finest) / 0.6745;
        let uthresh = sigma * (2.0 * (n as f64).ln()).sqrt();
        for (detail, _) in coeffs.details.iter_mut() {
            for d in detail.iter_mut() {
                *d = self.threshold.apply(*d, uthresh);
            }
        }

        let rebuilt = self.waverec(coeffs);
        rebuilt.iter().take(n).map(|v| v * sd + mu).collect()
    }

    fn max_level(&self, len: usize) -> usize {
        let filter_len = self.wavelet.low_pass().len();
        if len < filter_len {
            return 0;
        }
        ((len as f64) / (filter_len as f64 - 1.0)).log2().floor().max(0.0) as usize
    }

    fn wavedec(&self, signal: &[f64]) -> Coefficients {
        let h = self.wavelet.low_pass();
        let g = self.wavelet.high_pass();
        let levels = self.max_level(signal.len());

        let mut approx = signal.to_vec();
        let mut details = Vec::new();
        while details.len() < levels && approx.len() >= 2 * h.len() {
            let len = approx.len();
            if len % 2 == 1 {
                approx.push(approx[len - 1]);
            }
            let m = approx.len();
            let half = m / 2;
            let mut a = vec![0.0; half];
            let mut d = vec![0.0; half];
            for i in 0..half {
                for k in 0..h.len() {
                    let x = approx[(2 * i + k) % m];
                    a[i] += h[k] * x;
                    d[i] += g[k] * x;
                }
            }
            details.push((d, len));
            approx = a;
        }
        Coefficients { approx, details }
    }

    fn waverec(&self, coeffs: Coefficients) -> Vec<f64> {
        let h = self.wavelet.low_pass();
        let g = self.wavelet.high_pass();
        let mut approx = coeffs.approx;
        for (d, len) in coeffs.details.into_iter().rev() {
            let m = 2 * approx.len();
            let mut x = vec![0.0; m];
            for i in 0..approx.len() {
                for k in 0..h.len() {
                    x[(2 * i + k) % m] += h[k] * approx[i] + g[k] * d[i];
                }
            }
            x.truncate(len);
            approx = x;
        }
        approx
    }
}

fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

fn median_abs_deviation(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    let centre = median(&mut sorted);
    let mut dev: Vec<f64> = values.iter().map(|v| (v - centre).abs()).collect();
    median(&mut dev)
}

fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let radius = (4.0 * sigma + 0.5) as usize;
    let weights: Vec<f64> = (0..=2 * radius)
        .map(|j| {
            let k = j as f64 - radius as f64;
            (-0.5 * k * k / (sigma * sigma)).exp()
        })
        .collect();
    let total: f64 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

// Symmetric reflection that repeats the edge sample: (c b a | a b c | c b a)
fn reflect_index(mut i: isize, n: isize) -> usize {
    loop {
        if i < 0 {
            i = -i - 1;
        } else if i >= n {
            i = 2 * n - i - 1;
        } else {
            return i as usize;
        }
    }
}

fn gaussian_at(series: &[f64], kernel: &[f64], centre: usize) -> f64 {
    let n = series.len() as isize;
    let radius = (kernel.len() / 2) as isize;
    kernel
        .iter()
        .enumerate()
        .map(|(j, w)| w * series[reflect_index(centre as isize + j as isize - radius, n)])
        .sum()
}

/// One-dimensional Gaussian filter over the whole series (truncated at 4 sigma).
pub fn gaussian_filter(series: &[f64], sigma: f64) -> Vec<f64> {
    if series.is_empty() || sigma <= 0.0 {
        return series.to_vec();
    }
    let kernel = gaussian_kernel(sigma);
    (0..series.len())
        .map(|i| gaussian_at(series, &kernel, i))
        .collect()
}

/// Gaussian filter where row `i` sees at most `window` rows ending at `i`.
pub fn causal_gaussian(series: &[f64], sigma: f64, window: usize) -> Vec<f64> {
    if series.is_empty() || sigma <= 0.0 {
        return series.to_vec();
    }
    let kernel = gaussian_kernel(sigma);
    (0..series.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window.max(1));
            let slice = &series[start..=i];
            gaussian_at(slice, &kernel, slice.len() - 1)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn noisy_sine(n: usize) -> (Vec<f64>, Vec<f64>) {
        let clean: Vec<f64> = (0..n)
            .map(|i| 100.0 + 5.0 * (i as f64 * 2.0 * std::f64::consts::PI / 64.0).sin())
            .collect();
        // deterministic pseudo-noise
        let noisy = clean
            .iter()
            .enumerate()
            .map(|(i, c)| c + 0.8 * ((i as f64 * 12.9898).sin() * 43758.5453).fract())
            .collect();
        (clean, noisy)
    }

    fn rmse(a: &[f64], b: &[f64]) -> f64 {
        (a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f64>() / a.len() as f64).sqrt()
    }

    #[test]
    fn test_filters_are_orthonormal() {
        for wavelet in [Wavelet::Haar, Wavelet::Db2, Wavelet::Db4] {
            let h = wavelet.low_pass();
            let g = wavelet.high_pass();
            let hh: f64 = h.iter().map(|v| v * v).sum();
            let hg: f64 = h.iter().zip(&g).map(|(a, b)| a * b).sum();
            assert!((hh - 1.0).abs() < 1e-10, "{:?}", wavelet);
            assert!(hg.abs() < 1e-10, "{:?}", wavelet);
        }
    }

    #[test]
    fn test_perfect_reconstruction_without_threshold() {
        let dec = SignalDecomposer::new(Wavelet::Db4, ThresholdMode::Hard, 128);
        let (_, noisy) = noisy_sine(203);
        let rebuilt = dec.waverec(dec.wavedec(&noisy));
        assert_eq!(rebuilt.len(), noisy.len());
        for (a, b) in rebuilt.iter().zip(&noisy) {
            assert!((a - b).abs() < 1e-8);
        }
    }

    #[test]
    fn test_denoise_reduces_noise() {
        let dec = SignalDecomposer::new(Wavelet::Db4, ThresholdMode::Hard, 128);
        let (clean, noisy) = noisy_sine(512);
        let out = dec.denoise(&noisy);
        assert_eq!(out.len(), noisy.len());
        assert!(rmse(&out, &clean) < rmse(&noisy, &clean));
    }

    #[test]
    fn test_soft_threshold_shrinks() {
        assert_eq!(ThresholdMode::Soft.apply(3.0, 1.0), 2.0);
        assert_eq!(ThresholdMode::Soft.apply(-0.5, 1.0), 0.0);
        assert_eq!(ThresholdMode::Hard.apply(3.0, 1.0), 3.0);
        assert_eq!(ThresholdMode::Hard.apply(0.5, 1.0), 0.0);
    }

    #[test]
    fn test_constant_series_passes_through() {
        let dec = SignalDecomposer::new(Wavelet::Db4, ThresholdMode::Hard, 32);
        assert_eq!(dec.denoise(&[7.0; 50]), vec![7.0; 50]);
        assert_eq!(dec.causal(&[7.0; 50]), vec![7.0; 50]);
    }

    #[test]
    fn test_causal_warmup_is_finite_placeholder() {
        let dec = SignalDecomposer::new(Wavelet::Db4, ThresholdMode::Hard, 64);
        let (_, noisy) = noisy_sine(100);
        let out = dec.causal(&noisy);
        assert_eq!(&out[..63], &noisy[..63]);
        assert!(out.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_gaussian_filter_preserves_constant_and_mean() {
        let out = gaussian_filter(&[3.0; 20], 2.0);
        for v in out {
            assert!((v - 3.0).abs() < 1e-12);
        }
        let kernel = gaussian_kernel(2.0);
        assert_eq!(kernel.len(), 17);
        assert!((kernel.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_reflect_index() {
        assert_eq!(reflect_index(-1, 5), 0);
        assert_eq!(reflect_index(-2, 5), 1);
        assert_eq!(reflect_index(5, 5), 4);
        assert_eq!(reflect_index(6, 5), 3);
        assert_eq!(reflect_index(-7, 3), 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn causal_output_ignores_future_rows(
            series in prop::collection::vec(50.0f64..150.0, 80..120),
            split in 0usize..70,
            bump in 1.0f64..25.0,
        ) {
            let dec = SignalDecomposer::new(Wavelet::Db4, ThresholdMode::Hard, 48);
            let before = dec.causal(&series);
            let smooth_before = causal_gaussian(&series, 2.0, 48);

            let mut perturbed = series.clone();
            for v in perturbed.iter_mut().skip(split + 1) {
                *v += bump;
            }
            let after = dec.causal(&perturbed);
            let smooth_after = causal_gaussian(&perturbed, 2.0, 48);

            prop_assert_eq!(&before[..=split], &after[..=split]);
            prop_assert_eq!(&smooth_before[..=split], &smooth_after[..=split]);
        }
    }
}
