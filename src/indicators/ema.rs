use super::Indicator;

/// Exponential moving average seeded with the simple average of the first
/// `period` values.
#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    multiplier: f64,
    value: Option<f64>,
    count: usize,
    sum: f64,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            multiplier: 2.0 / (period as f64 + 1.0),
            value: None,
            count: 0,
            sum: 0.0,
        }
    }

    pub fn update(&mut self, price: f64) -> Option<f64> {
        self.count += 1;

        if self.count < self.period {
            self.sum += price;
            return None;
        } else if self.count == self.period {
            self.sum += price;
            self.value = Some(self.sum / self.period as f64);
            return self.value;
        }

        if let Some(prev) = self.value {
            self.value = Some((price - prev) * self.multiplier + prev);
        }
        self.value
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

impl Indicator for Ema {
    fn is_ready(&self) -> bool {
        self.value.is_some()
    }

    fn reset(&mut self) {
        self.value = None;
        self.count = 0;
        self.sum = 0.0;
    }
}

/// EMA over a series. Leading NaNs are skipped before seeding so chained
/// averages (TEMA, MACD signal) line up with their inputs.
pub fn ema(prices: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; prices.len()];
    let mut state = Ema::new(period.max(1));
    for (i, &p) in prices.iter().enumerate() {
        if p.is_nan() {
            if state.is_ready() {
                state.reset();
            }
            continue;
        }
        if let Some(v) = state.update(p) {
            out[i] = v;
        }
    }
    out
}

/// Triple exponential moving average.
pub fn tema(prices: &[f64], period: usize) -> Vec<f64> {
    let e1 = ema(prices, period);
    let e2 = ema(&e1, period);
    let e3 = ema(&e2, period);
    e1.iter()
        .zip(&e2)
        .zip(&e3)
        .map(|((a, b), c)| 3.0 * a - 3.0 * b + c)
        .collect()
}

/// Elliott wave oscillator: EMA spread as a percentage of price.
pub fn ewo(close: &[f64], fast: usize, slow: usize) -> Vec<f64> {
    let f = ema(close, fast);
    let s = ema(close, slow);
    close
        .iter()
        .zip(f.iter().zip(&s))
        .map(|(c, (f, s))| (f - s) / c * 100.0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ema_seed_and_update() {
        let mut e = Ema::new(3);
        assert_eq!(e.update(1.0), None);
        assert_eq!(e.update(2.0), None);
        assert_eq!(e.update(3.0), Some(2.0));
        assert_eq!(e.update(4.0), Some(3.0));
        e.reset();
        assert!(!e.is_ready());
    }

    #[test]
    fn test_ema_series_is_aligned() {
        let out = ema(&[1.0, 2.0, 3.0, 4.0], 3);
        assert!(out[1].is_nan());
        assert_eq!(out[2], 2.0);
        assert_eq!(out[3], 3.0);
    }

    #[test]
    fn test_tema_tracks_constant_series() {
        let out = tema(&[5.0; 40], 5);
        assert!(out[12].is_finite());
        assert!((out[39] - 5.0).abs() < 1e-12);
        assert!(out[11].is_nan());
    }
}
