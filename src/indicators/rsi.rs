use super::{highest, lowest, roc, sma, Indicator};

/// Wilder RSI, updated one price at a time.
#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    avg_gain: Option<f64>,
    avg_loss: Option<f64>,
    prev_price: Option<f64>,
    gains: Vec<f64>,
    losses: Vec<f64>,
    value: Option<f64>,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            avg_gain: None,
            avg_loss: None,
            prev_price: None,
            gains: Vec::with_capacity(period),
            losses: Vec::with_capacity(period),
            value: None,
        }
    }

    pub fn update(&mut self, price: f64) -> Option<f64> {
        if let Some(prev) = self.prev_price {
            let change = price - prev;
            let gain = change.max(0.0);
            let loss = (-change).max(0.0);

            if self.gains.len() < self.period {
                self.gains.push(gain);
                self.losses.push(loss);

                if self.gains.len() == self.period {
                    self.avg_gain = Some(self.gains.iter().sum::<f64>() / self.period as f64);
                    self.avg_loss = Some(self.losses.iter().sum::<f64>() / self.period as f64);
                    self.value = self.calculate_rsi();
                }
            } else if let (Some(avg_gain), Some(avg_loss)) = (self.avg_gain, self.avg_loss) {
                let p = self.period as f64;
                self.avg_gain = Some((avg_gain * (p - 1.0) + gain) / p);
                self.avg_loss = Some((avg_loss * (p - 1.0) + loss) / p);
                self.value = self.calculate_rsi();
            }
        }

        self.prev_price = Some(price);
        self.value
    }

    fn calculate_rsi(&self) -> Option<f64> {
        match (self.avg_gain, self.avg_loss) {
            (Some(gain), Some(loss)) => {
                if loss == 0.0 {
                    if gain == 0.0 {
                        Some(50.0)
                    } else {
                        Some(100.0)
                    }
                } else {
                    Some(100.0 - 100.0 / (1.0 + gain / loss))
                }
            }
            _ => None,
        }
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }
}

impl Indicator for Rsi {
    fn is_ready(&self) -> bool {
        self.value.is_some()
    }

    fn reset(&mut self) {
        self.avg_gain = None;
        self.avg_loss = None;
        self.prev_price = None;
        self.gains.clear();
        self.losses.clear();
        self.value = None;
    }
}

pub fn rsi(prices: &[f64], period: usize) -> Vec<f64> {
    let mut state = Rsi::new(period.max(1));
    prices
        .iter()
        .map(|&p| {
            if p.is_nan() {
                return f64::NAN;
            }
            state.update(p).unwrap_or(f64::NAN)
        })
        .collect()
}

/// Stochastic of an RSI series, returning smoothed (%K, %D) on a 0-100 scale.
pub fn stoch_rsi(rsi: &[f64], period: usize, smooth_k: usize, smooth_d: usize) -> (Vec<f64>, Vec<f64>) {
    let lo = lowest(rsi, period);
    let hi = highest(rsi, period);
    let raw: Vec<f64> = rsi
        .iter()
        .zip(lo.iter().zip(&hi))
        .map(|(r, (l, h))| (r - l) / (h - l))
        .collect();
    let k: Vec<f64> = sma(&raw, smooth_k).iter().map(|v| v * 100.0).collect();
    let d = sma(&k, smooth_d);
    (k, d)
}

/// Inverse Fisher transform of RSI, bounded to (-1, 1).
pub fn fisher_rsi(rsi: &[f64]) -> Vec<f64> {
    rsi.iter()
        .map(|r| {
            let x = 0.1 * (r - 50.0);
            ((2.0 * x).exp() - 1.0) / ((2.0 * x).exp() + 1.0)
        })
        .collect()
}

/// Connors RSI (3, 2, 100).
pub fn connors_rsi(close: &[f64]) -> Vec<f64> {
    let updown: Vec<f64> = std::iter::once(-1.0)
        .chain(close.windows(2).map(|w| if w[1] / w[0] > 1.0 { 1.0 } else { -1.0 }))
        .take(close.len())
        .collect();
    let r3 = rsi(close, 3);
    let r2 = rsi(&updown, 2);
    let r100 = roc(close, 100);
    r3.iter()
        .zip(r2.iter().zip(&r100))
        .map(|(a, (b, c))| (a + b + c) / 3.0)
        .collect()
}
