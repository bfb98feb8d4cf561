use super::{highest, lowest, rolling, rolling_sum, sma};

/// Williams %R on a -100..0 scale.
pub fn williams_r(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    let hh = highest(high, period);
    let ll = lowest(low, period);
    (0..close.len())
        .map(|i| -100.0 * (hh[i] - close[i]) / (hh[i] - ll[i]))
        .collect()
}

/// Fast stochastic, returning (%K, %D).
pub fn stoch_fast(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    k_period: usize,
    d_period: usize,
) -> (Vec<f64>, Vec<f64>) {
    let hh = highest(high, k_period);
    let ll = lowest(low, k_period);
    let k: Vec<f64> = (0..close.len())
        .map(|i| 100.0 * (close[i] - ll[i]) / (hh[i] - ll[i]))
        .collect();
    let d = sma(&k, d_period);
    (k, d)
}

/// Ultimate oscillator over 7/14/28 bars.
pub fn ultimate_oscillator(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    let n = close.len();
    let mut bp = vec![f64::NAN; n];
    let mut tr = vec![f64::NAN; n];
    for i in 1..n {
        let floor = low[i].min(close[i - 1]);
        let ceil = high[i].max(close[i - 1]);
        bp[i] = close[i] - floor;
        tr[i] = ceil - floor;
    }
    let avg = |period: usize| -> Vec<f64> {
        let b = rolling_sum(&bp, period);
        let t = rolling_sum(&tr, period);
        b.iter().zip(&t).map(|(b, t)| b / t).collect()
    };
    let (a7, a14, a28) = (avg(7), avg(14), avg(28));
    (0..n)
        .map(|i| 100.0 * (4.0 * a7[i] + 2.0 * a14[i] + a28[i]) / 7.0)
        .collect()
}

#[derive(Debug, Clone)]
pub struct Aroon {
    pub up: Vec<f64>,
    pub down: Vec<f64>,
}

impl Aroon {
    pub fn oscillator(&self) -> Vec<f64> {
        self.up.iter().zip(&self.down).map(|(u, d)| u - d).collect()
    }
}

pub fn aroon(high: &[f64], low: &[f64], period: usize) -> Aroon {
    let p = period as f64;
    // bars since the extreme within the last period + 1 bars
    let since = |w: &[f64], pick_max: bool| -> f64 {
        let mut best = 0;
        for (j, v) in w.iter().enumerate() {
            let better = if pick_max { *v >= w[best] } else { *v <= w[best] };
            if better {
                best = j;
            }
        }
        (w.len() - 1 - best) as f64
    };
    let up = rolling(high, period + 1, |w| 100.0 * (p - since(w, true)) / p);
    let down = rolling(low, period + 1, |w| 100.0 * (p - since(w, false)) / p);
    Aroon { up, down }
}

/// Awesome oscillator: SMA(5) - SMA(34) of the median price.
pub fn awesome_oscillator(high: &[f64], low: &[f64]) -> Vec<f64> {
    let median: Vec<f64> = high.iter().zip(low).map(|(h, l)| (h + l) / 2.0).collect();
    let fast = sma(&median, 5);
    let slow = sma(&median, 34);
    fast.iter().zip(&slow).map(|(f, s)| f - s).collect()
}

/// Commodity channel index on the typical price.
pub fn cci(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    let tp: Vec<f64> = (0..close.len())
        .map(|i| (high[i] + low[i] + close[i]) / 3.0)
        .collect();
    rolling(&tp, period, |w| {
        let m = w.iter().sum::<f64>() / w.len() as f64;
        let mad = w.iter().map(|v| (v - m).abs()).sum::<f64>() / w.len() as f64;
        let last = w[w.len() - 1];
        (last - m) / (0.015 * mad)
    })
}
