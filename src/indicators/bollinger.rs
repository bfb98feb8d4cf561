use super::{highest, lowest, rolling_std, sma, tema};

#[derive(Debug, Clone)]
pub struct Bands {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

impl Bands {
    /// Band width relative to the middle line.
    pub fn width(&self) -> Vec<f64> {
        self.upper
            .iter()
            .zip(&self.lower)
            .zip(&self.middle)
            .map(|((u, l), m)| (u - l) / m)
            .collect()
    }
}

pub fn bollinger_bands(prices: &[f64], period: usize, std_dev: f64) -> Bands {
    let middle = sma(prices, period);
    let std = rolling_std(prices, period);
    let upper = middle.iter().zip(&std).map(|(m, s)| m + std_dev * s).collect();
    let lower = middle.iter().zip(&std).map(|(m, s)| m - std_dev * s).collect();
    Bands { upper, middle, lower }
}

/// Donchian channel; the mid line is a TEMA of the channel centre.
pub fn donchian(high: &[f64], low: &[f64], period: usize) -> Bands {
    let upper = highest(high, period);
    let lower = lowest(low, period);
    let centre: Vec<f64> = upper.iter().zip(&lower).map(|(u, l)| (u + l) / 2.0).collect();
    Bands {
        middle: tema(&centre, period),
        upper,
        lower,
    }
}

/// Percentage high/low range over the trailing window.
pub fn range_percent_change(high: &[f64], low: &[f64], period: usize) -> Vec<f64> {
    let hh = highest(high, period);
    let ll = lowest(low, period);
    hh.iter().zip(&ll).map(|(h, l)| (h - l) / l).collect()
}
