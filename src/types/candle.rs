use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    pub fn median_price(&self) -> f64 {
        (self.high + self.low) / 2.0
    }
}

/// Time-ordered OHLCV candles for a single instrument. Immutable once built;
/// the pipeline only ever reads from it.
#[derive(Debug, Clone, Default)]
pub struct CandleSeries {
    candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn new(candles: Vec<Candle>) -> Result<Self> {
        if let Some(pos) = candles
            .windows(2)
            .position(|w| w[1].timestamp < w[0].timestamp)
        {
            return Err(PipelineError::InvalidConfig(format!(
                "candles out of order at index {}",
                pos + 1
            )));
        }
        Ok(Self { candles })
    }

    /// Parse a JSON array of candles
    pub fn from_json(json: &str) -> Result<Self> {
        let candles: Vec<Candle> = serde_json::from_str(json)?;
        Self::new(candles)
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    /// The first `n` candles, used to replay a series window by window
    pub fn head(&self, n: usize) -> CandleSeries {
        CandleSeries {
            candles: self.candles[..n.min(self.candles.len())].to_vec(),
        }
    }

    pub fn opens(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.open).collect()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    pub fn highs(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.high).collect()
    }

    pub fn lows(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.low).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.volume).collect()
    }

    pub fn typical_prices(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.typical_price()).collect()
    }

    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.candles.iter().map(|c| c.timestamp).collect()
    }

    /// Seeded sine wave around 100 with multiplicative noise, 5 minute
    /// candles. `amplitude` and `noise` are fractions of the base price.
    pub fn synthetic_sine(n: usize, period: f64, amplitude: f64, noise: f64, seed: u64) -> CandleSeries {
        let mut rng = StdRng::seed_from_u64(seed);
        let start = Utc
            .with_ymd_and_hms(2022, 3, 1, 0, 0, 0)
            .single()
            .unwrap_or_default();
        let mut prev_close = 100.0_f64;
        let mut candles = Vec::with_capacity(n);
        for i in 0..n {
            let phase = 2.0 * std::f64::consts::PI * i as f64 / period;
            let base = 100.0 * (1.0 + amplitude * phase.sin());
            let close = base * (1.0 + noise * (rng.gen::<f64>() - 0.5));
            let open = prev_close;
            let high = open.max(close) * (1.0 + noise * rng.gen::<f64>() * 0.5);
            let low = open.min(close) * (1.0 - noise * rng.gen::<f64>() * 0.5);
            let volume = 1000.0 + 500.0 * rng.gen::<f64>();
            candles.push(Candle {
                timestamp: start + Duration::minutes(5 * i as i64),
                open,
                high,
                low,
                close,
                volume,
            });
            prev_close = close;
        }
        CandleSeries { candles }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn sine_series(n: usize, period: f64, amplitude: f64, noise: f64, seed: u64) -> CandleSeries {
        CandleSeries::synthetic_sine(n, period, amplitude, noise, seed)
    }
}
