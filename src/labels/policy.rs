use std::fmt;

use crate::error::Result;
use crate::types::FeatureFrame;

/// Turns the detached label frame into binary training targets.
///
/// Implementations read columns computed by [`LabelBuilder`](super::LabelBuilder)
/// (`full_decomposed`, `future_min`, `future_max`, ...) alongside the regular
/// indicator columns.
pub trait LabelPolicy: Send + Sync + fmt::Debug {
    fn entries(&self, frame: &FeatureFrame) -> Result<Vec<f64>>;

    fn exits(&self, frame: &FeatureFrame) -> Result<Vec<f64>>;

    fn name(&self) -> &'static str;
}

/// Oversold money flow at the bottom of the forward window marks an entry,
/// overbought money flow at its top marks an exit.
#[derive(Debug, Clone)]
pub struct DefaultLabelPolicy {
    pub oversold_mfi: f64,
    pub overbought_mfi: f64,
}

impl Default for DefaultLabelPolicy {
    fn default() -> Self {
        Self {
            oversold_mfi: 20.0,
            overbought_mfi: 80.0,
        }
    }
}

impl LabelPolicy for DefaultLabelPolicy {
    fn entries(&self, frame: &FeatureFrame) -> Result<Vec<f64>> {
        let mfi = frame.column("mfi")?;
        let price = frame.column("full_decomposed")?;
        let floor = frame.column("future_min")?;
        Ok((0..frame.len())
            .map(|i| flag(mfi[i] <= self.oversold_mfi && price[i] <= floor[i]))
            .collect())
    }

    fn exits(&self, frame: &FeatureFrame) -> Result<Vec<f64>> {
        let mfi = frame.column("mfi")?;
        let price = frame.column("full_decomposed")?;
        let ceiling = frame.column("future_max")?;
        Ok((0..frame.len())
            .map(|i| flag(mfi[i] >= self.overbought_mfi && price[i] >= ceiling[i]))
            .collect())
    }

    fn name(&self) -> &'static str {
        "mfi_extremes"
    }
}

// NaN comparisons are false, so rows without a full forward window stay 0
fn flag(condition: bool) -> f64 {
    if condition {
        1.0
    } else {
        0.0
    }
}
