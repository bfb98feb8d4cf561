use crate::error::Result;
use crate::indicators::crossed_above;
use crate::types::FeatureFrame;

pub const ENTRY_TAG: &str = "pca_entry ";
pub const EXIT_TAG: &str = "pca_exit ";

/// Entry/exit decisions derived from a populated frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleSignals {
    pub entry: Vec<bool>,
    pub exit: Vec<bool>,
    pub entry_tag: Vec<String>,
    pub exit_tag: Vec<String>,
}

impl RuleSignals {
    pub fn entry_count(&self) -> usize {
        self.entry.iter().filter(|e| **e).count()
    }

    pub fn exit_count(&self) -> usize {
        self.exit.iter().filter(|e| **e).count()
    }
}

/// Consumer-side rules turning prediction scores into trade decisions.
#[derive(Debug, Clone)]
pub struct SignalRules {
    pub entry_mfi: f64,
    pub exit_mfi: f64,
    pub threshold: f64,
}

impl Default for SignalRules {
    fn default() -> Self {
        Self {
            entry_mfi: 30.0,
            exit_mfi: 70.0,
            threshold: 0.5,
        }
    }
}

impl SignalRules {
    /// Evaluate the rules and append `entry` / `exit` columns (1.0 or 0.0).
    pub fn apply(&self, frame: &mut FeatureFrame) -> Result<RuleSignals> {
        let volume = frame.column("volume")?;
        let mfi = frame.column("mfi")?;
        let close = frame.column("close")?;
        let tema = frame.column("tema")?;
        let level = vec![self.threshold; frame.len()];
        let entry_cross = crossed_above(frame.column("predict_entry")?, &level);
        let exit_cross = crossed_above(frame.column("predict_exit")?, &level);

        let tag = |cross: &[bool], text: &str| -> Vec<String> {
            cross
                .iter()
                .map(|c| if *c { text.to_string() } else { String::new() })
                .collect()
        };

        let mut signals = RuleSignals {
            entry: Vec::with_capacity(frame.len()),
            exit: Vec::with_capacity(frame.len()),
            entry_tag: tag(&entry_cross, ENTRY_TAG),
            exit_tag: tag(&exit_cross, EXIT_TAG),
        };
        for i in 0..frame.len() {
            let traded = volume[i] > 0.0;
            signals
                .entry
                .push(traded && mfi[i] < self.entry_mfi && close[i] < tema[i] && entry_cross[i]);
            signals
                .exit
                .push(traded && mfi[i] > self.exit_mfi && close[i] > tema[i] && exit_cross[i]);
        }

        let as_column = |flags: &[bool]| -> Vec<f64> { flags.iter().map(|f| if *f { 1.0 } else { 0.0 }).collect() };
        frame.insert("entry", as_column(&signals.entry))?;
        frame.insert("exit", as_column(&signals.exit))?;
        Ok(signals)
    }
}
