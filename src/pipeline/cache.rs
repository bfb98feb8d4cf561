use std::collections::HashMap;
use std::fmt;

use super::record::ModelRecord;

/// Owned map from instrument to its model record.
#[derive(Debug, Clone, Default)]
pub struct ModelCache {
    records: HashMap<String, ModelRecord>,
}

impl ModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, pair: &str) -> Option<&ModelRecord> {
        self.records.get(pair)
    }

    /// Record for `pair`, created uninitialized on first use.
    pub fn entry(&mut self, pair: &str) -> &mut ModelRecord {
        self.records.entry(pair.to_string()).or_default()
    }

    /// Move a record out so a worker can own it while processing.
    pub fn take(&mut self, pair: &str) -> ModelRecord {
        self.records.remove(pair).unwrap_or_default()
    }

    pub fn insert(&mut self, pair: impl Into<String>, record: ModelRecord) {
        self.records.insert(pair.into(), record);
    }

    pub fn remove(&mut self, pair: &str) -> Option<ModelRecord> {
        self.records.remove(pair)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Instrument names in sorted order.
    pub fn pairs(&self) -> Vec<&str> {
        let mut pairs: Vec<&str> = self.records.keys().map(String::as_str).collect();
        pairs.sort_unstable();
        pairs
    }
}

impl fmt::Display for ModelCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Model information")?;
        writeln!(
            f,
            "{:<14} {:<14} {:>4} {:<20} {:<20} {:>5} {:>6}",
            "Pair", "State", "Dim", "Entry Classifier", "Exit Classifier", "Fits", "Aborts"
        )?;
        writeln!(f, "{}", "-".repeat(89))?;
        for pair in self.pairs() {
            let Some(record) = self.records.get(pair) else {
                continue;
            };
            writeln!(
                f,
                "{:<14} {:<14} {:>4} {:<20} {:<20} {:>5} {:>6}",
                pair,
                record.state().to_string(),
                record.dim(),
                record.entry_name(),
                record.exit_name(),
                record.fits(),
                record.aborts()
            )?;
        }
        Ok(())
    }
}
