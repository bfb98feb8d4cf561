use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use crate::error::Target;
use crate::ml::classifiers::ClassifierKind;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LedgerEntry {
    pub trials: usize,
    pub mean_f1: f64,
    pub selected: usize,
}

type Table = HashMap<Target, HashMap<ClassifierKind, LedgerEntry>>;

/// Running classifier scores across instruments and cycles. Reporting only;
/// predictions never depend on it.
#[derive(Debug, Default)]
pub struct ClassifierLedger {
    entries: Mutex<Table>,
}

impl ClassifierLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut Table) -> R) -> R {
        // counters stay usable even if a worker panicked mid-update
        let mut guard = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    pub fn record_score(&self, target: Target, kind: ClassifierKind, score: f64) {
        self.with(|table| {
            let entry = table.entry(target).or_default().entry(kind).or_default();
            entry.mean_f1 = (entry.mean_f1 * entry.trials as f64 + score) / (entry.trials + 1) as f64;
            entry.trials += 1;
        });
    }

    pub fn record_selection(&self, target: Target, kind: ClassifierKind) {
        self.with(|table| {
            table.entry(target).or_default().entry(kind).or_default().selected += 1;
        });
    }

    pub fn get(&self, target: Target, kind: ClassifierKind) -> Option<LedgerEntry> {
        self.with(|table| table.get(&target).and_then(|m| m.get(&kind)).copied())
    }

    /// Entries for one target, most selected first, then by mean score.
    pub fn ranking(&self, target: Target) -> Vec<(ClassifierKind, LedgerEntry)> {
        let mut rows: Vec<(ClassifierKind, LedgerEntry)> = self.with(|table| {
            table
                .get(&target)
                .map(|m| m.iter().map(|(k, e)| (*k, *e)).collect())
                .unwrap_or_default()
        });
        rows.sort_by(|a, b| {
            b.1.selected
                .cmp(&a.1.selected)
                .then(b.1.mean_f1.total_cmp(&a.1.mean_f1))
        });
        rows
    }

    pub fn is_empty(&self) -> bool {
        self.with(|table| table.values().all(|m| m.is_empty()))
    }
}

impl fmt::Display for ClassifierLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for target in [Target::Entry, Target::Exit] {
            let rows = self.ranking(target);
            if rows.is_empty() {
                continue;
            }
            writeln!(f, "Classifier statistics ({})", target)?;
            writeln!(f, "{:<20} {:>8} {:>8} {:>9}", "Classifier", "Mean F1", "Trials", "Selected")?;
            writeln!(f, "{}", "-".repeat(48))?;
            for (kind, entry) in rows {
                writeln!(
                    f,
                    "{:<20} {:>8.3} {:>8} {:>9}",
                    kind.name(),
                    entry.mean_f1,
                    entry.trials,
                    entry.selected
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_running_mean_and_selection() {
        let ledger = ClassifierLedger::new();
        ledger.record_score(Target::Entry, ClassifierKind::Lda, 0.6);
        ledger.record_score(Target::Entry, ClassifierKind::Lda, 0.8);
        ledger.record_selection(Target::Entry, ClassifierKind::Lda);

        let entry = ledger.get(Target::Entry, ClassifierKind::Lda).unwrap();
        assert_eq!(entry.trials, 2);
        assert!((entry.mean_f1 - 0.7).abs() < 1e-12);
        assert_eq!(entry.selected, 1);
        assert!(ledger.get(Target::Exit, ClassifierKind::Lda).is_none());
    }

    #[test]
    fn test_ranking_prefers_selected_then_score() {
        let ledger = ClassifierLedger::new();
        ledger.record_score(Target::Exit, ClassifierKind::Sgd, 0.9);
        ledger.record_score(Target::Exit, ClassifierKind::GaussianNb, 0.5);
        ledger.record_score(Target::Exit, ClassifierKind::AdaBoost, 0.7);
        ledger.record_selection(Target::Exit, ClassifierKind::GaussianNb);

        let order: Vec<ClassifierKind> = ledger.ranking(Target::Exit).into_iter().map(|(k, _)| k).collect();
        assert_eq!(
            order,
            vec![ClassifierKind::GaussianNb, ClassifierKind::Sgd, ClassifierKind::AdaBoost]
        );
        assert!(ledger.to_string().contains("GaussianNB"));
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let ledger = Arc::new(ClassifierLedger::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        ledger.record_score(Target::Entry, ClassifierKind::XgBoost, 1.0);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(ledger.get(Target::Entry, ClassifierKind::XgBoost).unwrap().trials, 1000);
    }
}
