use ndarray::{Array2, Axis};
use tracing::{debug, info, warn};

use crate::config::ModelSettings;
use crate::error::{Result, Target};
use crate::ml::classifiers::{BinaryClassifier, ClassifierKind};
use crate::ml::ledger::ClassifierLedger;
use crate::ml::metrics::macro_f1;
use crate::ml::sampling::{pick, positives, train_test_split};

/// How a classifier is chosen on the first fit of a record.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionStrategy {
    /// Fit one configured algorithm on all training rows.
    Fixed(ClassifierKind),
    /// Fit every candidate on a seeded 80% split and keep the best macro F1
    /// on the held-out 20%.
    Scan(Vec<ClassifierKind>),
}

/// First fit versus refit of an existing classifier.
#[derive(Debug)]
pub enum FitProtocol {
    Select,
    WarmRefit(Box<dyn BinaryClassifier>),
}

/// Result of a selection: `(None, "")` means skip predictions this cycle.
pub type Selection = (Option<Box<dyn BinaryClassifier>>, String);

#[derive(Debug, Clone)]
pub struct ClassifierSelector {
    strategy: SelectionStrategy,
    min_f1: f64,
    seed: u64,
    scan_every_cycle: bool,
}

impl ClassifierSelector {
    pub fn new(strategy: SelectionStrategy, min_f1: f64, seed: u64) -> Self {
        Self {
            strategy,
            min_f1,
            seed,
            scan_every_cycle: false,
        }
    }

    /// Build from settings, failing fast on unknown algorithm names.
    pub fn from_settings(settings: &ModelSettings) -> Result<Self> {
        let strategy = if settings.dbg_scan_classifiers {
            let candidates = settings
                .scan_candidates
                .iter()
                .map(|name| ClassifierKind::parse(name))
                .collect::<Result<Vec<_>>>()?;
            SelectionStrategy::Scan(candidates)
        } else {
            SelectionStrategy::Fixed(ClassifierKind::parse(&settings.default_classifier)?)
        };
        Ok(Self {
            strategy,
            min_f1: settings.min_f1_score,
            seed: settings.random_seed,
            scan_every_cycle: settings.scan_every_cycle,
        })
    }

    pub fn strategy(&self) -> &SelectionStrategy {
        &self.strategy
    }

    /// Pick and fit a classifier for one target.
    pub fn get(&self, x: &Array2<f64>, labels: &[f64], target: Target, ledger: &ClassifierLedger) -> Result<Selection> {
        let count = positives(labels);
        if count <= 2 {
            warn!("Insufficient positive results in {} data ({})", target, count);
            return Ok((None, String::new()));
        }
        match &self.strategy {
            SelectionStrategy::Fixed(kind) => {
                let mut clf = kind.build();
                clf.fit(x, labels)?;
                Ok((Some(clf), kind.name().to_string()))
            }
            SelectionStrategy::Scan(candidates) => self.scan(candidates, x, labels, target, ledger),
        }
    }

    /// Refit the existing classifier with fresh weights, or select a new one.
    pub fn fit(
        &self,
        protocol: FitProtocol,
        x: &Array2<f64>,
        labels: &[f64],
        target: Target,
        ledger: &ClassifierLedger,
    ) -> Result<Selection> {
        match protocol {
            FitProtocol::WarmRefit(mut clf) if !self.scan_every_cycle => {
                let count = positives(labels);
                if count <= 2 {
                    warn!("Insufficient positive results in {} data ({})", target, count);
                    return Ok((None, String::new()));
                }
                debug!("Refitting {} classifier {}", target, clf.kind());
                clf.fit(x, labels)?;
                let name = clf.kind().name().to_string();
                Ok((Some(clf), name))
            }
            _ => self.get(x, labels, target, ledger),
        }
    }

    fn scan(
        &self,
        candidates: &[ClassifierKind],
        x: &Array2<f64>,
        labels: &[f64],
        target: Target,
        ledger: &ClassifierLedger,
    ) -> Result<Selection> {
        let (train, test) = train_test_split(labels.len(), 0.8, self.seed);
        let train_y = pick(labels, &train);
        let test_y = pick(labels, &test);

        if positives(&train_y) < 2 {
            warn!("Insufficient positive (train) {} results to fit: {}", target, positives(&train_y));
            return Ok((None, String::new()));
        }
        if positives(&test_y) < 2 {
            warn!("Insufficient positive (test) {} results: {}", target, positives(&test_y));
            return Ok((None, String::new()));
        }

        let train_x = x.select(Axis(0), &train);
        let test_x = x.select(Axis(0), &test);

        let mut best: Option<(f64, Box<dyn BinaryClassifier>)> = None;
        for kind in candidates {
            let mut clf = kind.build();
            clf.fit(&train_x, &train_y)?;
            let predicted = clf.predict(&test_x)?.to_vec();
            let score = macro_f1(&test_y, &predicted);
            debug!("      {:<20}: {:.3}", kind.name(), score);
            ledger.record_score(target, *kind, score);

            if best.as_ref().map_or(true, |(s, _)| score > *s) {
                best = Some((score, clf));
            }
        }

        let Some((score, clf)) = best.filter(|(s, _)| *s > 0.0) else {
            warn!("No {} classifier found", target);
            return Ok((None, String::new()));
        };
        if score < self.min_f1 {
            warn!("{} F1 score below threshold ({:.3} < {:.3})", target, score, self.min_f1);
            return Ok((None, String::new()));
        }

        let kind = clf.kind();
        ledger.record_selection(target, kind);
        info!("{} model selected: {} Score:{:.3}", target, kind.name(), score);
        Ok((Some(clf), kind.name().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::classifiers::fixtures::blobs;

    fn scan_all(min_f1: f64) -> ClassifierSelector {
        ClassifierSelector::new(SelectionStrategy::Scan(ClassifierKind::ALL.to_vec()), min_f1, 27)
    }

    #[test]
    fn test_too_few_positives_returns_nothing() {
        let x = Array2::zeros((5, 2));
        let labels = [0.0, 0.0, 0.0, 0.0, 1.0];
        let ledger = ClassifierLedger::new();
        for selector in [
            ClassifierSelector::new(SelectionStrategy::Fixed(ClassifierKind::Lda), 0.7, 27),
            scan_all(0.7),
        ] {
            let (clf, name) = selector.get(&x, &labels, Target::Entry, &ledger).unwrap();
            assert!(clf.is_none());
            assert_eq!(name, "");
        }
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_fixed_strategy_fits_default() {
        let (x, y) = blobs(200, 3, 4.0, 0.3, 1);
        let selector = ClassifierSelector::new(SelectionStrategy::Fixed(ClassifierKind::Lda), 0.7, 27);
        let ledger = ClassifierLedger::new();
        let (clf, name) = selector.get(&x, &y, Target::Entry, &ledger).unwrap();
        assert_eq!(clf.unwrap().kind(), ClassifierKind::Lda);
        assert_eq!(name, "LDA");
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_scan_records_every_candidate() {
        let (x, y) = blobs(400, 3, 4.0, 0.3, 2);
        let ledger = ClassifierLedger::new();
        let (clf, name) = scan_all(0.7).get(&x, &y, Target::Exit, &ledger).unwrap();
        assert!(clf.is_some());
        assert!(ClassifierKind::lookup(&name).is_some());

        let ranking = ledger.ranking(Target::Exit);
        assert_eq!(ranking.len(), ClassifierKind::ALL.len());
        assert!(ranking.iter().all(|(_, e)| e.trials == 1));
        assert_eq!(ranking.iter().map(|(_, e)| e.selected).sum::<usize>(), 1);
        assert_eq!(ranking[0].0.name(), name);
    }

    #[test]
    fn test_scan_rejects_below_floor() {
        // indistinguishable classes
        let (x, y) = blobs(400, 3, 0.0, 0.3, 3);
        let ledger = ClassifierLedger::new();
        let (clf, name) = scan_all(0.99).get(&x, &y, Target::Entry, &ledger).unwrap();
        assert!(clf.is_none());
        assert_eq!(name, "");
        assert_eq!(ledger.ranking(Target::Entry).len(), ClassifierKind::ALL.len());
        assert!(ledger.ranking(Target::Entry).iter().all(|(_, e)| e.selected == 0));
    }

    #[test]
    fn test_warm_refit_keeps_algorithm() {
        let (x, y) = blobs(200, 2, 4.0, 0.4, 4);
        let ledger = ClassifierLedger::new();
        let selector = ClassifierSelector::new(SelectionStrategy::Fixed(ClassifierKind::Lda), 0.7, 27);
        let mut existing = ClassifierKind::GaussianNb.build();
        existing.fit(&x, &y).unwrap();

        let (clf, name) = selector
            .fit(FitProtocol::WarmRefit(existing), &x, &y, Target::Entry, &ledger)
            .unwrap();
        assert_eq!(clf.unwrap().kind(), ClassifierKind::GaussianNb);
        assert_eq!(name, "GaussianNB");
    }

    #[test]
    fn test_unknown_names_fail_fast() {
        let mut settings = ModelSettings::default();
        settings.default_classifier = "Perceptron".to_string();
        assert!(ClassifierSelector::from_settings(&settings).is_err());

        settings.default_classifier = "LDA".to_string();
        settings.dbg_scan_classifiers = true;
        settings.scan_candidates = vec!["LDA".to_string(), "MLP".to_string()];
        assert!(ClassifierSelector::from_settings(&settings).is_err());
    }
}
