use std::fmt;

/// Precision, recall and F1 for one class of a binary problem.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassScore {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

fn class_score(truth: &[f64], predicted: &[f64], class: bool) -> ClassScore {
    let (mut tp, mut fp, mut fn_) = (0usize, 0usize, 0usize);
    for (t, p) in truth.iter().zip(predicted) {
        let t = (*t > 0.5) == class;
        let p = (*p > 0.5) == class;
        match (t, p) {
            (true, true) => tp += 1,
            (false, true) => fp += 1,
            (true, false) => fn_ += 1,
            _ => {}
        }
    }
    let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };
    ClassScore {
        precision,
        recall,
        f1,
        support: tp + fn_,
    }
}

/// Unweighted mean of the per-class F1 scores.
pub fn macro_f1(truth: &[f64], predicted: &[f64]) -> f64 {
    let negative = class_score(truth, predicted, false);
    let positive = class_score(truth, predicted, true);
    (negative.f1 + positive.f1) / 2.0
}

#[derive(Debug, Clone)]
pub struct ClassificationReport {
    pub negative: ClassScore,
    pub positive: ClassScore,
    pub accuracy: f64,
}

impl ClassificationReport {
    pub fn new(truth: &[f64], predicted: &[f64]) -> Self {
        let correct = truth
            .iter()
            .zip(predicted)
            .filter(|(t, p)| (**t > 0.5) == (**p > 0.5))
            .count();
        Self {
            negative: class_score(truth, predicted, false),
            positive: class_score(truth, predicted, true),
            accuracy: if truth.is_empty() { 0.0 } else { correct as f64 / truth.len() as f64 },
        }
    }

    pub fn macro_f1(&self) -> f64 {
        (self.negative.f1 + self.positive.f1) / 2.0
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>12} {:>9} {:>9} {:>9} {:>9}", "", "precision", "recall", "f1-score", "support")?;
        for (label, s) in [("0", &self.negative), ("1", &self.positive)] {
            writeln!(
                f,
                "{:>12} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                label, s.precision, s.recall, s.f1, s.support
            )?;
        }
        let total = self.negative.support + self.positive.support;
        writeln!(f, "{:>12} {:>9} {:>9} {:>9.2} {:>9}", "accuracy", "", "", self.accuracy, total)?;
        write!(
            f,
            "{:>12} {:>9.2} {:>9.2} {:>9.2} {:>9}",
            "macro avg",
            (self.negative.precision + self.positive.precision) / 2.0,
            (self.negative.recall + self.positive.recall) / 2.0,
            self.macro_f1(),
            total
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macro_f1() {
        let truth = [1.0, 1.0, 0.0, 0.0];
        assert_eq!(macro_f1(&truth, &truth), 1.0);

        // class 1: p=1, r=0.5, f1=2/3; class 0: p=2/3, r=1, f1=0.8
        let predicted = [1.0, 0.0, 0.0, 0.0];
        assert!((macro_f1(&truth, &predicted) - (2.0 / 3.0 + 0.8) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_all_negative_prediction() {
        let truth = [0.0, 0.0, 0.0, 1.0];
        let predicted = [0.0; 4];
        let report = ClassificationReport::new(&truth, &predicted);
        assert_eq!(report.positive.f1, 0.0);
        assert_eq!(report.accuracy, 0.75);
        assert!(report.to_string().contains("macro avg"));
    }
}
