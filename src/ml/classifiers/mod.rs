pub mod bayes;
pub mod boosting;
pub mod linear;
pub mod tree;

pub use bayes::GaussianNb;
pub use boosting::{AdaBoost, GradientBoosting, XgBoost};
pub use linear::{Lda, LinearSvc, LogisticRegression, Sgd};

use std::fmt;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Seed for classifiers with stochastic training.
pub const CLASSIFIER_SEED: u64 = 27;

/// A two-class model over the reduced feature space. Labels are 0.0 / 1.0.
pub trait BinaryClassifier: Send + Sync + fmt::Debug {
    fn fit(&mut self, x: &Array2<f64>, y: &[f64]) -> Result<()>;

    /// Probability-like score of the positive class, in [0, 1].
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self.predict_proba(x)?.mapv(|p| if p > 0.5 { 1.0 } else { 0.0 }))
    }

    fn kind(&self) -> ClassifierKind;

    fn clone_box(&self) -> Box<dyn BinaryClassifier>;
}

impl Clone for Box<dyn BinaryClassifier> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassifierKind {
    Lda,
    LogisticRegression,
    GaussianNb,
    Sgd,
    GradientBoosting,
    AdaBoost,
    LinearSvc,
    XgBoost,
}

/// Accepted spellings, matched case-insensitively.
const LOOKUP: &[(&str, ClassifierKind)] = &[
    ("lda", ClassifierKind::Lda),
    ("lineardiscriminantanalysis", ClassifierKind::Lda),
    ("logisticregression", ClassifierKind::LogisticRegression),
    ("logistic", ClassifierKind::LogisticRegression),
    ("gaussiannb", ClassifierKind::GaussianNb),
    ("naivebayes", ClassifierKind::GaussianNb),
    ("sgd", ClassifierKind::Sgd),
    ("sgdclassifier", ClassifierKind::Sgd),
    ("gradientboosting", ClassifierKind::GradientBoosting),
    ("gradientboostingclassifier", ClassifierKind::GradientBoosting),
    ("adaboost", ClassifierKind::AdaBoost),
    ("adaboostclassifier", ClassifierKind::AdaBoost),
    ("linearsvc", ClassifierKind::LinearSvc),
    ("xgboost", ClassifierKind::XgBoost),
    ("xgbclassifier", ClassifierKind::XgBoost),
];

impl ClassifierKind {
    pub const ALL: [ClassifierKind; 8] = [
        ClassifierKind::LogisticRegression,
        ClassifierKind::GaussianNb,
        ClassifierKind::Sgd,
        ClassifierKind::GradientBoosting,
        ClassifierKind::AdaBoost,
        ClassifierKind::LinearSvc,
        ClassifierKind::Lda,
        ClassifierKind::XgBoost,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ClassifierKind::Lda => "LDA",
            ClassifierKind::LogisticRegression => "LogisticRegression",
            ClassifierKind::GaussianNb => "GaussianNB",
            ClassifierKind::Sgd => "SGD",
            ClassifierKind::GradientBoosting => "GradientBoosting",
            ClassifierKind::AdaBoost => "AdaBoost",
            ClassifierKind::LinearSvc => "linearSVC",
            ClassifierKind::XgBoost => "XGBoost",
        }
    }

    pub fn lookup(name: &str) -> Option<ClassifierKind> {
        let key = name.trim().to_ascii_lowercase();
        LOOKUP.iter().find(|(alias, _)| *alias == key).map(|(_, kind)| *kind)
    }

    /// Resolve a configured name, failing fast on unknown names.
    pub fn parse(name: &str) -> Result<ClassifierKind> {
        Self::lookup(name).ok_or_else(|| PipelineError::UnknownClassifier(name.to_string()))
    }

    pub fn build(&self) -> Box<dyn BinaryClassifier> {
        match self {
            ClassifierKind::Lda => Box::new(Lda::default()),
            ClassifierKind::LogisticRegression => Box::new(LogisticRegression::default()),
            ClassifierKind::GaussianNb => Box::new(GaussianNb::default()),
            ClassifierKind::Sgd => Box::new(Sgd::default()),
            ClassifierKind::GradientBoosting => Box::new(GradientBoosting::default()),
            ClassifierKind::AdaBoost => Box::new(AdaBoost::default()),
            ClassifierKind::LinearSvc => Box::new(LinearSvc::default()),
            ClassifierKind::XgBoost => Box::new(XgBoost::default()),
        }
    }
}

impl fmt::Display for ClassifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub(crate) fn check_training_input(x: &Array2<f64>, y: &[f64]) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(PipelineError::ColumnLength {
            name: "labels".to_string(),
            expected: x.nrows(),
            actual: y.len(),
        });
    }
    Ok(())
}

pub(crate) fn check_width(expected: usize, x: &Array2<f64>) -> Result<()> {
    if x.ncols() != expected {
        return Err(PipelineError::ShapeMismatch {
            expected,
            actual: x.ncols(),
        });
    }
    Ok(())
}

/// Fraction of positive labels, kept away from 0 and 1.
pub(crate) fn positive_rate(y: &[f64]) -> f64 {
    if y.is_empty() {
        return 0.5;
    }
    let pos = y.iter().filter(|&&v| v > 0.5).count() as f64;
    (pos / y.len() as f64).clamp(1e-6, 1.0 - 1e-6)
}

pub(crate) fn logit(p: f64) -> f64 {
    (p / (1.0 - p)).ln()
}

#[cfg(test)]
pub(crate) mod fixtures {
    use ndarray::Array2;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Two Gaussian-ish blobs in `dims` dimensions; the positive blob sits at
    /// +`offset` on the first axis and makes up `positive_share` of the rows.
    pub fn blobs(rows: usize, dims: usize, offset: f64, positive_share: f64, seed: u64) -> (Array2<f64>, Vec<f64>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let labels: Vec<f64> = (0..rows)
            .map(|_| if rng.gen::<f64>() < positive_share { 1.0 } else { 0.0 })
            .collect();
        let x = Array2::from_shape_fn((rows, dims), |(i, j)| {
            let noise: f64 = (0..4).map(|_| rng.gen::<f64>() - 0.5).sum();
            let shift = if j == 0 && labels[i] > 0.5 { offset } else { 0.0 };
            noise + shift
        });
        (x, labels)
    }

    pub fn accuracy(truth: &[f64], predicted: &[f64]) -> f64 {
        let correct = truth
            .iter()
            .zip(predicted)
            .filter(|(t, p)| (**t > 0.5) == (**p > 0.5))
            .count();
        correct as f64 / truth.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{accuracy, blobs};
    use super::*;

    #[test]
    fn test_lookup_accepts_legacy_names() {
        assert_eq!(ClassifierKind::lookup("LDA"), Some(ClassifierKind::Lda));
        assert_eq!(ClassifierKind::lookup("linearSVC"), Some(ClassifierKind::LinearSvc));
        assert_eq!(ClassifierKind::lookup("XGBClassifier"), Some(ClassifierKind::XgBoost));
        assert_eq!(ClassifierKind::lookup(" gaussiannb "), Some(ClassifierKind::GaussianNb));
        assert_eq!(ClassifierKind::lookup("sigmoidSVC"), None);
        assert!(matches!(
            ClassifierKind::parse("MLP"),
            Err(PipelineError::UnknownClassifier(_))
        ));
        for kind in ClassifierKind::ALL {
            assert_eq!(ClassifierKind::lookup(kind.name()), Some(kind));
        }
    }

    #[test]
    fn test_every_kind_separates_blobs() {
        let (x, y) = blobs(600, 4, 4.0, 0.3, 17);
        let (test_x, test_y) = blobs(200, 4, 4.0, 0.3, 18);
        for kind in ClassifierKind::ALL {
            let mut clf = kind.build();
            clf.fit(&x, &y).unwrap();
            assert_eq!(clf.kind(), kind);

            let proba = clf.predict_proba(&test_x).unwrap();
            assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)), "{} out of range", kind);
            let predicted = clf.predict(&test_x).unwrap().to_vec();
            let acc = accuracy(&test_y, &predicted);
            assert!(acc > 0.9, "{} accuracy {:.3}", kind, acc);
        }
    }

    #[test]
    fn test_predict_checks_width_and_fit() {
        for kind in ClassifierKind::ALL {
            let clf = kind.build();
            assert!(
                matches!(clf.predict_proba(&Array2::zeros((2, 3))), Err(PipelineError::NotFitted)),
                "{}",
                kind
            );
            let (x, y) = blobs(100, 3, 4.0, 0.5, 2);
            let mut clf = kind.build();
            clf.fit(&x, &y).unwrap();
            assert!(matches!(
                clf.predict_proba(&Array2::zeros((2, 5))),
                Err(PipelineError::ShapeMismatch { .. })
            ));
        }
    }

    #[test]
    fn test_fit_rejects_label_length_mismatch() {
        let mut clf = ClassifierKind::Lda.build();
        let result = clf.fit(&Array2::zeros((4, 2)), &[0.0, 1.0]);
        assert!(matches!(result, Err(PipelineError::ColumnLength { .. })));
    }

    #[test]
    fn test_single_class_labels_give_constant_scores() {
        let (x, _) = blobs(50, 2, 0.0, 0.0, 4);
        let y = vec![0.0; 50];
        for kind in ClassifierKind::ALL {
            let mut clf = kind.build();
            clf.fit(&x, &y).unwrap();
            let predicted = clf.predict(&x).unwrap();
            assert!(predicted.iter().all(|p| *p == 0.0), "{}", kind);
        }
    }

    #[test]
    fn test_boxed_clone_is_independent() {
        let (x, y) = blobs(200, 2, 4.0, 0.5, 9);
        let mut clf = ClassifierKind::LogisticRegression.build();
        clf.fit(&x, &y).unwrap();
        let copy = clf.clone();
        assert_eq!(copy.predict_proba(&x).unwrap(), clf.predict_proba(&x).unwrap());
    }
}
