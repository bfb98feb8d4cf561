use ndarray::{Array1, Array2, Axis};

use super::{check_training_input, check_width, positive_rate, BinaryClassifier, ClassifierKind};
use crate::error::{PipelineError, Result};
use crate::ml::linalg::sigmoid;

#[derive(Debug, Clone)]
struct ClassStats {
    log_prior: f64,
    mean: Array1<f64>,
    var: Array1<f64>,
}

impl ClassStats {
    fn fit(x: &Array2<f64>, rows: &[usize], prior: f64, epsilon: f64) -> Option<Self> {
        if rows.is_empty() {
            return None;
        }
        let subset = x.select(Axis(0), rows);
        let mean = subset.mean_axis(Axis(0))?;
        let var = subset.var_axis(Axis(0), 0.0).mapv(|v| v + epsilon);
        Some(Self {
            log_prior: prior.ln(),
            mean,
            var,
        })
    }

    fn log_likelihood(&self, row: ndarray::ArrayView1<f64>) -> f64 {
        let mut ll = self.log_prior;
        for ((x, m), v) in row.iter().zip(&self.mean).zip(&self.var) {
            ll -= 0.5 * ((2.0 * std::f64::consts::PI * v).ln() + (x - m).powi(2) / v);
        }
        ll
    }
}

/// Gaussian naive Bayes with per-class diagonal variances.
#[derive(Debug, Clone, Default)]
pub struct GaussianNb {
    dims: Option<usize>,
    negative: Option<ClassStats>,
    positive: Option<ClassStats>,
}

impl GaussianNb {
    /// Variance floor relative to the widest feature.
    const VAR_SMOOTHING: f64 = 1e-9;
}

impl BinaryClassifier for GaussianNb {
    fn fit(&mut self, x: &Array2<f64>, y: &[f64]) -> Result<()> {
        check_training_input(x, y)?;
        let max_var = x.var_axis(Axis(0), 0.0).iter().copied().fold(0.0, f64::max);
        let epsilon = (Self::VAR_SMOOTHING * max_var).max(1e-12);
        let prior = positive_rate(y);

        let pos_rows: Vec<usize> = (0..y.len()).filter(|&i| y[i] > 0.5).collect();
        let neg_rows: Vec<usize> = (0..y.len()).filter(|&i| y[i] <= 0.5).collect();
        self.positive = ClassStats::fit(x, &pos_rows, prior, epsilon);
        self.negative = ClassStats::fit(x, &neg_rows, 1.0 - prior, epsilon);
        self.dims = Some(x.ncols());
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let dims = self.dims.ok_or(PipelineError::NotFitted)?;
        check_width(dims, x)?;
        let scores = x
            .axis_iter(Axis(0))
            .map(|row| match (&self.negative, &self.positive) {
                (Some(neg), Some(pos)) => sigmoid(pos.log_likelihood(row) - neg.log_likelihood(row)),
                (None, Some(_)) => 1.0,
                _ => 0.0,
            })
            .collect();
        Ok(scores)
    }

    fn kind(&self) -> ClassifierKind {
        ClassifierKind::GaussianNb
    }

    fn clone_box(&self) -> Box<dyn BinaryClassifier> {
        Box::new(self.clone())
    }
}
