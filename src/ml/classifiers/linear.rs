use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

use super::{check_training_input, check_width, logit, positive_rate, BinaryClassifier, ClassifierKind, CLASSIFIER_SEED};
use crate::error::{PipelineError, Result};
use crate::ml::linalg::{column_means, sigmoid, solve};

/// Weights and intercept of a linear decision function.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearModel {
    pub weights: Array1<f64>,
    pub intercept: f64,
}

impl LinearModel {
    fn constant(dims: usize, intercept: f64) -> Self {
        Self {
            weights: Array1::zeros(dims),
            intercept,
        }
    }

    pub fn decision(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        check_width(self.weights.len(), x)?;
        Ok(x.dot(&self.weights) + self.intercept)
    }

    pub fn proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self.decision(x)?.mapv(sigmoid))
    }
}

/// Labels in {-1, +1} for margin losses.
fn signed(y: &[f64]) -> Vec<f64> {
    y.iter().map(|&v| if v > 0.5 { 1.0 } else { -1.0 }).collect()
}

fn single_class(y: &[f64]) -> bool {
    let pos = y.iter().filter(|&&v| v > 0.5).count();
    pos == 0 || pos == y.len()
}

/// Previous weights when they fit the new input width.
fn warm_start(previous: &Option<LinearModel>, dims: usize) -> Option<LinearModel> {
    previous.as_ref().filter(|m| m.weights.len() == dims).cloned()
}

/// Two-class linear discriminant with a shared, ridge-regularized covariance.
#[derive(Debug, Clone, Default)]
pub struct Lda {
    model: Option<LinearModel>,
}

impl Lda {
    const RIDGE: [f64; 3] = [1e-6, 1e-3, 1e-1];
}

impl BinaryClassifier for Lda {
    fn fit(&mut self, x: &Array2<f64>, y: &[f64]) -> Result<()> {
        check_training_input(x, y)?;
        let dims = x.ncols();
        let prior = positive_rate(y);
        if single_class(y) {
            self.model = Some(LinearModel::constant(dims, logit(prior)));
            return Ok(());
        }

        let pos_rows: Vec<usize> = (0..y.len()).filter(|&i| y[i] > 0.5).collect();
        let neg_rows: Vec<usize> = (0..y.len()).filter(|&i| y[i] <= 0.5).collect();
        let pos = x.select(Axis(0), &pos_rows);
        let neg = x.select(Axis(0), &neg_rows);
        let mu1 = column_means(&pos);
        let mu0 = column_means(&neg);

        let c1 = &pos - &mu1;
        let c0 = &neg - &mu0;
        let dof = (y.len().saturating_sub(2)).max(1) as f64;
        let pooled = (c1.t().dot(&c1) + c0.t().dot(&c0)) / dof;

        let scale = (pooled.diag().sum() / dims.max(1) as f64).max(1e-12);
        let delta = &mu1 - &mu0;
        let mut weights = None;
        for ridge in Self::RIDGE {
            let mut reg = pooled.clone();
            reg.diag_mut().mapv_inplace(|v| v + ridge * scale);
            if let Some(w) = solve(&reg, &delta) {
                weights = Some(w);
                break;
            }
        }
        let Some(weights) = weights else {
            debug!("LDA: singular covariance, falling back to the class prior");
            self.model = Some(LinearModel::constant(dims, logit(prior)));
            return Ok(());
        };

        let midpoint = (&mu0 + &mu1) * 0.5;
        let intercept = -weights.dot(&midpoint) + logit(prior);
        self.model = Some(LinearModel { weights, intercept });
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.model.as_ref().ok_or(PipelineError::NotFitted)?.proba(x)
    }

    fn kind(&self) -> ClassifierKind {
        ClassifierKind::Lda
    }

    fn clone_box(&self) -> Box<dyn BinaryClassifier> {
        Box::new(self.clone())
    }
}

/// L2-regularized logistic regression fitted by full-batch gradient descent.
#[derive(Debug, Clone)]
pub struct LogisticRegression {
    pub max_iter: usize,
    pub learning_rate: f64,
    pub lambda: f64,
    model: Option<LinearModel>,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self {
            max_iter: 500,
            learning_rate: 0.5,
            lambda: 1e-3,
            model: None,
        }
    }
}

impl BinaryClassifier for LogisticRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &[f64]) -> Result<()> {
        check_training_input(x, y)?;
        let (n, dims) = x.dim();
        let prior = positive_rate(y);
        if single_class(y) || n == 0 {
            self.model = Some(LinearModel::constant(dims, logit(prior)));
            return Ok(());
        }

        let mut model = match warm_start(&self.model, dims) {
            Some(m) => {
                debug!("LogisticRegression: warm start");
                m
            }
            None => LinearModel::constant(dims, logit(prior)),
        };
        let labels = Array1::from_vec(y.to_vec());

        for _ in 0..self.max_iter {
            let error = x.dot(&model.weights).mapv(|z| z + model.intercept).mapv(sigmoid) - &labels;
            let grad_w = x.t().dot(&error) / n as f64 + &model.weights * self.lambda;
            let grad_b = error.sum() / n as f64;
            model.weights = &model.weights - &(grad_w * self.learning_rate);
            model.intercept -= self.learning_rate * grad_b;
        }
        self.model = Some(model);
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.model.as_ref().ok_or(PipelineError::NotFitted)?.proba(x)
    }

    fn kind(&self) -> ClassifierKind {
        ClassifierKind::LogisticRegression
    }

    fn clone_box(&self) -> Box<dyn BinaryClassifier> {
        Box::new(self.clone())
    }
}

/// Linear SVM trained by shuffled stochastic gradient descent on the hinge
/// loss. Scores are the logistic of the margin.
#[derive(Debug, Clone)]
pub struct Sgd {
    pub epochs: usize,
    pub alpha: f64,
    model: Option<LinearModel>,
}

impl Default for Sgd {
    fn default() -> Self {
        Self {
            epochs: 30,
            alpha: 1e-4,
            model: None,
        }
    }
}

impl BinaryClassifier for Sgd {
    fn fit(&mut self, x: &Array2<f64>, y: &[f64]) -> Result<()> {
        check_training_input(x, y)?;
        let (n, dims) = x.dim();
        if single_class(y) || n == 0 {
            self.model = Some(LinearModel::constant(dims, logit(positive_rate(y))));
            return Ok(());
        }

        let targets = signed(y);
        let mut model = warm_start(&self.model, dims).unwrap_or_else(|| LinearModel::constant(dims, 0.0));
        let mut rng = StdRng::seed_from_u64(CLASSIFIER_SEED);
        let mut order: Vec<usize> = (0..n).collect();
        let mut step = 1usize;

        for _ in 0..self.epochs {
            order.shuffle(&mut rng);
            for &i in &order {
                // optimal-style schedule: eta = 1 / (alpha * (t0 + t))
                let eta = 1.0 / (self.alpha * (1.0 / self.alpha + step as f64));
                let row = x.row(i);
                let margin = targets[i] * (row.dot(&model.weights) + model.intercept);
                model.weights *= 1.0 - eta * self.alpha;
                if margin < 1.0 {
                    model.weights.scaled_add(eta * targets[i], &row);
                    model.intercept += eta * targets[i];
                }
                step += 1;
            }
        }
        self.model = Some(model);
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.model.as_ref().ok_or(PipelineError::NotFitted)?.proba(x)
    }

    fn kind(&self) -> ClassifierKind {
        ClassifierKind::Sgd
    }

    fn clone_box(&self) -> Box<dyn BinaryClassifier> {
        Box::new(self.clone())
    }
}

/// Linear SVM on the squared hinge loss, solved in the primal by gradient
/// descent.
#[derive(Debug, Clone)]
pub struct LinearSvc {
    pub c: f64,
    pub max_iter: usize,
    pub learning_rate: f64,
    model: Option<LinearModel>,
}

impl Default for LinearSvc {
    fn default() -> Self {
        Self {
            c: 1.0,
            max_iter: 500,
            learning_rate: 0.05,
            model: None,
        }
    }
}

impl BinaryClassifier for LinearSvc {
    fn fit(&mut self, x: &Array2<f64>, y: &[f64]) -> Result<()> {
        check_training_input(x, y)?;
        let (n, dims) = x.dim();
        if single_class(y) || n == 0 {
            self.model = Some(LinearModel::constant(dims, logit(positive_rate(y))));
            return Ok(());
        }

        let targets = Array1::from_vec(signed(y));
        let mut model = warm_start(&self.model, dims).unwrap_or_else(|| LinearModel::constant(dims, 0.0));
        // objective: |w|^2 / 2 + C / n * sum(max(0, 1 - y f)^2)
        for _ in 0..self.max_iter {
            let margins = (x.dot(&model.weights) + model.intercept) * &targets;
            let slack = margins.mapv(|m| (1.0 - m).max(0.0));
            let coef = &slack * &targets * (-2.0 * self.c / n as f64);
            let grad_w = &model.weights + &x.t().dot(&coef);
            let grad_b = coef.sum();
            model.weights = &model.weights - &(grad_w * self.learning_rate);
            model.intercept -= self.learning_rate * grad_b;
        }
        self.model = Some(model);
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.model.as_ref().ok_or(PipelineError::NotFitted)?.proba(x)
    }

    fn kind(&self) -> ClassifierKind {
        ClassifierKind::LinearSvc
    }

    fn clone_box(&self) -> Box<dyn BinaryClassifier> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::blobs;
    use super::*;

    #[test]
    fn test_lda_direction_follows_mean_difference() {
        let (x, y) = blobs(400, 3, 3.0, 0.5, 1);
        let mut lda = Lda::default();
        lda.fit(&x, &y).unwrap();
        let model = lda.model.as_ref().unwrap();
        assert!(model.weights[0] > 0.0);
        assert!(model.weights[0].abs() > 5.0 * model.weights[1].abs());
    }

    #[test]
    fn test_logistic_warm_start_reuses_weights() {
        let (x, y) = blobs(300, 2, 3.0, 0.5, 3);
        let mut clf = LogisticRegression {
            max_iter: 0,
            ..LogisticRegression::default()
        };
        clf.fit(&x, &y).unwrap();
        let cold = clf.model.clone().unwrap();
        assert_eq!(cold.weights, Array1::<f64>::zeros(2));

        clf.max_iter = 200;
        clf.fit(&x, &y).unwrap();
        let trained = clf.model.clone().unwrap();

        clf.max_iter = 0;
        clf.fit(&x, &y).unwrap();
        assert_eq!(clf.model.unwrap(), trained);
    }

    #[test]
    fn test_warm_start_ignores_mismatched_width() {
        let previous = Some(LinearModel::constant(3, 0.2));
        assert!(warm_start(&previous, 3).is_some());
        assert!(warm_start(&previous, 4).is_none());
    }

    #[test]
    fn test_svc_margin_sign() {
        let (x, y) = blobs(300, 2, 4.0, 0.5, 5);
        let mut svc = LinearSvc::default();
        svc.fit(&x, &y).unwrap();
        let decision = svc.model.as_ref().unwrap().decision(&x).unwrap();
        let agree = decision
            .iter()
            .zip(&y)
            .filter(|(d, t)| (**d > 0.0) == (**t > 0.5))
            .count();
        assert!(agree as f64 / y.len() as f64 > 0.95);
    }
}
