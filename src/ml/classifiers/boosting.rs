use ndarray::{Array1, Array2, Axis};

use super::tree::{BinnedFeatures, RegressionTree, TreeParams};
use super::{check_training_input, check_width, logit, positive_rate, BinaryClassifier, ClassifierKind};
use crate::error::{PipelineError, Result};
use crate::ml::linalg::sigmoid;

/// Additive ensemble of trees over a log-odds base score.
#[derive(Debug, Clone)]
struct TreeEnsemble {
    dims: usize,
    base: f64,
    trees: Vec<(f64, RegressionTree)>,
}

impl TreeEnsemble {
    fn raw_scores(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        check_width(self.dims, x)?;
        Ok(x
            .axis_iter(Axis(0))
            .map(|row| {
                self.base
                    + self
                        .trees
                        .iter()
                        .map(|(weight, tree)| weight * tree.predict_row(row))
                        .sum::<f64>()
            })
            .collect())
    }
}

/// Newton boosting on the logistic loss.
fn boost_logistic(
    x: &Array2<f64>,
    y: &[f64],
    rounds: usize,
    learning_rate: f64,
    params: &TreeParams,
) -> TreeEnsemble {
    let n = x.nrows();
    let base = logit(positive_rate(y));
    let binned = BinnedFeatures::new(x);
    let mut raw = vec![base; n];
    let mut trees = Vec::with_capacity(rounds);

    for _ in 0..rounds {
        let p: Vec<f64> = raw.iter().map(|&f| sigmoid(f)).collect();
        let grad: Vec<f64> = p.iter().zip(y).map(|(p, t)| p - t).collect();
        let hess: Vec<f64> = p.iter().map(|p| (p * (1.0 - p)).max(1e-6)).collect();
        if grad.iter().all(|g| g.abs() < 1e-6) {
            break;
        }
        let tree = RegressionTree::fit(&binned, &grad, &hess, (0..n).collect(), params);
        for (i, row) in x.axis_iter(Axis(0)).enumerate() {
            raw[i] += learning_rate * tree.predict_row(row);
        }
        trees.push((learning_rate, tree));
    }

    TreeEnsemble {
        dims: x.ncols(),
        base,
        trees,
    }
}

/// Gradient boosting with shallow trees and shrinkage.
#[derive(Debug, Clone)]
pub struct GradientBoosting {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    ensemble: Option<TreeEnsemble>,
}

impl Default for GradientBoosting {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            ensemble: None,
        }
    }
}

impl BinaryClassifier for GradientBoosting {
    fn fit(&mut self, x: &Array2<f64>, y: &[f64]) -> Result<()> {
        check_training_input(x, y)?;
        let params = TreeParams {
            max_depth: self.max_depth,
            min_samples_leaf: 1,
            min_child_weight: 0.0,
            lambda: 1e-6,
            gamma: 0.0,
        };
        self.ensemble = Some(boost_logistic(x, y, self.n_estimators, self.learning_rate, &params));
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let ensemble = self.ensemble.as_ref().ok_or(PipelineError::NotFitted)?;
        Ok(ensemble.raw_scores(x)?.mapv(sigmoid))
    }

    fn kind(&self) -> ClassifierKind {
        ClassifierKind::GradientBoosting
    }

    fn clone_box(&self) -> Box<dyn BinaryClassifier> {
        Box::new(self.clone())
    }
}

/// Regularized second-order boosting: deeper trees, L2 on leaves and a
/// minimum hessian mass per child.
#[derive(Debug, Clone)]
pub struct XgBoost {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub lambda: f64,
    pub gamma: f64,
    pub min_child_weight: f64,
    ensemble: Option<TreeEnsemble>,
}

impl Default for XgBoost {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.3,
            max_depth: 6,
            lambda: 1.0,
            gamma: 0.0,
            min_child_weight: 1.0,
            ensemble: None,
        }
    }
}

impl BinaryClassifier for XgBoost {
    fn fit(&mut self, x: &Array2<f64>, y: &[f64]) -> Result<()> {
        check_training_input(x, y)?;
        let params = TreeParams {
            max_depth: self.max_depth,
            min_samples_leaf: 1,
            min_child_weight: self.min_child_weight,
            lambda: self.lambda,
            gamma: self.gamma,
        };
        self.ensemble = Some(boost_logistic(x, y, self.n_estimators, self.learning_rate, &params));
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let ensemble = self.ensemble.as_ref().ok_or(PipelineError::NotFitted)?;
        Ok(ensemble.raw_scores(x)?.mapv(sigmoid))
    }

    fn kind(&self) -> ClassifierKind {
        ClassifierKind::XgBoost
    }

    fn clone_box(&self) -> Box<dyn BinaryClassifier> {
        Box::new(self.clone())
    }
}

/// Discrete AdaBoost over decision stumps.
#[derive(Debug, Clone)]
pub struct AdaBoost {
    pub n_estimators: usize,
    ensemble: Option<TreeEnsemble>,
}

impl Default for AdaBoost {
    fn default() -> Self {
        Self {
            n_estimators: 50,
            ensemble: None,
        }
    }
}

impl AdaBoost {
    const STUMP: TreeParams = TreeParams {
        max_depth: 1,
        min_samples_leaf: 1,
        min_child_weight: 0.0,
        lambda: 0.0,
        gamma: 0.0,
    };
}

impl BinaryClassifier for AdaBoost {
    fn fit(&mut self, x: &Array2<f64>, y: &[f64]) -> Result<()> {
        check_training_input(x, y)?;
        let n = x.nrows();
        let targets: Vec<f64> = y.iter().map(|&v| if v > 0.5 { 1.0 } else { -1.0 }).collect();
        let binned = BinnedFeatures::new(x);
        let mut weights = vec![1.0 / n.max(1) as f64; n];
        let mut trees = Vec::with_capacity(self.n_estimators);

        for _ in 0..self.n_estimators {
            // weighted least squares stump; leaf sign is the weighted majority
            let grad: Vec<f64> = weights.iter().zip(&targets).map(|(w, t)| -w * t).collect();
            let stump = RegressionTree::fit(&binned, &grad, &weights, (0..n).collect(), &Self::STUMP);
            let votes: Vec<f64> = x
                .axis_iter(Axis(0))
                .map(|row| if stump.predict_row(row) >= 0.0 { 1.0 } else { -1.0 })
                .collect();
            let error: f64 = (0..n).filter(|&i| votes[i] != targets[i]).map(|i| weights[i]).sum();

            if error >= 0.5 {
                break;
            }
            let alpha = 0.5 * ((1.0 - error).max(1e-10) / error.max(1e-10)).ln();
            // stump outputs are rescaled to +-1 so alpha weights a vote
            trees.push((alpha, sign_stump(stump)));
            if error <= 1e-10 {
                break;
            }
            for i in 0..n {
                weights[i] *= (-alpha * targets[i] * votes[i]).exp();
            }
            let total: f64 = weights.iter().sum();
            weights.iter_mut().for_each(|w| *w /= total);
        }

        self.ensemble = Some(TreeEnsemble {
            dims: x.ncols(),
            base: 0.0,
            trees,
        });
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let ensemble = self.ensemble.as_ref().ok_or(PipelineError::NotFitted)?;
        Ok(ensemble.raw_scores(x)?.mapv(|f| sigmoid(2.0 * f)))
    }

    fn kind(&self) -> ClassifierKind {
        ClassifierKind::AdaBoost
    }

    fn clone_box(&self) -> Box<dyn BinaryClassifier> {
        Box::new(self.clone())
    }
}

/// A stump whose leaves vote +1 / -1.
fn sign_stump(stump: RegressionTree) -> RegressionTree {
    stump.map_leaves(|v| if v >= 0.0 { 1.0 } else { -1.0 })
}
