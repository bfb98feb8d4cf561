use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::Reducer;
use crate::error::{PipelineError, Result};
use crate::ml::linalg::{column_means, covariance_matrix, EigenDecomposition};

/// Whitened principal component projection that keeps the smallest number of
/// components reaching `variance_threshold` of the total variance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pca {
    variance_threshold: f64,
    mean: Array1<f64>,
    /// One component per row
    components: Array2<f64>,
    explained_variance: Array1<f64>,
    explained_variance_ratio: Array1<f64>,
    fitted: bool,
}

impl Pca {
    pub fn new(variance_threshold: f64) -> Self {
        Self {
            variance_threshold,
            mean: Array1::zeros(0),
            components: Array2::zeros((0, 0)),
            explained_variance: Array1::zeros(0),
            explained_variance_ratio: Array1::zeros(0),
            fitted: false,
        }
    }

    pub fn explained_variance_ratio(&self) -> &Array1<f64> {
        &self.explained_variance_ratio
    }

    pub fn components(&self) -> &Array2<f64> {
        &self.components
    }

    /// Decompose keeping the leading `n_components`.
    fn decompose(&mut self, data: &Array2<f64>, n_components: usize) {
        let d = data.ncols();
        let eig = EigenDecomposition::from_symmetric(&covariance_matrix(data));
        let eigenvalues = eig.eigenvalues.mapv(|v| v.max(0.0));
        let total: f64 = eigenvalues.sum();

        let k = n_components.min(d);
        self.mean = column_means(data);
        self.components = eig.eigenvectors.slice(ndarray::s![.., ..k]).t().to_owned();
        self.explained_variance = eigenvalues.slice(ndarray::s![..k]).to_owned();
        self.explained_variance_ratio = if total > 0.0 {
            self.explained_variance.mapv(|v| v / total)
        } else {
            Array1::zeros(k)
        };
    }

    /// Count of leading components whose cumulative ratio reaches the threshold.
    fn components_for_threshold(&self) -> usize {
        let mut sum = 0.0;
        let mut count = 0;
        for ratio in self.explained_variance_ratio.iter() {
            if sum >= self.variance_threshold {
                break;
            }
            sum += ratio;
            count += 1;
        }
        count
    }

    /// Warnings about suspicious fits. Never fatal.
    pub fn diagnostics(&self) -> Vec<String> {
        let mut issues = Vec::new();
        for (i, ratio) in self.explained_variance_ratio.iter().enumerate() {
            if *ratio >= 0.5 {
                let top = self
                    .components
                    .row(i)
                    .iter()
                    .enumerate()
                    .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
                    .map(|(j, _)| j)
                    .unwrap_or(0);
                issues.push(format!(
                    "component {} explains {:.1}% of variance (dominated by feature {}), check for redundant features",
                    i,
                    ratio * 100.0,
                    top
                ));
            }
            if *ratio == 0.0 {
                issues.push(format!("component {} has zero variance", i));
            }
        }
        for (j, loading) in self.components.axis_iter(Axis(1)).enumerate() {
            if loading.iter().any(|v| !v.is_finite()) {
                issues.push(format!("non-finite loading for feature {}", j));
            }
        }
        issues
    }
}

impl Reducer for Pca {
    fn fit(&mut self, data: &Array2<f64>) -> Result<usize> {
        let (n, d) = data.dim();
        if n < 2 || d == 0 {
            self.fitted = false;
            return Ok(0);
        }

        // full decomposition to get the variance spectrum
        self.decompose(data, d);
        if self.explained_variance_ratio.sum() <= 0.0 {
            self.fitted = false;
            return Ok(0);
        }
        let k = self.components_for_threshold();

        // refit restricted to the selected components
        if k < d {
            self.decompose(data, k);
        }
        self.fitted = true;

        for issue in self.diagnostics() {
            warn!("PCA: {}", issue);
        }
        debug!(
            "PCA: {} -> {} components, variance ratios {:?}",
            d,
            k,
            self.explained_variance_ratio.iter().take(8).collect::<Vec<_>>()
        );
        Ok(self.dim())
    }

    fn transform(&self, data: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.fitted {
            return Err(PipelineError::NotFitted);
        }
        if data.ncols() != self.mean.len() {
            return Err(PipelineError::ShapeMismatch {
                expected: self.mean.len(),
                actual: data.ncols(),
            });
        }
        let centered = data - &self.mean;
        let mut projected = centered.dot(&self.components.t());
        for (mut col, var) in projected.axis_iter_mut(Axis(1)).zip(self.explained_variance.iter()) {
            if *var > 1e-12 {
                col.mapv_inplace(|v| v / var.sqrt());
            } else {
                col.fill(0.0);
            }
        }
        Ok(projected)
    }

    fn dim(&self) -> usize {
        if self.fitted {
            self.components.nrows()
        } else {
            0
        }
    }

    fn name(&self) -> &'static str {
        "PCA"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_matrix(rows: usize, scales: &[f64], seed: u64) -> Array2<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        Array2::from_shape_fn((rows, scales.len()), |(_, j)| scales[j] * (rng.gen::<f64>() - 0.5))
    }

    #[test]
    fn test_dominant_column_reduces_to_one() {
        let data = random_matrix(500, &[1000.0, 0.01, 0.01, 0.01], 3);
        let mut pca = Pca::new(0.999);
        assert_eq!(pca.fit(&data).unwrap(), 1);
        assert!(pca.explained_variance_ratio()[0] > 0.999);
    }

    #[test]
    fn test_independent_columns_keep_all_dimensions() {
        let data = random_matrix(2000, &[1.0; 5], 11);
        let mut pca = Pca::new(0.999);
        assert_eq!(pca.fit(&data).unwrap(), 5);

        let mut loose = Pca::new(0.5);
        assert_eq!(loose.fit(&data).unwrap(), 3);
    }

    #[test]
    fn test_transform_is_whitened() {
        let data = random_matrix(1000, &[4.0, 2.0, 1.0], 5);
        let mut pca = Pca::new(0.999);
        let k = pca.fit(&data).unwrap();
        let out = pca.transform(&data).unwrap();
        assert_eq!(out.ncols(), k);
        for col in out.axis_iter(Axis(1)) {
            let var = col.var(1.0);
            assert!((var - 1.0).abs() < 1e-8);
            assert!(col.mean().unwrap().abs() < 1e-8);
        }
    }

    #[test]
    fn test_transform_requires_fit_and_shape() {
        let pca = Pca::new(0.999);
        assert!(matches!(pca.transform(&Array2::zeros((2, 2))), Err(PipelineError::NotFitted)));

        let mut pca = Pca::new(0.999);
        pca.fit(&random_matrix(100, &[1.0, 1.0], 1)).unwrap();
        assert!(matches!(
            pca.transform(&Array2::zeros((2, 3))),
            Err(PipelineError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_constant_data_collapses() {
        let data = Array2::from_elem((50, 4), 0.5);
        let mut pca = Pca::new(0.999);
        assert_eq!(pca.fit(&data).unwrap(), 0);
        assert_eq!(pca.dim(), 0);
    }

    #[test]
    fn test_diagnostics_flag_dominant_component() {
        let data = random_matrix(300, &[100.0, 1.0, 1.0], 9);
        let mut pca = Pca::new(0.999);
        pca.fit(&data).unwrap();
        let issues = pca.diagnostics();
        assert!(issues.iter().any(|i| i.contains("component 0")));
    }
}
