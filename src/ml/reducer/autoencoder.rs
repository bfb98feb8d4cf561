use std::fs;
use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::Reducer;
use crate::error::{PipelineError, Result};
use crate::ml::linalg::column_means;

const LEARNING_RATE: f64 = 0.05;
const BATCH_SIZE: usize = 64;
const COLD_EPOCHS: usize = 200;
const WARM_EPOCHS: usize = 40;

/// Weights persisted between runs
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AutoencoderWeights {
    input_dim: usize,
    embedding_dim: usize,
    mean: Array1<f64>,
    /// input_dim x embedding_dim, shared by encoder and decoder
    weights: Array2<f64>,
    final_loss: f64,
}

/// Tied-weight linear autoencoder trained on reconstruction error.
pub struct LinearAutoencoder {
    embedding_dim: usize,
    path: PathBuf,
    seed: u64,
    state: Option<AutoencoderWeights>,
}

impl LinearAutoencoder {
    /// Create an encoder backed by `path`, loading prior weights when the file
    /// exists. An unreadable file is treated as no prior model.
    pub fn open(embedding_dim: usize, path: impl Into<PathBuf>, seed: u64) -> Self {
        let path = path.into();
        let state = if path.exists() {
            match Self::load(&path) {
                Ok(weights) => {
                    info!("Loaded autoencoder from {}", path.display());
                    Some(weights)
                }
                Err(e) => {
                    warn!("Could not load autoencoder {}: {} - starting fresh", path.display(), e);
                    None
                }
            }
        } else {
            None
        };
        Self {
            embedding_dim,
            path,
            seed,
            state,
        }
    }

    fn load(path: &Path) -> Result<AutoencoderWeights> {
        let json = fs::read_to_string(path)?;
        let weights: AutoencoderWeights = serde_json::from_str(&json)?;
        if weights.weights.dim() != (weights.input_dim, weights.embedding_dim) {
            return Err(PipelineError::ShapeMismatch {
                expected: weights.input_dim,
                actual: weights.weights.nrows(),
            });
        }
        Ok(weights)
    }

    pub fn save(&self) -> Result<()> {
        let Some(state) = &self.state else {
            return Err(PipelineError::NotFitted);
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string(state)?)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn final_loss(&self) -> Option<f64> {
        self.state.as_ref().map(|s| s.final_loss)
    }

    fn reconstruction_loss(centered: &Array2<f64>, w: &Array2<f64>) -> f64 {
        let rebuilt = centered.dot(w).dot(&w.t());
        let diff = centered - &rebuilt;
        diff.mapv(|v| v * v).sum() / centered.nrows().max(1) as f64
    }
}

impl Reducer for LinearAutoencoder {
    fn fit(&mut self, data: &Array2<f64>) -> Result<usize> {
        let (n, d) = data.dim();
        if n < 2 || d == 0 {
            return Ok(0);
        }
        let k = self.embedding_dim.min(d);
        let mut rng = StdRng::seed_from_u64(self.seed);

        let mean = column_means(data);
        let centered = data - &mean;

        // warm start from persisted weights of the same shape
        let (mut w, epochs) = match &self.state {
            Some(prev) if prev.input_dim == d && prev.embedding_dim == k => (prev.weights.clone(), WARM_EPOCHS),
            _ => (
                Array2::from_shape_fn((d, k), |_| 0.1 * (rng.gen::<f64>() - 0.5)),
                COLD_EPOCHS,
            ),
        };

        let mut order: Vec<usize> = (0..n).collect();
        for _ in 0..epochs {
            order.shuffle(&mut rng);
            for batch in order.chunks(BATCH_SIZE) {
                let x = centered.select(Axis(0), batch);
                // L = |X - X W W'|^2 / b, dL/dW = -(2/b) (X'R + R'X) W
                let r = &x - &x.dot(&w).dot(&w.t());
                let xr = x.t().dot(&r);
                let grad = (&xr + &xr.t()).dot(&w) * (-2.0 / batch.len() as f64);
                w = w - grad * LEARNING_RATE;
            }
        }

        if w.iter().any(|v| !v.is_finite()) {
            warn!("Autoencoder training diverged");
            self.state = None;
            return Ok(0);
        }

        let final_loss = Self::reconstruction_loss(&centered, &w);
        self.state = Some(AutoencoderWeights {
            input_dim: d,
            embedding_dim: k,
            mean,
            weights: w,
            final_loss,
        });
        info!("Autoencoder trained: {} -> {} dims, loss {:.5}", d, k, final_loss);

        if let Err(e) = self.save() {
            warn!("Could not save autoencoder to {}: {}", self.path.display(), e);
        }
        Ok(k)
    }

    fn transform(&self, data: &Array2<f64>) -> Result<Array2<f64>> {
        let state = self.state.as_ref().ok_or(PipelineError::NotFitted)?;
        if data.ncols() != state.input_dim {
            return Err(PipelineError::ShapeMismatch {
                expected: state.input_dim,
                actual: data.ncols(),
            });
        }
        Ok((data - &state.mean).dot(&state.weights))
    }

    fn dim(&self) -> usize {
        self.state.as_ref().map(|s| s.embedding_dim).unwrap_or(0)
    }

    fn name(&self) -> &'static str {
        "LinearAutoencoder"
    }

    fn prefers_clean_data(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::s;

    // rows lie on a 2-d plane embedded in 6 dims
    fn planar_data(rows: usize) -> Array2<f64> {
        let mut rng = StdRng::seed_from_u64(4);
        let basis = Array2::from_shape_fn((2, 6), |(i, j)| ((i * 6 + j) as f64 * 0.7).sin());
        let coords = Array2::from_shape_fn((rows, 2), |_| rng.gen::<f64>() - 0.5);
        coords.dot(&basis)
    }

    #[test]
    fn test_fit_learns_low_rank_structure() {
        let dir = tempfile::tempdir().unwrap();
        let data = planar_data(400);
        let mut ae = LinearAutoencoder::open(2, dir.path().join("ae.json"), 1);
        assert_eq!(ae.fit(&data).unwrap(), 2);
        assert_eq!(ae.transform(&data).unwrap().dim(), (400, 2));

        let total = (&data - &column_means(&data)).mapv(|v| v * v).sum() / 400.0;
        let loss = ae.final_loss().unwrap();
        assert!(loss < 0.05 * total, "loss {} total {}", loss, total);
    }

    #[test]
    fn test_weights_persist_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models").join("ETH_USD_autoencoder.json");
        let data = planar_data(200);

        let mut ae = LinearAutoencoder::open(2, &path, 1);
        ae.fit(&data).unwrap();
        assert!(path.exists());

        let reloaded = LinearAutoencoder::open(2, &path, 1);
        assert_eq!(reloaded.dim(), 2);
        let a = ae.transform(&data.slice(s![..5, ..]).to_owned()).unwrap();
        let b = reloaded.transform(&data.slice(s![..5, ..]).to_owned()).unwrap();
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-9);
        }
    }

    #[test]
    fn test_corrupt_file_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();
        let ae = LinearAutoencoder::open(4, &path, 1);
        assert_eq!(ae.dim(), 0);
        assert!(matches!(ae.transform(&Array2::zeros((1, 3))), Err(PipelineError::NotFitted)));
    }
}
