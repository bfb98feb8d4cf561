pub mod autoencoder;
pub mod pca;

pub use autoencoder::*;
pub use pca::*;

use std::path::Path;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::config::ModelSettings;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReducerKind {
    Pca,
    Autoencoder,
}

/// Dimensionality reduction backend. Classifiers only ever see its output.
#[cfg_attr(test, mockall::automock)]
pub trait Reducer: Send + Sync {
    /// Fit on normalized training rows, returning the reduced dimension.
    fn fit(&mut self, data: &Array2<f64>) -> Result<usize>;

    fn transform(&self, data: &Array2<f64>) -> Result<Array2<f64>>;

    fn dim(&self) -> usize;

    fn name(&self) -> &'static str;

    /// Whether labeled-positive rows should be stripped before fitting.
    fn prefers_clean_data(&self) -> bool {
        false
    }
}

/// Build an unfitted reducer for one instrument.
pub fn build_reducer(settings: &ModelSettings, pair: &str) -> Box<dyn Reducer> {
    match settings.reducer {
        ReducerKind::Pca => Box::new(Pca::new(settings.variance_threshold)),
        ReducerKind::Autoencoder => {
            let file = format!("{}_autoencoder.json", pair.replace(['/', ':', ' '], "_"));
            let path = Path::new(&settings.model_dir).join(file);
            Box::new(LinearAutoencoder::open(settings.embedding_dim, path, settings.random_seed))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_selects_backend() {
        let mut settings = ModelSettings::default();
        assert_eq!(build_reducer(&settings, "BTC/USD").name(), "PCA");

        let dir = tempfile::tempdir().unwrap();
        settings.reducer = ReducerKind::Autoencoder;
        settings.model_dir = dir.path().to_string_lossy().into_owned();
        let reducer = build_reducer(&settings, "BTC/USD");
        assert_eq!(reducer.name(), "LinearAutoencoder");
        assert!(reducer.prefers_clean_data());
    }
}
