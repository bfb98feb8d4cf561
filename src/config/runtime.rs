use serde::{Deserialize, Serialize};

use crate::ml::classifiers::ClassifierKind;
use crate::ml::normalize::{OutlierPolicy, ScalerKind};
use crate::ml::reducer::ReducerKind;
use crate::signal::{DecomposeMode, ThresholdMode, Wavelet};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub labels: LabelSettings,
    pub model: ModelSettings,
    pub normalize: NormalizeSettings,
    pub decomposition: DecompositionSettings,
    pub schedule: ScheduleSettings,
    pub debug: DebugSettings,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        // Labels
        if self.labels.lookahead_hours <= 0.0 {
            errors.push("lookahead_hours must be > 0".to_string());
        }
        if self.labels.timeframe_minutes == 0 {
            errors.push("timeframe_minutes must be > 0".to_string());
        }
        if self.labels.n_profit_stddevs < 0.0 || self.labels.n_loss_stddevs < 0.0 {
            errors.push("stddev multipliers must be >= 0".to_string());
        }

        // Model
        if !(0.0..=1.0).contains(&self.model.min_f1_score) {
            errors.push("min_f1_score must be between 0 and 1".to_string());
        }
        if self.model.variance_threshold <= 0.0 || self.model.variance_threshold > 1.0 {
            errors.push("variance_threshold must be in (0, 1]".to_string());
        }
        if ClassifierKind::lookup(&self.model.default_classifier).is_none() {
            errors.push(format!("unknown default_classifier '{}'", self.model.default_classifier));
        }
        for name in &self.model.scan_candidates {
            if ClassifierKind::lookup(name).is_none() {
                errors.push(format!("unknown scan candidate '{}'", name));
            }
        }
        if self.model.dbg_scan_classifiers && self.model.scan_candidates.is_empty() {
            errors.push("scan_candidates must not be empty when scanning".to_string());
        }
        if self.model.max_train_rows < 10 {
            errors.push("max_train_rows must be >= 10".to_string());
        }
        if self.model.embedding_dim < 2 {
            errors.push("embedding_dim must be >= 2".to_string());
        }

        // Normalize
        let [lo, hi] = self.normalize.outlier_bounds;
        if lo >= hi {
            errors.push("outlier_bounds must be [low, high] with low < high".to_string());
        }

        // Decomposition
        if self.decomposition.window < 32 {
            errors.push("decomposition window must be >= 32".to_string());
        }
        if self.decomposition.smoothing_sigma <= 0.0 {
            errors.push("smoothing_sigma must be > 0".to_string());
        }

        // Schedule
        if self.schedule.min_interval == 0 {
            errors.push("min_interval must be > 0".to_string());
        }
        if self.schedule.min_interval > self.schedule.max_interval_floor {
            errors.push("min_interval must be <= max_interval_floor".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Label horizon in candles.
    pub fn lookahead(&self) -> usize {
        let candles = self.labels.lookahead_hours * 60.0 / self.labels.timeframe_minutes.max(1) as f64;
        (candles.round() as usize).max(1)
    }

    /// Rolling window shared by indicators and label statistics.
    pub fn window(&self) -> usize {
        self.lookahead().max(14)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelSettings {
    pub lookahead_hours: f64,
    pub timeframe_minutes: u32,
    pub n_profit_stddevs: f64,
    pub n_loss_stddevs: f64,
}

impl Default for LabelSettings {
    fn default() -> Self {
        Self {
            lookahead_hours: 1.0,
            timeframe_minutes: 5,
            n_profit_stddevs: 0.0,
            n_loss_stddevs: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub min_f1_score: f64,
    pub dbg_scan_classifiers: bool,
    pub default_classifier: String,
    pub scan_candidates: Vec<String>,
    pub scan_every_cycle: bool,
    pub variance_threshold: f64,
    pub reducer: ReducerKind,
    pub embedding_dim: usize,
    pub model_dir: String,
    pub clean_data_required: bool,
    pub max_train_rows: usize,
    pub min_positive_ratio_pct: f64,
    pub random_seed: u64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            min_f1_score: 0.70,
            dbg_scan_classifiers: false,
            default_classifier: "LDA".to_string(),
            scan_candidates: ClassifierKind::ALL.iter().map(|k| k.name().to_string()).collect(),
            scan_every_cycle: false,
            variance_threshold: 0.999,
            reducer: ReducerKind::Pca,
            embedding_dim: 16,
            model_dir: "models".to_string(),
            clean_data_required: false,
            max_train_rows: 975,
            min_positive_ratio_pct: 0.5,
            random_seed: 27,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeSettings {
    pub scaler: ScalerKind,
    pub outlier_policy: OutlierPolicy,
    pub outlier_bounds: [f64; 2],
    pub calendar_features: bool,
    pub reuse_training_scaler: bool,
}

impl Default for NormalizeSettings {
    fn default() -> Self {
        Self {
            scaler: ScalerKind::MinMax,
            outlier_policy: OutlierPolicy::Clip,
            outlier_bounds: [-3.0, 3.0],
            calendar_features: true,
            reuse_training_scaler: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecompositionSettings {
    pub wavelet: Wavelet,
    pub threshold_mode: ThresholdMode,
    pub live_mode: DecomposeMode,
    /// Trailing window for causal rows; also the warm-up length.
    pub window: usize,
    pub smoothing_sigma: f64,
}

impl Default for DecompositionSettings {
    fn default() -> Self {
        Self {
            wavelet: Wavelet::Db4,
            threshold_mode: ThresholdMode::Hard,
            live_mode: DecomposeMode::Causal,
            window: 128,
            smoothing_sigma: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleSettings {
    pub min_interval: u32,
    pub max_interval_floor: u32,
    pub skipped_retry_cap: u32,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            min_interval: 2,
            max_interval_floor: 32,
            skipped_retry_cap: 4,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugSettings {
    pub debug_columns: bool,
    pub test_classifier: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.lookahead(), 12);
        assert_eq!(config.window(), 14);
    }

    #[test]
    fn test_validate_collects_every_violation() {
        let mut config = PipelineConfig::default();
        config.model.min_f1_score = 1.5;
        config.model.default_classifier = "Perceptron".to_string();
        config.normalize.outlier_bounds = [3.0, -3.0];
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.contains("Perceptron")));
    }

    #[test]
    fn test_lookahead_scales_with_timeframe() {
        let mut config = PipelineConfig::default();
        config.labels.lookahead_hours = 2.0;
        config.labels.timeframe_minutes = 15;
        assert_eq!(config.lookahead(), 8);
        assert_eq!(config.window(), 14);
    }
}
