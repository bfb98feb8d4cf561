use std::path::Path;

use tracing::info;

use super::PipelineConfig;
use crate::error::{PipelineError, Result};

pub const ENV_PREFIX: &str = "PIPELINE";

/// Build the effective configuration: defaults, then the optional TOML file,
/// then `PIPELINE__SECTION__KEY` environment overrides.
pub fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path));
    }
    let settings = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;

    let config: PipelineConfig = settings
        .try_deserialize()
        .map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;

    config
        .validate()
        .map_err(|errors| PipelineError::InvalidConfig(errors.join(", ")))?;

    info!(
        "Configuration loaded: lookahead={} candles, reducer={:?}, classifier={}",
        config.lookahead(),
        config.model.reducer,
        config.model.default_classifier
    );
    Ok(config)
}

/// Effective configuration as TOML.
pub fn to_toml(config: &PipelineConfig) -> Result<String> {
    toml::to_string_pretty(config).map_err(|e| PipelineError::InvalidConfig(e.to_string()))
}
