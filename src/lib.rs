//! Per-instrument online entry/exit signal prediction.
//!
//! Candles flow through [`indicators::IndicatorEngine`] into a feature frame.
//! On a randomized retrain schedule, [`labels::LabelBuilder`] looks ahead in a
//! detached copy of that frame to build training targets, and the
//! [`pipeline::SignalPipeline`] normalizes, reduces and classifies them. Every
//! call appends `predict_entry` / `predict_exit` scores for the host to act on.

pub mod config;
pub mod error;
pub mod indicators;
pub mod labels;
pub mod ml;
pub mod pipeline;
pub mod rules;
pub mod signal;
pub mod types;

pub use config::PipelineConfig;
pub use error::{FitAbort, PipelineError, Result, Target};
pub use pipeline::{ModelCache, ModelRecord, ModelState, SignalPipeline};
pub use types::{Candle, CandleSeries, FeatureFrame};
