use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::FitAbort;
use crate::ml::{BinaryClassifier, FittedScaler, Reducer};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelState {
    /// No fit has been attempted yet.
    #[default]
    Uninitialized,
    Ready,
    /// The last fit was aborted; predictions are neutral until the next one.
    Skipped,
}

impl fmt::Display for ModelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModelState::Uninitialized => "uninitialized",
            ModelState::Ready => "ready",
            ModelState::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Models produced by one successful training cycle.
pub(crate) struct FittedModels {
    pub scaler: FittedScaler,
    pub reducer: Box<dyn Reducer>,
    pub entry: Box<dyn BinaryClassifier>,
    pub entry_name: String,
    pub exit: Box<dyn BinaryClassifier>,
    pub exit_name: String,
}

/// Per-instrument model state carried between invocations.
///
/// Models are held behind `Arc` so a reused model keeps its identity from
/// call to call; a refit always installs new objects.
#[derive(Clone, Default)]
pub struct ModelRecord {
    state: ModelState,
    interval: u32,
    scaler: Option<Arc<FittedScaler>>,
    reducer: Option<Arc<dyn Reducer>>,
    entry: Option<Arc<dyn BinaryClassifier>>,
    exit: Option<Arc<dyn BinaryClassifier>>,
    entry_name: String,
    exit_name: String,
    generation: u64,
    fits: u32,
    aborts: u32,
    last_abort: Option<FitAbort>,
}

impl ModelRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ModelState {
        self.state
    }

    /// Invocations left before the next retrain.
    pub fn interval(&self) -> u32 {
        self.interval
    }

    /// Force the next retrain to happen on the `calls`-th invocation from now.
    pub fn schedule_in(&mut self, calls: u32) {
        self.interval = calls;
    }

    pub fn scaler(&self) -> Option<&Arc<FittedScaler>> {
        self.scaler.as_ref()
    }

    pub fn reducer(&self) -> Option<&Arc<dyn Reducer>> {
        self.reducer.as_ref()
    }

    pub fn entry_classifier(&self) -> Option<&Arc<dyn BinaryClassifier>> {
        self.entry.as_ref()
    }

    pub fn exit_classifier(&self) -> Option<&Arc<dyn BinaryClassifier>> {
        self.exit.as_ref()
    }

    pub fn entry_name(&self) -> &str {
        &self.entry_name
    }

    pub fn exit_name(&self) -> &str {
        &self.exit_name
    }

    /// Reduced dimension of the installed reducer, 0 when there is none.
    pub fn dim(&self) -> usize {
        self.reducer.as_ref().map_or(0, |r| r.dim())
    }

    /// Number of training attempts, successful or not.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn fits(&self) -> u32 {
        self.fits
    }

    pub fn aborts(&self) -> u32 {
        self.aborts
    }

    pub fn last_abort(&self) -> Option<&FitAbort> {
        self.last_abort.as_ref()
    }

    pub fn can_predict(&self) -> bool {
        self.reducer.is_some() && self.entry.is_some() && self.exit.is_some()
    }

    /// Count down one invocation. Returns true when a retrain is due.
    pub(crate) fn tick(&mut self) -> bool {
        self.interval = self.interval.saturating_sub(1);
        self.interval == 0
    }

    /// Start a training attempt: clear every model and hand back the previous
    /// classifiers so they can be refit.
    pub(crate) fn begin_training(
        &mut self,
        interval: u32,
    ) -> (Option<Arc<dyn BinaryClassifier>>, Option<Arc<dyn BinaryClassifier>>) {
        self.generation += 1;
        self.interval = interval;
        self.scaler = None;
        self.reducer = None;
        self.entry_name.clear();
        self.exit_name.clear();
        (self.entry.take(), self.exit.take())
    }

    pub(crate) fn install(&mut self, models: FittedModels) {
        self.scaler = Some(Arc::new(models.scaler));
        self.reducer = Some(Arc::from(models.reducer));
        self.entry = Some(Arc::from(models.entry));
        self.exit = Some(Arc::from(models.exit));
        self.entry_name = models.entry_name;
        self.exit_name = models.exit_name;
        self.state = ModelState::Ready;
        self.fits += 1;
        self.last_abort = None;
    }

    pub(crate) fn abort(&mut self, reason: FitAbort) {
        self.state = ModelState::Skipped;
        self.aborts += 1;
        self.last_abort = Some(reason);
    }

    /// Skipped instruments retry within `cap` invocations.
    pub(crate) fn cap_interval(&mut self, cap: u32) {
        self.interval = self.interval.min(cap);
    }
}

impl fmt::Debug for ModelRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRecord")
            .field("state", &self.state)
            .field("interval", &self.interval)
            .field("dim", &self.dim())
            .field("entry", &self.entry_name)
            .field("exit", &self.exit_name)
            .field("generation", &self.generation)
            .field("fits", &self.fits)
            .field("aborts", &self.aborts)
            .finish()
    }
}
