use thiserror::Error;

/// Errors that indicate misconfiguration or misuse rather than data variance.
/// Data-driven problems during a retrain cycle are reported as [`FitAbort`]
/// instead and never surface through this type.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown classifier: {0}")]
    UnknownClassifier(String),

    #[error("unknown reducer: {0}")]
    UnknownReducer(String),

    #[error("shape mismatch: expected {expected} columns, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("missing column: {0}")]
    MissingColumn(String),

    #[error("column '{name}' has {actual} rows, frame has {expected}")]
    ColumnLength {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("model is not fitted")]
    NotFitted,

    #[error("persistence error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Reasons a retrain cycle was abandoned. The instrument's model record is
/// reset and predictions are neutral until the next attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum FitAbort {
    InsufficientEntries(usize),
    InsufficientExits(usize),
    TooFewRows(usize),
    ReducerCollapsed(usize),
    LowPositiveRatio { target: Target, ratio_pct: f64 },
    NoClassifier(Target),
    /// A training step returned an error; the error itself is propagated.
    Failed(String),
}

impl std::fmt::Display for FitAbort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FitAbort::InsufficientEntries(n) => {
                write!(f, "insufficient entries in training labels ({})", n)
            }
            FitAbort::InsufficientExits(n) => {
                write!(f, "insufficient exits in training labels ({})", n)
            }
            FitAbort::TooFewRows(n) => write!(f, "too few training rows ({})", n),
            FitAbort::ReducerCollapsed(dim) => {
                write!(f, "dimensionality reduced to {} - training data still in frame?", dim)
            }
            FitAbort::LowPositiveRatio { target, ratio_pct } => {
                write!(f, "insufficient positive {} labels ({:.2}%)", target, ratio_pct)
            }
            FitAbort::NoClassifier(target) => write!(f, "no usable {} classifier", target),
            FitAbort::Failed(e) => write!(f, "training failed: {}", e),
        }
    }
}

/// Which of the two binary targets a classifier or label refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Target {
    Entry,
    Exit,
}

impl Target {
    pub fn as_str(&self) -> &'static str {
        match self {
            Target::Entry => "entry",
            Target::Exit => "exit",
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
