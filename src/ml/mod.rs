pub mod classifiers;
pub mod ledger;
pub mod linalg;
pub mod metrics;
pub mod normalize;
pub mod reducer;
pub mod sampling;
pub mod selector;

pub use classifiers::{BinaryClassifier, ClassifierKind};
pub use ledger::{ClassifierLedger, LedgerEntry};
pub use metrics::{macro_f1, ClassificationReport};
pub use normalize::{FeatureNormalizer, FittedScaler, OutlierPolicy, ScalerKind};
pub use reducer::{build_reducer, LinearAutoencoder, Pca, Reducer, ReducerKind};
pub use selector::{ClassifierSelector, FitProtocol, Selection, SelectionStrategy};
