pub mod builder;
pub mod policy;

pub use builder::{LabelBuilder, LabelSet, DEBUG_LABEL_COLUMNS};
pub use policy::{DefaultLabelPolicy, LabelPolicy};
