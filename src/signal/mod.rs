pub mod decompose;

pub use decompose::*;
