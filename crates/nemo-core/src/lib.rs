//! Nemo core types
//!
//! Framework-independent pieces shared by the preprocessing and training
//! stages: the error taxonomy, file discovery, the label vocabulary and
//! the lazy pipeline-of-transforms abstraction.

pub mod error;
pub mod files;
pub mod labels;
pub mod pipeline;

pub use error::{Axis, NemoError, Result};
pub use files::find_files;
pub use labels::LabelVocabulary;
pub use pipeline::{Pipeline, Prefetch};
