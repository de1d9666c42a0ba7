//! # Seqflow Trainer
//!
//! Concrete pieces on top of `seqflow-core`: vocabulary files, line-based
//! text datasets, a bag-of-words baseline model and the training driver
//! behind the `train` binary.

pub mod config;
pub mod model;
pub mod text;
pub mod trainer;
pub mod vocab;

pub use config::RunConfig;
pub use model::BagOfWords;
pub use text::TextInputter;
pub use trainer::{Trainer, WordThroughput};
pub use vocab::Vocab;
