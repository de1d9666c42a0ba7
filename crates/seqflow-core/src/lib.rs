//! # Seqflow Core
//!
//! Training scaffolding for sequence-to-sequence models: learning rate decay
//! policies, word throughput counters, length filtering, and a lazy input
//! pipeline that pairs, shuffles, repeats and length-buckets examples into
//! padded batches.
//!
//! ## Quick Start
//!
//! ```rust
//! use seqflow_core::decay::{learning_rate_decay_fn, DecayConfig, DecayRegistry};
//!
//! let decay = learning_rate_decay_fn(
//!     &DecayRegistry::default(),
//!     DecayConfig::new("exponential_decay", 0.5, 100),
//! )
//! .unwrap();
//!
//! assert_eq!(decay.apply(1.0, 0), 1.0);
//! assert_eq!(decay.apply(1.0, 250), 0.25);
//! ```
pub mod counters;
pub mod data;
pub mod decay;
pub mod error;
pub mod model;
pub mod types;

// Re-export primary API
pub use counters::{GlobalStep, Modality, WordCountSnapshot, WordCounters};
pub use data::{
    filter_example, Batch, Batches, DatasetBuilder, Element, ExampleStream, InputFn,
    InputOptions, Resources,
};
pub use decay::{
    effective_learning_rate, learning_rate_decay_fn, DecayConfig, DecayFn, DecayRegistry,
    LearningRateDecay,
};
pub use error::{Result, SeqflowError};
pub use model::{Model, RunContext, TrainOp, TrainParams, TrainSummary};
pub use types::{Example, Mode, PaddedShape, PaddedShapes};
