//! # Seqflow
//!
//! Umbrella crate re-exporting [`seqflow_core`] and [`seqflow_trainer`].

pub use seqflow_core::*;

/// Text datasets, the baseline model and the training driver.
pub mod trainer {
    pub use seqflow_trainer::*;
}
