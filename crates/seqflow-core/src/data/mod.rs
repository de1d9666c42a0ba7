//! # Input Pipeline
//!
//! Turns feature and label files into a lazy stream of padded batches:
//! positional pairing, training-time filtering, buffered shuffling,
//! repetition, and length-bucketed batching.

pub mod bucket;
pub mod filter;
pub mod padding;
pub mod pipeline;
pub mod shuffle;
pub mod stream;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::types::{Example, PaddedShapes};

pub use bucket::{bucket_id, bucket_width, Chunks, GroupByWindow, DEFAULT_BUCKET_WIDTH};
pub use filter::filter_example;
pub use padding::{pad_elements, pad_examples};
pub use pipeline::{Batches, InputFn, InputOptions};
pub use shuffle::ShuffleBuffer;
pub use stream::{FuseOnError, Repeat, Zip};

/// Lazy stream of unbatched examples read from one file.
pub type ExampleStream = Box<dyn Iterator<Item = Result<Example>> + Send>;

/// Named auxiliary resources (vocabularies, ...) handed to the builders untouched.
pub type Resources = BTreeMap<String, PathBuf>;

/// Builds per-modality example streams from files.
pub trait DatasetBuilder {
    /// Example stream and padded shapes of the features file.
    fn build_features(
        &self,
        features_file: &Path,
        resources: &Resources,
    ) -> Result<(ExampleStream, PaddedShapes)>;

    /// Example stream and padded shapes of the labels file.
    fn build_labels(
        &self,
        labels_file: &Path,
        resources: &Resources,
    ) -> Result<(ExampleStream, PaddedShapes)>;

    /// Training-time filtering condition, see [`filter_example`].
    fn filter_example(
        &self,
        features: &Example,
        labels: Option<&Example>,
        maximum_features_length: Option<usize>,
        maximum_labels_length: Option<usize>,
    ) -> Result<bool> {
        filter_example(features, labels, maximum_features_length, maximum_labels_length)
    }
}

/// One unbatched features/labels pair.
#[derive(Debug, Clone)]
pub struct Element {
    pub features: Example,
    pub labels: Option<Example>,
}

impl Element {
    pub fn new(features: Example, labels: Option<Example>) -> Self {
        Self { features, labels }
    }
}

/// A padded batch of features and, outside inference, labels.
#[derive(Debug, Clone)]
pub struct Batch {
    pub features: Example,
    pub labels: Option<Example>,
    size: usize,
}

impl Batch {
    pub fn new(features: Example, labels: Option<Example>, size: usize) -> Self {
        Self {
            features,
            labels,
            size,
        }
    }

    /// Number of examples in the batch.
    pub fn size(&self) -> usize {
        self.size
    }
}
