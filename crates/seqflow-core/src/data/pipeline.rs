//! Pipeline assembly.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::data::bucket::{bucket_width, Chunks, GroupByWindow};
use crate::data::padding::pad_elements;
use crate::data::shuffle::{time_seed, ShuffleBuffer};
use crate::data::stream::{FuseOnError, Repeat, Zip};
use crate::data::{Batch, DatasetBuilder, Element, Resources};
use crate::error::{Result, SeqflowError};
use crate::types::{Mode, PaddedShapes};

/// Default number of examples held by the shuffle buffer.
pub const DEFAULT_SHUFFLE_BUFFER_SIZE: usize = 10_000;

/// Default number of length buckets.
pub const DEFAULT_NUM_BUCKETS: usize = 5;

/// Lazy stream of padded batches.
pub type Batches<'a> = Box<dyn Iterator<Item = Result<Batch>> + 'a>;

type Elements<'a> = Box<dyn Iterator<Item = Result<Element>> + 'a>;

/// Options of an input pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputOptions {
    pub mode: Mode,
    pub batch_size: usize,
    /// Examples held by the shuffle reservoir (training only).
    pub shuffle_buffer_size: usize,
    /// Number of length buckets; 1 or less disables bucketing.
    pub num_buckets: usize,
    pub features_file: PathBuf,
    pub labels_file: Option<PathBuf>,
    /// Longest features sequence kept during training.
    pub maximum_features_length: Option<usize>,
    /// Longest labels sequence kept during training.
    pub maximum_labels_length: Option<usize>,
}

impl InputOptions {
    pub fn new(mode: Mode, features_file: impl Into<PathBuf>, batch_size: usize) -> Self {
        Self {
            mode,
            batch_size,
            shuffle_buffer_size: DEFAULT_SHUFFLE_BUFFER_SIZE,
            num_buckets: DEFAULT_NUM_BUCKETS,
            features_file: features_file.into(),
            labels_file: None,
            maximum_features_length: None,
            maximum_labels_length: None,
        }
    }

    pub fn with_labels_file(mut self, labels_file: impl Into<PathBuf>) -> Self {
        self.labels_file = Some(labels_file.into());
        self
    }

    pub fn with_shuffle_buffer_size(mut self, shuffle_buffer_size: usize) -> Self {
        self.shuffle_buffer_size = shuffle_buffer_size;
        self
    }

    pub fn with_num_buckets(mut self, num_buckets: usize) -> Self {
        self.num_buckets = num_buckets;
        self
    }

    pub fn with_maximum_features_length(mut self, maximum: usize) -> Self {
        self.maximum_features_length = Some(maximum);
        self
    }

    pub fn with_maximum_labels_length(mut self, maximum: usize) -> Self {
        self.maximum_labels_length = Some(maximum);
        self
    }

    /// Checks the options before any file is opened.
    pub fn validate(&self) -> Result<()> {
        if self.mode.requires_labels() && self.labels_file.is_none() {
            return Err(SeqflowError::config(
                "labels file required for training/evaluation",
            ));
        }
        if self.batch_size == 0 {
            return Err(SeqflowError::config("batch_size must be greater than 0"));
        }
        if self.maximum_features_length == Some(0) {
            return Err(SeqflowError::config(
                "maximum_features_length must be greater than 0",
            ));
        }
        if self.maximum_labels_length == Some(0) {
            return Err(SeqflowError::config(
                "maximum_labels_length must be greater than 0",
            ));
        }
        Ok(())
    }

    fn uses_buckets(&self) -> bool {
        self.mode != Mode::Predict && self.num_buckets > 1
    }
}

/// A validated input function. Every call to [`InputFn::batches`] builds a
/// fresh pipeline from the files.
pub struct InputFn<'a, B: ?Sized> {
    builder: &'a B,
    options: InputOptions,
    resources: Resources,
}

impl<'a, B> InputFn<'a, B>
where
    B: DatasetBuilder + ?Sized,
{
    pub fn new(builder: &'a B, options: InputOptions, resources: Resources) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            builder,
            options,
            resources,
        })
    }

    pub fn options(&self) -> &InputOptions {
        &self.options
    }

    /// Builds the pipeline and returns its batch stream. Nothing is read
    /// until the stream is pulled, and the stream ends after its first error.
    pub fn batches(&self) -> Result<Batches<'a>> {
        let builder = self.builder;
        let options = self.options.clone();
        let resources = self.resources.clone();
        debug!(
            mode = %options.mode,
            batch_size = options.batch_size,
            num_buckets = options.num_buckets,
            features_file = %options.features_file.display(),
            "building input pipeline"
        );

        let (first_epoch, features_shapes, labels_shapes) =
            open_elements(builder, &options, &resources)?;

        let elements: Elements<'a> = if options.mode.is_training() {
            let seed = time_seed();
            let maximum_features_length = options.maximum_features_length;
            let maximum_labels_length = options.maximum_labels_length;
            let shuffle_buffer_size = options.shuffle_buffer_size;
            let mut first_epoch = Some(first_epoch);
            let epochs = Repeat::new(move |epoch: u64| -> Result<Elements<'a>> {
                let elements = match first_epoch.take() {
                    Some(elements) => elements,
                    None => open_elements(builder, &options, &resources)?.0,
                };
                let kept = keep_trainable(
                    builder,
                    elements,
                    maximum_features_length,
                    maximum_labels_length,
                );
                Ok(Box::new(ShuffleBuffer::new(
                    kept,
                    shuffle_buffer_size,
                    seed.wrapping_add(u128::from(epoch)),
                )))
            });
            Box::new(epochs)
        } else {
            first_epoch
        };

        let windows: Box<dyn Iterator<Item = Result<Vec<Element>>> + 'a> =
            if self.options.uses_buckets() {
                let width = bucket_width(self.options.maximum_features_length, self.options.num_buckets);
                debug!(bucket_width = width, "bucketing examples by length");
                Box::new(GroupByWindow::new(
                    elements,
                    self.options.batch_size,
                    width,
                    self.options.num_buckets,
                ))
            } else {
                Box::new(Chunks::new(elements, self.options.batch_size))
            };

        let batches = windows.map(move |window| {
            window.and_then(|window| pad_elements(window, &features_shapes, labels_shapes.as_ref()))
        });
        Ok(Box::new(FuseOnError::new(batches)))
    }
}

/// Opens the feature (and label) streams of one epoch. Label presence was
/// checked by [`InputOptions::validate`].
fn open_elements<'a, B>(
    builder: &B,
    options: &InputOptions,
    resources: &Resources,
) -> Result<(Elements<'a>, PaddedShapes, Option<PaddedShapes>)>
where
    B: DatasetBuilder + ?Sized,
{
    let (features, features_shapes) = builder.build_features(&options.features_file, resources)?;
    let (labels, labels_shapes) = match &options.labels_file {
        Some(labels_file) => {
            let (labels, labels_shapes) = builder.build_labels(labels_file, resources)?;
            (Some(labels), Some(labels_shapes))
        }
        None => (None, None),
    };
    let elements: Elements<'a> = Box::new(Zip::new(features, labels));
    Ok((elements, features_shapes, labels_shapes))
}

/// Drops elements rejected by the builder's filtering condition.
fn keep_trainable<'a, B>(
    builder: &'a B,
    elements: Elements<'a>,
    maximum_features_length: Option<usize>,
    maximum_labels_length: Option<usize>,
) -> impl Iterator<Item = Result<Element>> + 'a
where
    B: DatasetBuilder + ?Sized,
{
    elements.filter_map(move |element| {
        let element = match element {
            Ok(element) => element,
            Err(e) => return Some(Err(e)),
        };
        match builder.filter_example(
            &element.features,
            element.labels.as_ref(),
            maximum_features_length,
            maximum_labels_length,
        ) {
            Ok(true) => Some(Ok(element)),
            Ok(false) => {
                trace!("dropping example outside the length bounds");
                None
            }
            Err(e) => Some(Err(e)),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{bucket_id, ExampleStream};
    use crate::types::{scalar_length, Example, PaddedShape, LENGTH_FIELD};
    use candle_core::{Device, Tensor};
    use std::path::Path;

    /// Serves fixed lists of sequence lengths, whatever the file name.
    struct LengthsBuilder {
        features: Vec<i64>,
        labels: Vec<i64>,
    }

    fn stream(lengths: &[i64]) -> (ExampleStream, PaddedShapes) {
        let lengths = lengths.to_vec();
        let stream = lengths.into_iter().map(|length| -> Result<Example> {
            let ids: Vec<i64> = (1..=length).collect();
            Ok(Example::new()
                .with("ids", Tensor::from_vec(ids, length as usize, &Device::Cpu)?)
                .with(LENGTH_FIELD, Tensor::new(length, &Device::Cpu)?))
        });
        let shapes = PaddedShapes::new()
            .with("ids", PaddedShape::sequence())
            .with(LENGTH_FIELD, PaddedShape::scalar());
        (Box::new(stream), shapes)
    }

    impl DatasetBuilder for LengthsBuilder {
        fn build_features(&self, _: &Path, _: &Resources) -> Result<(ExampleStream, PaddedShapes)> {
            Ok(stream(&self.features))
        }

        fn build_labels(&self, _: &Path, _: &Resources) -> Result<(ExampleStream, PaddedShapes)> {
            Ok(stream(&self.labels))
        }
    }

    fn batch_lengths(batch: &Batch) -> Vec<i64> {
        batch
            .features
            .length()
            .unwrap()
            .to_vec1::<i64>()
            .unwrap()
    }

    #[test]
    fn training_without_labels_fails_before_reading() {
        let builder = LengthsBuilder { features: vec![1], labels: vec![] };
        let options = InputOptions::new(Mode::Train, "src.txt", 2);
        let err = InputFn::new(&builder, options, Resources::new()).err().unwrap();
        assert!(matches!(err, SeqflowError::Configuration(_)));
    }

    #[test]
    fn zero_maximum_length_is_invalid() {
        let options = InputOptions::new(Mode::Eval, "src.txt", 2)
            .with_labels_file("tgt.txt")
            .with_maximum_features_length(0);
        assert!(options.validate().is_err());
    }

    #[test]
    fn predict_batches_are_reproducible() {
        let builder = LengthsBuilder { features: vec![3, 1, 4, 1, 5], labels: vec![] };
        let options = InputOptions::new(Mode::Predict, "src.txt", 2).with_num_buckets(3);
        let input_fn = InputFn::new(&builder, options, Resources::new()).unwrap();

        let run = || -> Vec<Vec<i64>> {
            input_fn
                .batches()
                .unwrap()
                .map(|batch| batch_lengths(&batch.unwrap()))
                .collect()
        };
        let first = run();
        assert_eq!(first, vec![vec![3, 1], vec![4, 1], vec![5]]);
        assert_eq!(first, run());
    }

    #[test]
    fn eval_batches_share_one_bucket() {
        let builder = LengthsBuilder {
            features: vec![2, 35, 3, 38, 95, 150, 9, 31],
            labels: vec![1; 8],
        };
        let options = InputOptions::new(Mode::Eval, "src.txt", 2)
            .with_labels_file("tgt.txt")
            .with_num_buckets(10)
            .with_maximum_features_length(100);
        let input_fn = InputFn::new(&builder, options, Resources::new()).unwrap();

        let mut total = 0;
        for batch in input_fn.batches().unwrap() {
            let batch = batch.unwrap();
            let lengths = batch_lengths(&batch);
            let ids: Vec<_> = lengths.iter().map(|&l| bucket_id(l, 10, 10)).collect();
            assert!(ids.windows(2).all(|pair| pair[0] == pair[1]), "{lengths:?}");
            assert!(batch.labels.is_some());
            total += batch.size();
        }
        assert_eq!(total, 8);
    }

    #[test]
    fn training_filters_and_repeats() {
        let builder = LengthsBuilder {
            features: vec![0, 4, 12, 5],
            labels: vec![1, 1, 1, 1],
        };
        let options = InputOptions::new(Mode::Train, "src.txt", 1)
            .with_labels_file("tgt.txt")
            .with_num_buckets(1)
            .with_maximum_features_length(10);
        let input_fn = InputFn::new(&builder, options, Resources::new()).unwrap();

        let lengths: Vec<i64> = input_fn
            .batches()
            .unwrap()
            .take(20)
            .map(|batch| scalar_length(batch.unwrap().features.length().unwrap()).unwrap())
            .collect();
        assert_eq!(lengths.len(), 20);
        assert!(lengths.iter().all(|&l| l == 4 || l == 5));
    }

    #[test]
    fn misaligned_files_surface_an_error() {
        let builder = LengthsBuilder { features: vec![1, 2, 3], labels: vec![1, 2] };
        let options = InputOptions::new(Mode::Eval, "src.txt", 8)
            .with_labels_file("tgt.txt")
            .with_num_buckets(1);
        let input_fn = InputFn::new(&builder, options, Resources::new()).unwrap();
        let mut batches = input_fn.batches().unwrap();
        let first = batches.next().unwrap();
        assert!(matches!(first, Err(SeqflowError::DataAlignment { .. })));
        assert!(batches.next().is_none());
    }

    #[test]
    fn misalignment_ends_bucketed_eval() {
        let builder = LengthsBuilder { features: vec![1, 2, 3], labels: vec![1, 2] };
        let options = InputOptions::new(Mode::Eval, "src.txt", 8)
            .with_labels_file("tgt.txt")
            .with_num_buckets(3);
        let input_fn = InputFn::new(&builder, options, Resources::new()).unwrap();
        let items: Vec<_> = input_fn.batches().unwrap().collect();
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(SeqflowError::DataAlignment { .. })));
    }

    #[test]
    fn misalignment_ends_training() {
        let builder = LengthsBuilder { features: vec![1, 2, 3], labels: vec![1, 2] };
        let options = InputOptions::new(Mode::Train, "src.txt", 1)
            .with_labels_file("tgt.txt")
            .with_num_buckets(1)
            .with_shuffle_buffer_size(1);
        let input_fn = InputFn::new(&builder, options, Resources::new()).unwrap();
        let items: Vec<_> = input_fn.batches().unwrap().take(12).collect();
        assert_eq!(items.iter().filter(|item| item.is_err()).count(), 1);
        assert!(matches!(items.last(), Some(Err(SeqflowError::DataAlignment { .. }))));
        assert!(items.len() <= 3);
    }
}
