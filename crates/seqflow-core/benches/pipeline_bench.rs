use std::path::Path;

use candle_core::{Device, Tensor};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use seqflow_core::data::{bucket_id, ExampleStream};
use seqflow_core::types::{PaddedShape, LENGTH_FIELD};
use seqflow_core::{
    DatasetBuilder, Example, InputFn, InputOptions, Mode, PaddedShapes, Resources, Result,
};

/// Serves synthetic sequences with lengths cycling through 1..=97.
struct Synthetic {
    examples: usize,
}

impl Synthetic {
    fn stream(&self) -> (ExampleStream, PaddedShapes) {
        let stream = (0..self.examples).map(|i| -> Result<Example> {
            let length = (i * 31 % 97 + 1) as i64;
            let ids: Vec<i64> = (0..length).collect();
            Ok(Example::new()
                .with("ids", Tensor::from_vec(ids, length as usize, &Device::Cpu)?)
                .with(LENGTH_FIELD, Tensor::new(length, &Device::Cpu)?))
        });
        let shapes = PaddedShapes::new()
            .with("ids", PaddedShape::sequence())
            .with(LENGTH_FIELD, PaddedShape::scalar());
        (Box::new(stream), shapes)
    }
}

impl DatasetBuilder for Synthetic {
    fn build_features(&self, _: &Path, _: &Resources) -> Result<(ExampleStream, PaddedShapes)> {
        Ok(self.stream())
    }

    fn build_labels(&self, _: &Path, _: &Resources) -> Result<(ExampleStream, PaddedShapes)> {
        Ok(self.stream())
    }
}

fn bench_pipeline(c: &mut Criterion) {
    let builder = Synthetic { examples: 512 };

    c.bench_function("bucket_id", |b| {
        b.iter(|| {
            for length in 0..200 {
                black_box(bucket_id(black_box(length), 10, 10));
            }
        });
    });

    c.bench_function("eval_padded_batches_512", |b| {
        let options = InputOptions::new(Mode::Eval, "src.txt", 32)
            .with_labels_file("tgt.txt")
            .with_num_buckets(1);
        let input_fn = InputFn::new(&builder, options, Resources::new()).unwrap();
        b.iter(|| input_fn.batches().unwrap().map(|batch| batch.unwrap().size()).sum::<usize>());
    });

    c.bench_function("eval_bucketed_batches_512", |b| {
        let options = InputOptions::new(Mode::Eval, "src.txt", 32)
            .with_labels_file("tgt.txt")
            .with_num_buckets(5)
            .with_maximum_features_length(100);
        let input_fn = InputFn::new(&builder, options, Resources::new()).unwrap();
        b.iter(|| input_fn.batches().unwrap().map(|batch| batch.unwrap().size()).sum::<usize>());
    });

    c.bench_function("train_shuffled_batches_64", |b| {
        let options = InputOptions::new(Mode::Train, "src.txt", 32)
            .with_labels_file("tgt.txt")
            .with_shuffle_buffer_size(256)
            .with_maximum_features_length(100);
        let input_fn = InputFn::new(&builder, options, Resources::new()).unwrap();
        b.iter(|| {
            input_fn
                .batches()
                .unwrap()
                .take(64)
                .map(|batch| batch.unwrap().size())
                .sum::<usize>()
        });
    });
}

criterion_group!(benches, bench_pipeline);
criterion_main!(benches);
