//! Bag-of-words baseline.
//!
//! Averages the source token embeddings and predicts every target token
//! from the pooled vector. It ignores word order and is only meant to
//! exercise the training machinery end to end.

use std::path::Path;

use candle_core::{DType, Module, Tensor, D};
use candle_nn::{Embedding, Linear, VarBuilder};
use seqflow_core::data::{Batch, DatasetBuilder, ExampleStream};
use seqflow_core::{
    Example, Mode, Model, PaddedShapes, Resources, Result, RunContext, SeqflowError, TrainParams,
};

use crate::text::{TextInputter, IDS_FIELD};
use crate::vocab::{PADDING_TOKEN, UNKNOWN_TOKEN};

/// Resource key of the source vocabulary file.
pub const SOURCE_VOCABULARY: &str = "source_vocabulary";
/// Resource key of the target vocabulary file.
pub const TARGET_VOCABULARY: &str = "target_vocabulary";

pub const DEFAULT_EMBEDDING_SIZE: usize = 64;

pub struct BagOfWords {
    source: TextInputter,
    target: TextInputter,
    embedding_size: usize,
}

impl BagOfWords {
    pub fn new(source: TextInputter, target: TextInputter, embedding_size: usize) -> Self {
        Self {
            source,
            target,
            embedding_size,
        }
    }

    /// Loads both vocabularies from `resources`.
    pub fn from_resources(resources: &Resources, embedding_size: usize) -> Result<Self> {
        Ok(Self::new(
            TextInputter::from_resources(resources, SOURCE_VOCABULARY)?,
            TextInputter::from_resources(resources, TARGET_VOCABULARY)?,
            embedding_size,
        ))
    }

    pub fn source(&self) -> &TextInputter {
        &self.source
    }

    pub fn target(&self) -> &TextInputter {
        &self.target
    }

    /// Creates (or fetches) the model variables under `vb`.
    pub fn layers(&self, vb: &VarBuilder<'_>) -> Result<(Embedding, Linear)> {
        let embedding = candle_nn::embedding(
            self.source.vocab().len(),
            self.embedding_size,
            vb.pp("encoder").pp("embedding"),
        )?;
        let projection = candle_nn::linear(
            self.embedding_size,
            self.target.vocab().len(),
            vb.pp("decoder").pp("projection"),
        )?;
        Ok((embedding, projection))
    }

    /// Target log-probabilities, `[batch, target_vocab]`.
    fn log_probs(&self, vb: &VarBuilder<'_>, features: &Example) -> Result<Tensor> {
        let ids = features.require(IDS_FIELD)?;
        let lengths = features
            .length()
            .ok_or_else(|| SeqflowError::missing(seqflow_core::types::LENGTH_FIELD))?;
        let (embedding, projection) = self.layers(vb)?;

        let mask = ids.ne(0i64)?.to_dtype(DType::F32)?.unsqueeze(2)?;
        let lengths = lengths.to_dtype(DType::F32)?.maximum(1f32)?.unsqueeze(1)?;
        let pooled = embedding
            .forward(ids)?
            .broadcast_mul(&mask)?
            .sum(1)?
            .broadcast_div(&lengths)?;
        let logits = projection.forward(&pooled)?;
        Ok(candle_nn::ops::log_softmax(&logits, D::Minus1)?)
    }

    /// Mean negative log-likelihood of the non-padding target tokens.
    fn loss(log_probs: &Tensor, labels: &Example) -> Result<Tensor> {
        let targets = labels.require(IDS_FIELD)?;
        let mask = targets.ne(0i64)?.to_dtype(DType::F32)?;
        let picked = log_probs.gather(targets, 1)?;
        let total = picked.mul(&mask)?.sum_all()?;
        let count = mask.sum_all()?.maximum(1f32)?;
        Ok(total.div(&count)?.neg()?)
    }

    /// The `top_k` most likely target tokens of every example of `batch`.
    pub fn predict(
        &self,
        ctx: &RunContext,
        batch: &Batch,
        params: &TrainParams,
        top_k: usize,
    ) -> Result<Vec<Vec<String>>> {
        let log_probs = self.call(ctx, &batch.features, None, params, Mode::Predict)?;
        let rows = log_probs.to_vec2::<f32>()?;
        let vocab = self.target.vocab();
        let predictions = rows
            .into_iter()
            .map(|row| {
                let mut ids: Vec<usize> = (0..row.len()).collect();
                ids.sort_by(|&a, &b| row[b].total_cmp(&row[a]));
                let tokens = ids
                    .into_iter()
                    .take(top_k)
                    .map(|id| vocab.token(id as i64).to_string())
                    .collect();
                self.format_prediction(tokens, None)
            })
            .collect();
        Ok(predictions)
    }
}

impl DatasetBuilder for BagOfWords {
    fn build_features(
        &self,
        features_file: &Path,
        _resources: &Resources,
    ) -> Result<(ExampleStream, PaddedShapes)> {
        self.source.make_dataset(features_file)
    }

    fn build_labels(
        &self,
        labels_file: &Path,
        _resources: &Resources,
    ) -> Result<(ExampleStream, PaddedShapes)> {
        self.target.make_dataset(labels_file)
    }
}

impl Model for BagOfWords {
    /// Loss with labels, log-probabilities without.
    type Output = Tensor;
    type Prediction = Vec<String>;

    fn name(&self) -> &str {
        "bag_of_words"
    }

    fn build(
        &self,
        _ctx: &RunContext,
        vb: VarBuilder<'_>,
        features: &Example,
        labels: Option<&Example>,
        _params: &TrainParams,
        mode: Mode,
    ) -> Result<Tensor> {
        let log_probs = self.log_probs(&vb, features)?;
        match labels {
            Some(labels) if mode != Mode::Predict => Self::loss(&log_probs, labels),
            _ => Ok(log_probs),
        }
    }

    /// Drops special tokens; `{"n_best": n}` keeps at most `n` tokens.
    fn format_prediction(
        &self,
        prediction: Vec<String>,
        params: Option<&serde_json::Value>,
    ) -> Vec<String> {
        let n_best = params
            .and_then(|params| params.get("n_best"))
            .and_then(serde_json::Value::as_u64)
            .map_or(usize::MAX, |n| n as usize);
        prediction
            .into_iter()
            .filter(|token| token != PADDING_TOKEN && token != UNKNOWN_TOKEN)
            .take(n_best)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::Vocab;
    use candle_core::Device;

    fn model() -> BagOfWords {
        BagOfWords::new(
            TextInputter::new(Vocab::from_tokens(["a", "b", "c"])),
            TextInputter::new(Vocab::from_tokens(["x", "y"])),
            8,
        )
    }

    fn batch(model: &BagOfWords) -> Batch {
        let device = Device::Cpu;
        let features = Example::new()
            .with(IDS_FIELD, Tensor::new(&[[2i64, 3], [4, 0]], &device).unwrap())
            .with("length", Tensor::new(&[2i64, 1], &device).unwrap());
        let labels = Example::new()
            .with(IDS_FIELD, Tensor::new(&[[2i64, 0], [3, 3]], &device).unwrap())
            .with("length", Tensor::new(&[1i64, 2], &device).unwrap());
        assert_eq!(model.target().vocab().len(), 4);
        Batch::new(features, Some(labels), 2)
    }

    #[test]
    fn loss_decreases_with_training() {
        let model = model();
        let ctx = RunContext::new(Device::Cpu);
        let batch = batch(&model);
        let params = TrainParams::new(0.1, "adam");

        let mut losses = Vec::new();
        for _ in 0..20 {
            let loss = model
                .call(&ctx, &batch.features, batch.labels.as_ref(), &params, Mode::Train)
                .unwrap();
            losses.push(model.build_train_op(&ctx, &loss, &params).unwrap().loss);
        }
        assert!(losses[0] > 0.0);
        assert!(losses[19] < losses[0]);
        assert_eq!(ctx.word_counters().snapshot().features, Some(60));
    }

    #[test]
    fn predicts_vocabulary_tokens() {
        let model = model();
        let ctx = RunContext::new(Device::Cpu);
        let batch = batch(&model);
        let params = TrainParams::default();
        let predictions = model.predict(&ctx, &batch, &params, 4).unwrap();
        assert_eq!(predictions.len(), 2);
        for tokens in &predictions {
            assert_eq!(tokens.len(), 2);
            assert!(tokens.iter().all(|t| t == "x" || t == "y"));
        }
    }

    #[test]
    fn format_prediction_honours_n_best() {
        let model = model();
        let tokens = vec!["<unk>".to_string(), "x".to_string(), "y".to_string()];
        let params = serde_json::json!({ "n_best": 1 });
        assert_eq!(model.format_prediction(tokens, Some(&params)), vec!["x".to_string()]);
    }
}
