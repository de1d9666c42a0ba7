//! Line-based text datasets.
//!
//! One example per line, tokens separated by whitespace. Each example holds
//! the token ids (`ids`, shape `[len]`) and the scalar `length`.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use candle_core::{Device, Tensor};
use seqflow_core::data::ExampleStream;
use seqflow_core::types::{PaddedShape, LENGTH_FIELD};
use seqflow_core::{Example, PaddedShapes, Resources, Result, SeqflowError};
use tracing::debug;

use crate::vocab::Vocab;

/// Name of the token id field.
pub const IDS_FIELD: &str = "ids";

/// Reads text files into example streams through a vocabulary.
#[derive(Debug, Clone)]
pub struct TextInputter {
    vocab: Arc<Vocab>,
    device: Device,
}

impl TextInputter {
    pub fn new(vocab: Vocab) -> Self {
        Self {
            vocab: Arc::new(vocab),
            device: Device::Cpu,
        }
    }

    /// Loads the vocabulary registered under `key` in `resources`.
    pub fn from_resources(resources: &Resources, key: &str) -> Result<Self> {
        let path = resources
            .get(key)
            .ok_or_else(|| SeqflowError::config(format!("missing vocabulary resource: {key}")))?;
        let vocab = Vocab::from_file(path)?;
        debug!(resource = key, path = %path.display(), size = vocab.len(), "loaded vocabulary");
        Ok(Self::new(vocab))
    }

    /// Place example tensors on `device` instead of the CPU.
    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn vocab(&self) -> &Vocab {
        &self.vocab
    }

    pub fn padded_shapes() -> PaddedShapes {
        PaddedShapes::new()
            .with(IDS_FIELD, PaddedShape::sequence())
            .with(LENGTH_FIELD, PaddedShape::scalar())
    }

    /// Encodes one line.
    pub fn make_example(&self, line: &str) -> Result<Example> {
        encode_line(&self.vocab, &self.device, line)
    }

    /// Lazily streams the examples of `path`. The file is opened now and
    /// read as the stream is pulled.
    pub fn make_dataset(&self, path: &Path) -> Result<(ExampleStream, PaddedShapes)> {
        let reader = BufReader::new(File::open(path)?);
        let vocab = Arc::clone(&self.vocab);
        let device = self.device.clone();
        let stream = reader
            .lines()
            .map(move |line| -> Result<Example> { encode_line(&vocab, &device, &line?) });
        Ok((Box::new(stream), Self::padded_shapes()))
    }
}

fn encode_line(vocab: &Vocab, device: &Device, line: &str) -> Result<Example> {
    let ids = vocab.encode(line);
    let length = ids.len();
    Ok(Example::new()
        .with(IDS_FIELD, Tensor::from_vec(ids, length, device)?)
        .with(LENGTH_FIELD, Tensor::new(length as i64, device)?))
}
