//! Run configuration loaded from a JSON file.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use seqflow_core::data::pipeline::{DEFAULT_NUM_BUCKETS, DEFAULT_SHUFFLE_BUFFER_SIZE};
use seqflow_core::{InputOptions, Mode, Resources, TrainParams};

use crate::model::{DEFAULT_EMBEDDING_SIZE, SOURCE_VOCABULARY, TARGET_VOCABULARY};

/// Data files of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    pub train_features_file: PathBuf,
    pub train_labels_file: PathBuf,
    #[serde(default)]
    pub eval_features_file: Option<PathBuf>,
    #[serde(default)]
    pub eval_labels_file: Option<PathBuf>,
    pub source_vocabulary: PathBuf,
    pub target_vocabulary: PathBuf,
}

fn default_batch_size() -> usize {
    64
}

fn default_shuffle_buffer_size() -> usize {
    DEFAULT_SHUFFLE_BUFFER_SIZE
}

fn default_num_buckets() -> usize {
    DEFAULT_NUM_BUCKETS
}

fn default_train_steps() -> u64 {
    1000
}

fn default_save_summary_steps() -> u64 {
    100
}

fn default_embedding_size() -> usize {
    DEFAULT_EMBEDDING_SIZE
}

/// Input pipeline and loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_shuffle_buffer_size")]
    pub shuffle_buffer_size: usize,
    #[serde(default = "default_num_buckets")]
    pub num_buckets: usize,
    #[serde(default)]
    pub maximum_features_length: Option<usize>,
    #[serde(default)]
    pub maximum_labels_length: Option<usize>,
    #[serde(default = "default_train_steps")]
    pub train_steps: u64,
    /// Log a summary every this many steps.
    #[serde(default = "default_save_summary_steps")]
    pub save_summary_steps: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            shuffle_buffer_size: default_shuffle_buffer_size(),
            num_buckets: default_num_buckets(),
            maximum_features_length: None,
            maximum_labels_length: None,
            train_steps: default_train_steps(),
            save_summary_steps: default_save_summary_steps(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_embedding_size")]
    pub embedding_size: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            embedding_size: default_embedding_size(),
        }
    }
}

/// Top-level run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Directory of the saved run state, read back when a trainer starts.
    pub model_dir: PathBuf,
    pub data: DataConfig,
    #[serde(default)]
    pub params: TrainParams,
    #[serde(default)]
    pub train: TrainConfig,
    #[serde(default)]
    pub model: ModelConfig,
}

impl RunConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading run configuration {}", path.display()))?;
        Self::from_json(&contents).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        if config.train.save_summary_steps == 0 {
            bail!("save_summary_steps must be greater than 0");
        }
        Ok(config)
    }

    /// Vocabulary paths keyed the way the model looks them up.
    pub fn resources(&self) -> Resources {
        Resources::from([
            (SOURCE_VOCABULARY.to_string(), self.data.source_vocabulary.clone()),
            (TARGET_VOCABULARY.to_string(), self.data.target_vocabulary.clone()),
        ])
    }

    pub fn train_input(&self) -> InputOptions {
        self.input_options(
            InputOptions::new(Mode::Train, &self.data.train_features_file, self.train.batch_size)
                .with_labels_file(&self.data.train_labels_file)
                .with_shuffle_buffer_size(self.train.shuffle_buffer_size),
        )
    }

    /// `None` when no evaluation files are configured.
    pub fn eval_input(&self) -> Option<InputOptions> {
        let features = self.data.eval_features_file.as_ref()?;
        let labels = self.data.eval_labels_file.as_ref()?;
        Some(self.input_options(
            InputOptions::new(Mode::Eval, features, self.train.batch_size).with_labels_file(labels),
        ))
    }

    fn input_options(&self, mut options: InputOptions) -> InputOptions {
        options = options.with_num_buckets(self.train.num_buckets);
        if let Some(maximum) = self.train.maximum_features_length {
            options = options.with_maximum_features_length(maximum);
        }
        if let Some(maximum) = self.train.maximum_labels_length {
            options = options.with_maximum_labels_length(maximum);
        }
        options
    }
}
