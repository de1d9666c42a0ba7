//! Training loop driving the bag-of-words model.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use anyhow::Context;
use candle_core::Device;
use seqflow_core::decay::learning_rate_decay_fn;
use seqflow_core::{Mode, Model, Resources, RunContext, TrainSummary, WordCountSnapshot, WordCounters};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::RunConfig;
use crate::model::BagOfWords;

/// File name of the saved weights inside `model_dir`.
pub const WEIGHTS_FILE: &str = "model.safetensors";
/// File name of the saved word counters inside `model_dir`.
pub const WORD_COUNTS_FILE: &str = "word_counts.json";
/// File name of the saved training state inside `model_dir`.
pub const TRAIN_STATE_FILE: &str = "train_state.json";

/// Progress persisted next to the weights so a run resumes its schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainState {
    pub global_step: u64,
}

/// Words processed per second since the previous sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WordsPerSec {
    pub features: Option<f64>,
    pub labels: Option<f64>,
}

/// Turns the monotonic word counters into throughput figures.
#[derive(Debug)]
pub struct WordThroughput {
    last_sample: Instant,
    last_counts: WordCountSnapshot,
}

impl WordThroughput {
    pub fn new(counters: &WordCounters) -> Self {
        Self {
            last_sample: Instant::now(),
            last_counts: counters.snapshot(),
        }
    }

    pub fn sample(&mut self, counters: &WordCounters) -> WordsPerSec {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_sample).as_secs_f64().max(f64::EPSILON);
        let counts = counters.snapshot();
        let rate = |current: Option<u64>, previous: Option<u64>| {
            current.map(|current| current.saturating_sub(previous.unwrap_or(0)) as f64 / elapsed)
        };
        let rates = WordsPerSec {
            features: rate(counts.features, self.last_counts.features),
            labels: rate(counts.labels, self.last_counts.labels),
        };
        self.last_sample = now;
        self.last_counts = counts;
        rates
    }
}

/// Outcome of [`Trainer::train`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrainReport {
    pub steps: u64,
    pub last: Option<TrainSummary>,
    pub stopped: bool,
}

pub struct Trainer {
    config: RunConfig,
    resources: Resources,
    model: BagOfWords,
    ctx: RunContext,
}

impl Trainer {
    /// Loads the vocabularies, checks the training parameters and resumes
    /// from whatever a previous run saved in `model_dir`.
    pub fn new(config: RunConfig) -> anyhow::Result<Self> {
        let resources = config.resources();
        let model = BagOfWords::from_resources(&resources, config.model.embedding_size)
            .context("loading vocabularies")?;
        let ctx = restore(&config.model_dir, &model, RunContext::new(Device::Cpu))?;

        config.params.learning_rate()?;
        config.params.optimizer()?;
        if let Some(decay) = config.params.decay_config()? {
            learning_rate_decay_fn(ctx.decay_registry(), decay)?;
        }
        info!(
            source_vocab = model.source().vocab().len(),
            target_vocab = model.target().vocab().len(),
            "trainer ready"
        );

        Ok(Self {
            config,
            resources,
            model,
            ctx,
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn model(&self) -> &BagOfWords {
        &self.model
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Runs `steps` optimizer steps, or fewer if `stop` is raised.
    pub fn train(&self, steps: u64, stop: &AtomicBool) -> anyhow::Result<TrainReport> {
        let params = &self.config.params;
        let input_fn = self
            .model
            .input_fn(self.config.train_input(), self.resources.clone())?;
        let mut batches = input_fn.batches()?;
        let mut throughput = WordThroughput::new(self.ctx.word_counters());

        let first_step = self.ctx.global_step().get();
        let last_step = first_step.saturating_add(steps);
        let mut report = TrainReport {
            steps: 0,
            last: None,
            stopped: false,
        };
        info!(first_step, last_step, "starting training");

        while self.ctx.global_step().get() < last_step {
            if stop.load(Ordering::Relaxed) {
                warn!(step = self.ctx.global_step().get(), "stop requested, ending training early");
                report.stopped = true;
                break;
            }
            let Some(batch) = batches.next() else {
                warn!("training input exhausted");
                break;
            };
            let batch = batch?;
            let loss = self.model.call(
                &self.ctx,
                &batch.features,
                batch.labels.as_ref(),
                params,
                Mode::Train,
            )?;
            let summary = self.model.build_train_op(&self.ctx, &loss, params)?;

            if summary.step % self.config.train.save_summary_steps == 0 {
                let words_per_sec = throughput.sample(self.ctx.word_counters());
                info!(
                    step = summary.step,
                    loss = summary.loss,
                    learning_rate = summary.learning_rate,
                    global_gradient_norm = summary.global_gradient_norm,
                    features_words_per_sec = words_per_sec.features,
                    labels_words_per_sec = words_per_sec.labels,
                    "training summary"
                );
            }
            report.steps += 1;
            report.last = Some(summary);
        }
        Ok(report)
    }

    /// Mean loss per example over the evaluation files, `None` when none
    /// are configured.
    pub fn evaluate(&self) -> anyhow::Result<Option<f64>> {
        let Some(options) = self.config.eval_input() else {
            return Ok(None);
        };
        let input_fn = self.model.input_fn(options, self.resources.clone())?;

        let mut total = 0.0;
        let mut examples = 0usize;
        for batch in input_fn.batches()? {
            let batch = batch?;
            let loss = self.model.call(
                &self.ctx,
                &batch.features,
                batch.labels.as_ref(),
                &self.config.params,
                Mode::Eval,
            )?;
            total += f64::from(loss.to_scalar::<f32>()?) * batch.size() as f64;
            examples += batch.size();
        }
        if examples == 0 {
            warn!("evaluation input is empty");
            return Ok(None);
        }
        let loss = total / examples as f64;
        info!(loss, examples, step = self.ctx.global_step().get(), "evaluation");
        Ok(Some(loss))
    }

    /// Writes the weights, word counters and global step into `model_dir`.
    pub fn save(&self) -> anyhow::Result<PathBuf> {
        let model_dir = &self.config.model_dir;
        std::fs::create_dir_all(model_dir)
            .with_context(|| format!("creating {}", model_dir.display()))?;

        let weights = model_dir.join(WEIGHTS_FILE);
        self.ctx
            .varmap()
            .save(&weights)
            .with_context(|| format!("saving {}", weights.display()))?;

        let counts = model_dir.join(WORD_COUNTS_FILE);
        let snapshot = serde_json::to_string_pretty(&self.ctx.word_counters().snapshot())?;
        std::fs::write(&counts, snapshot)
            .with_context(|| format!("writing {}", counts.display()))?;

        let state = model_dir.join(TRAIN_STATE_FILE);
        let global_step = self.ctx.global_step().get();
        std::fs::write(&state, serde_json::to_string_pretty(&TrainState { global_step })?)
            .with_context(|| format!("writing {}", state.display()))?;

        info!(model_dir = %model_dir.display(), step = self.ctx.global_step().get(), "model saved");
        Ok(weights)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let value =
        serde_json::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(value))
}

/// Loads saved weights, word counters and the global step into `ctx`.
fn restore(
    model_dir: &Path,
    model: &BagOfWords,
    mut ctx: RunContext,
) -> anyhow::Result<RunContext> {
    let weights = model_dir.join(WEIGHTS_FILE);
    if weights.exists() {
        model.layers(&ctx.var_builder().pp(model.name()))?;
        ctx.varmap_mut()
            .load(&weights)
            .with_context(|| format!("loading {}", weights.display()))?;
        info!(path = %weights.display(), "restored weights");
    }
    if let Some(snapshot) = read_json::<WordCountSnapshot>(&model_dir.join(WORD_COUNTS_FILE))? {
        ctx = ctx.with_word_counters(WordCounters::restore(snapshot));
    }
    if let Some(state) = read_json::<TrainState>(&model_dir.join(TRAIN_STATE_FILE))? {
        info!(global_step = state.global_step, "resuming training state");
        ctx = ctx.with_global_step(state.global_step);
    }
    Ok(ctx)
}
