//! Optimizer step construction: learning rate decay, gradient clipping and
//! training summaries around a candle optimizer.

use candle_core::backprop::GradStore;
use candle_core::{DType, Tensor, Var};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, SGD};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::counters::GlobalStep;
use crate::decay::{effective_learning_rate, learning_rate_decay_fn, DecayRegistry, LearningRateDecay};
use crate::error::{Result, SeqflowError};
use crate::model::TrainParams;

/// Values reported after each optimizer step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainSummary {
    /// Global step after the update.
    pub step: u64,
    pub learning_rate: f64,
    pub loss: f64,
    /// Gradient norm before clipping.
    pub global_gradient_norm: f64,
}

/// Optimizers selectable by name.
pub enum OptimizerKind {
    Sgd(SGD),
    AdamW(AdamW),
}

impl OptimizerKind {
    pub fn from_name(name: &str, vars: Vec<Var>, learning_rate: f64) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "sgd" | "gradientdescentoptimizer" => Ok(Self::Sgd(SGD::new(vars, learning_rate)?)),
            "adam" | "adamoptimizer" => Ok(Self::AdamW(AdamW::new(
                vars,
                ParamsAdamW {
                    lr: learning_rate,
                    weight_decay: 0.0,
                    ..ParamsAdamW::default()
                },
            )?)),
            "adamw" => Ok(Self::AdamW(AdamW::new(
                vars,
                ParamsAdamW {
                    lr: learning_rate,
                    ..ParamsAdamW::default()
                },
            )?)),
            other => Err(SeqflowError::config(format!("unknown optimizer: {other}"))),
        }
    }

    fn set_learning_rate(&mut self, learning_rate: f64) {
        match self {
            Self::Sgd(optimizer) => optimizer.set_learning_rate(learning_rate),
            Self::AdamW(optimizer) => optimizer.set_learning_rate(learning_rate),
        }
    }

    fn step(&mut self, grads: &GradStore) -> Result<()> {
        match self {
            Self::Sgd(optimizer) => optimizer.step(grads)?,
            Self::AdamW(optimizer) => optimizer.step(grads)?,
        }
        Ok(())
    }
}

/// Global L2 norm of the gradients of `vars`. When `clip_norm` is set and
/// exceeded, every gradient is rescaled so the norm equals `clip_norm`.
pub fn clip_by_global_norm(
    grads: &mut GradStore,
    vars: &[Var],
    clip_norm: Option<f64>,
) -> Result<f64> {
    let mut squared = 0.0;
    for var in vars {
        if let Some(grad) = grads.get(var) {
            squared += grad
                .sqr()?
                .sum_all()?
                .to_dtype(DType::F64)?
                .to_scalar::<f64>()?;
        }
    }
    let norm = squared.sqrt();

    if let Some(clip_norm) = clip_norm {
        if norm > clip_norm && norm > 0.0 {
            let scale = clip_norm / norm;
            for var in vars {
                if let Some(grad) = grads.remove(var) {
                    grads.insert(var, grad.affine(scale, 0.0)?);
                }
            }
        }
    }
    Ok(norm)
}

/// A built training op: owns the optimizer state across steps.
pub struct TrainOp {
    optimizer: OptimizerKind,
    vars: Vec<Var>,
    learning_rate: f64,
    decay: Option<LearningRateDecay>,
    clip_gradients: Option<f64>,
}

impl TrainOp {
    /// Validates `params` and creates the optimizer over `vars`.
    pub fn new(vars: Vec<Var>, params: &TrainParams, registry: &DecayRegistry) -> Result<Self> {
        let learning_rate = params.learning_rate()?;
        let optimizer_name = params.optimizer()?;
        let decay = params
            .decay_config()?
            .map(|config| learning_rate_decay_fn(registry, config))
            .transpose()?;
        if let Some(clip) = params.clip_gradients {
            if clip <= 0.0 {
                return Err(SeqflowError::config(format!(
                    "clip_gradients must be positive, got {clip}"
                )));
            }
        }
        let optimizer = OptimizerKind::from_name(optimizer_name, vars.clone(), learning_rate)?;
        debug!(
            optimizer = optimizer_name,
            learning_rate,
            variables = vars.len(),
            decay = params.decay_type.as_deref().unwrap_or("none"),
            "built train op"
        );
        Ok(Self {
            optimizer,
            vars,
            learning_rate,
            decay,
            clip_gradients: params.clip_gradients,
        })
    }

    /// Learning rate used at `global_step`.
    pub fn learning_rate_at(&self, global_step: u64) -> f64 {
        effective_learning_rate(self.decay.as_ref(), self.learning_rate, global_step)
    }

    /// Back-propagates `loss`, applies one update and increments `global_step`.
    pub fn minimize(&mut self, loss: &Tensor, global_step: &GlobalStep) -> Result<TrainSummary> {
        let learning_rate = self.learning_rate_at(global_step.get());
        self.optimizer.set_learning_rate(learning_rate);

        let loss_value = loss.to_dtype(DType::F64)?.to_scalar::<f64>()?;
        let mut grads = loss.backward()?;
        let global_gradient_norm = clip_by_global_norm(&mut grads, &self.vars, self.clip_gradients)?;
        self.optimizer.step(&grads)?;

        let summary = TrainSummary {
            step: global_step.increment(),
            learning_rate,
            loss: loss_value,
            global_gradient_norm,
        };
        debug!(
            step = summary.step,
            learning_rate = summary.learning_rate,
            loss = summary.loss,
            global_gradient_norm = summary.global_gradient_norm,
            "train step"
        );
        Ok(summary)
    }
}
