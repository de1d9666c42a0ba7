use std::sync::{Mutex, PoisonError};

use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};

use crate::counters::{GlobalStep, WordCounters};
use crate::decay::DecayRegistry;
use crate::error::Result;
use crate::model::{TrainOp, TrainParams, TrainSummary};

/// State shared by every model invocation of a training run: variables,
/// counters, the decay registry and the lazily built train op.
pub struct RunContext {
    device: Device,
    varmap: VarMap,
    global_step: GlobalStep,
    word_counters: WordCounters,
    decay_registry: DecayRegistry,
    train_op: Mutex<Option<TrainOp>>,
}

impl RunContext {
    pub fn new(device: Device) -> Self {
        Self {
            device,
            varmap: VarMap::new(),
            global_step: GlobalStep::default(),
            word_counters: WordCounters::new(),
            decay_registry: DecayRegistry::default(),
            train_op: Mutex::new(None),
        }
    }

    /// Use `registry` to resolve decay names, e.g. with extra custom strategies.
    pub fn with_decay_registry(mut self, registry: DecayRegistry) -> Self {
        self.decay_registry = registry;
        self
    }

    /// Resume from restored counters.
    pub fn with_word_counters(mut self, word_counters: WordCounters) -> Self {
        self.word_counters = word_counters;
        self
    }

    pub fn with_global_step(mut self, step: u64) -> Self {
        self.global_step = GlobalStep::new(step);
        self
    }

    #[must_use]
    pub fn device(&self) -> &Device {
        &self.device
    }

    #[must_use]
    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// Mutable variable store, used to load saved weights.
    pub fn varmap_mut(&mut self) -> &mut VarMap {
        &mut self.varmap
    }

    #[must_use]
    pub fn global_step(&self) -> &GlobalStep {
        &self.global_step
    }

    #[must_use]
    pub fn word_counters(&self) -> &WordCounters {
        &self.word_counters
    }

    #[must_use]
    pub fn decay_registry(&self) -> &DecayRegistry {
        &self.decay_registry
    }

    /// Root variable builder over the run's variables.
    pub fn var_builder(&self) -> VarBuilder<'_> {
        VarBuilder::from_varmap(&self.varmap, DType::F32, &self.device)
    }

    /// Minimizes `loss` with the train op, building it from `params` on first use.
    ///
    /// The optimizer captures the variables that exist when it is built and
    /// keeps its state afterwards, so `params` only matter on the first call.
    pub fn minimize(&self, loss: &Tensor, params: &TrainParams) -> Result<TrainSummary> {
        let mut slot = self.train_op.lock().unwrap_or_else(PoisonError::into_inner);
        let mut train_op = match slot.take() {
            Some(train_op) => train_op,
            None => TrainOp::new(self.varmap.all_vars(), params, &self.decay_registry)?,
        };
        let summary = train_op.minimize(loss, &self.global_step);
        *slot = Some(train_op);
        summary
    }

    /// Learning rate the next step will use, if the train op was built.
    pub fn current_learning_rate(&self) -> Option<f64> {
        let slot = self.train_op.lock().unwrap_or_else(PoisonError::into_inner);
        slot.as_ref()
            .map(|train_op| train_op.learning_rate_at(self.global_step.get()))
    }
}
