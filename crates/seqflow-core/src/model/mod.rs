//! # Model Entry Point
//!
//! The [`Model`] trait ties a concrete architecture to the shared training
//! machinery. Implementations supply the dataset builders and `build`; the
//! provided methods handle word counting, variable scoping, input pipelines
//! and the optimizer step.

mod context;
mod params;
mod train_op;

use candle_core::Tensor;
use candle_nn::VarBuilder;

use crate::data::{DatasetBuilder, InputFn, InputOptions, Resources};
use crate::error::Result;
use crate::types::{Example, Mode};

pub use context::RunContext;
pub use params::TrainParams;
pub use train_op::{clip_by_global_norm, OptimizerKind, TrainOp, TrainSummary};

/// A trainable sequence-to-sequence model.
pub trait Model: DatasetBuilder {
    /// Whatever `build` produces: a loss in training, predictions otherwise.
    type Output;
    /// Per-example prediction passed through [`Model::format_prediction`].
    type Prediction;

    /// Name used as the variable scope of the model.
    fn name(&self) -> &str;

    /// Creates the model graph for one batch. Variables must be created
    /// through `vb`, which is already scoped under [`Model::name`].
    fn build(
        &self,
        ctx: &RunContext,
        vb: VarBuilder<'_>,
        features: &Example,
        labels: Option<&Example>,
        params: &TrainParams,
        mode: Mode,
    ) -> Result<Self::Output>;

    /// Counts the words of the batch, then runs [`Model::build`] in the
    /// model's variable scope.
    fn call(
        &self,
        ctx: &RunContext,
        features: &Example,
        labels: Option<&Example>,
        params: &TrainParams,
        mode: Mode,
    ) -> Result<Self::Output> {
        ctx.word_counters().observe(features, labels)?;
        let vb = ctx.var_builder().pp(self.name());
        self.build(ctx, vb, features, labels, params, mode)
    }

    /// Applies one optimizer step minimizing `loss` and increments the
    /// global step.
    fn build_train_op(
        &self,
        ctx: &RunContext,
        loss: &Tensor,
        params: &TrainParams,
    ) -> Result<TrainSummary> {
        ctx.minimize(loss, params)
    }

    /// Validated input function reading `options.features_file` (and the
    /// labels file) through this model's builders.
    fn input_fn(&self, options: InputOptions, resources: Resources) -> Result<InputFn<'_, Self>> {
        InputFn::new(self, options, resources)
    }

    /// Formats a prediction for output. Identity by default.
    fn format_prediction(
        &self,
        prediction: Self::Prediction,
        _params: Option<&serde_json::Value>,
    ) -> Self::Prediction {
        prediction
    }
}
