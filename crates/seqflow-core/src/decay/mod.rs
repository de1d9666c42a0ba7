//! # Learning Rate Decay
//!
//! Maps a base learning rate and the global step to a decayed learning rate.
//! Strategies are looked up by name in a [`DecayRegistry`]: the standard
//! strategies first, then the custom ones.

pub mod schedules;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SeqflowError};

pub use schedules::DecayFn;

fn default_staircase() -> bool {
    true
}

/// Parameters of a decay policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecayConfig {
    /// Registry name of the strategy, e.g. `exponential_decay`.
    pub decay_type: String,
    pub decay_rate: f64,
    pub decay_steps: u64,
    /// Decay in discrete steps of `decay_steps` instead of continuously.
    #[serde(default = "default_staircase")]
    pub staircase: bool,
    /// Steps to wait before decay starts counting.
    #[serde(default)]
    pub start_decay_steps: u64,
    /// Floor of the decayed learning rate.
    #[serde(default)]
    pub minimum_learning_rate: f64,
}

impl DecayConfig {
    /// Create a staircase configuration that starts decaying immediately.
    pub fn new(decay_type: impl Into<String>, decay_rate: f64, decay_steps: u64) -> Self {
        Self {
            decay_type: decay_type.into(),
            decay_rate,
            decay_steps,
            staircase: true,
            start_decay_steps: 0,
            minimum_learning_rate: 0.0,
        }
    }

    pub fn with_staircase(mut self, staircase: bool) -> Self {
        self.staircase = staircase;
        self
    }

    pub fn with_start_decay_steps(mut self, start_decay_steps: u64) -> Self {
        self.start_decay_steps = start_decay_steps;
        self
    }

    pub fn with_minimum_learning_rate(mut self, minimum_learning_rate: f64) -> Self {
        self.minimum_learning_rate = minimum_learning_rate;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.decay_steps == 0 {
            return Err(SeqflowError::config("decay_steps must be greater than 0"));
        }
        if self.decay_rate < 0.0 || !self.decay_rate.is_finite() {
            return Err(SeqflowError::config(format!(
                "decay_rate must be a non-negative number, got {}",
                self.decay_rate
            )));
        }
        if self.minimum_learning_rate < 0.0 || !self.minimum_learning_rate.is_finite() {
            return Err(SeqflowError::config(format!(
                "minimum_learning_rate must be a non-negative number, got {}",
                self.minimum_learning_rate
            )));
        }
        Ok(())
    }
}

/// Name to strategy lookup with two namespaces.
#[derive(Debug, Clone)]
pub struct DecayRegistry {
    standard: BTreeMap<&'static str, DecayFn>,
    custom: BTreeMap<String, DecayFn>,
}

impl Default for DecayRegistry {
    fn default() -> Self {
        let standard: BTreeMap<&'static str, DecayFn> = BTreeMap::from([
            ("exponential_decay", schedules::exponential_decay as DecayFn),
            ("inverse_time_decay", schedules::inverse_time_decay as DecayFn),
            ("natural_exp_decay", schedules::natural_exp_decay as DecayFn),
            ("polynomial_decay", schedules::polynomial_decay as DecayFn),
        ]);
        let custom: BTreeMap<String, DecayFn> = BTreeMap::from([
            ("noam_decay".to_string(), schedules::noam_decay as DecayFn),
            ("rsqrt_decay".to_string(), schedules::rsqrt_decay as DecayFn),
        ]);
        Self { standard, custom }
    }
}

impl DecayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a custom strategy. Standard names cannot be shadowed.
    pub fn register(&mut self, name: impl Into<String>, decay: DecayFn) -> Result<()> {
        let name = name.into();
        if self.standard.contains_key(name.as_str()) {
            return Err(SeqflowError::config(format!(
                "{name} is a standard decay function and cannot be overridden"
            )));
        }
        self.custom.insert(name, decay);
        Ok(())
    }

    /// Looks `name` up among standard strategies, then custom ones.
    pub fn resolve(&self, name: &str) -> Result<DecayFn> {
        self.standard
            .get(name)
            .or_else(|| self.custom.get(name))
            .copied()
            .ok_or_else(|| SeqflowError::config(format!("unknown decay function: {name}")))
    }

    /// All registered names, standard first.
    pub fn names(&self) -> Vec<&str> {
        self.standard
            .keys()
            .copied()
            .chain(self.custom.keys().map(String::as_str))
            .collect()
    }
}

/// A resolved decay policy: `f(base_learning_rate, global_step)`.
#[derive(Debug, Clone)]
pub struct LearningRateDecay {
    decay: DecayFn,
    config: DecayConfig,
}

impl LearningRateDecay {
    pub fn config(&self) -> &DecayConfig {
        &self.config
    }

    /// Decayed learning rate at `global_step`, never below the configured minimum.
    pub fn apply(&self, learning_rate: f64, global_step: u64) -> f64 {
        let step = global_step.saturating_sub(self.config.start_decay_steps);
        let decayed = (self.decay)(
            learning_rate,
            step,
            self.config.decay_steps,
            self.config.decay_rate,
            self.config.staircase,
        );
        decayed.max(self.config.minimum_learning_rate)
    }
}

/// Resolves `config.decay_type` in `registry` and returns the decay function.
pub fn learning_rate_decay_fn(
    registry: &DecayRegistry,
    config: DecayConfig,
) -> Result<LearningRateDecay> {
    config.validate()?;
    let decay = registry.resolve(&config.decay_type)?;
    debug!(
        decay_type = %config.decay_type,
        decay_rate = config.decay_rate,
        decay_steps = config.decay_steps,
        staircase = config.staircase,
        start_decay_steps = config.start_decay_steps,
        "resolved learning rate decay"
    );
    Ok(LearningRateDecay { decay, config })
}

/// Learning rate for `global_step`: decayed when a policy is set, `learning_rate` otherwise.
pub fn effective_learning_rate(
    decay: Option<&LearningRateDecay>,
    learning_rate: f64,
    global_step: u64,
) -> f64 {
    decay.map_or(learning_rate, |decay| decay.apply(learning_rate, global_step))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decay(config: DecayConfig) -> LearningRateDecay {
        learning_rate_decay_fn(&DecayRegistry::default(), config).unwrap()
    }

    #[test]
    fn no_decay_before_start_step() {
        let decay = decay(
            DecayConfig::new("exponential_decay", 0.5, 10)
                .with_staircase(false)
                .with_start_decay_steps(100),
        );
        let at_zero = decay.apply(1.0, 0);
        for step in [0, 1, 50, 99, 100] {
            assert_eq!(decay.apply(1.0, step), at_zero);
        }
        assert!(decay.apply(1.0, 101) < at_zero);
    }

    #[test]
    fn never_below_minimum() {
        let decay = decay(
            DecayConfig::new("exponential_decay", 0.1, 1).with_minimum_learning_rate(1e-4),
        );
        for step in [0, 1, 2, 10, 1_000, 1_000_000] {
            assert!(decay.apply(1.0, step) >= 1e-4);
        }
        assert_eq!(decay.apply(1.0, 1_000_000), 1e-4);
    }

    #[test]
    fn unknown_decay_type_is_config_error() {
        let err = learning_rate_decay_fn(
            &DecayRegistry::default(),
            DecayConfig::new("cosine_restarts", 0.5, 10),
        )
        .unwrap_err();
        assert!(matches!(err, SeqflowError::Configuration(msg) if msg.contains("cosine_restarts")));
    }

    #[test]
    fn absent_decay_keeps_base_rate() {
        for step in [0, 10, 10_000] {
            assert_eq!(effective_learning_rate(None, 0.3, step), 0.3);
        }
    }

    #[test]
    fn custom_strategies_resolve_after_standard() {
        let mut registry = DecayRegistry::default();
        assert!(registry.resolve("noam_decay").is_ok());
        assert!(registry
            .register("exponential_decay", schedules::rsqrt_decay)
            .is_err());

        fn halve(lr: f64, _: u64, _: u64, _: f64, _: bool) -> f64 {
            lr / 2.0
        }
        registry.register("halve", halve).unwrap();
        let decay = learning_rate_decay_fn(&registry, DecayConfig::new("halve", 0.0, 1)).unwrap();
        assert_eq!(decay.apply(1.0, 5), 0.5);
        assert_eq!(registry.names().first(), Some(&"exponential_decay"));
    }

    #[test]
    fn invalid_configuration_fails_fast() {
        let registry = DecayRegistry::default();
        assert!(learning_rate_decay_fn(&registry, DecayConfig::new("exponential_decay", 0.5, 0)).is_err());
        assert!(learning_rate_decay_fn(
            &registry,
            DecayConfig::new("exponential_decay", 0.5, 10).with_minimum_learning_rate(-1.0)
        )
        .is_err());
    }
}
