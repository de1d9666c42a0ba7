use serde::{Deserialize, Serialize};

use crate::decay::DecayConfig;
use crate::error::{Result, SeqflowError};

/// Training hyper-parameters consumed by the train op builder.
///
/// Every key is optional when parsed; missing keys are reported when the
/// train op is built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainParams {
    pub learning_rate: Option<f64>,
    /// Optimizer name: `sgd`, `adam` or `adamw`.
    pub optimizer: Option<String>,
    /// Maximum global gradient norm.
    pub clip_gradients: Option<f64>,
    /// Decay strategy name, no decay when absent.
    pub decay_type: Option<String>,
    pub decay_rate: Option<f64>,
    pub decay_steps: Option<u64>,
    pub staircase: Option<bool>,
    pub start_decay_steps: Option<u64>,
    pub minimum_learning_rate: Option<f64>,
}

fn missing_key(key: &str) -> SeqflowError {
    SeqflowError::config(format!("missing required training parameter: {key}"))
}

impl TrainParams {
    pub fn new(learning_rate: f64, optimizer: impl Into<String>) -> Self {
        Self {
            learning_rate: Some(learning_rate),
            optimizer: Some(optimizer.into()),
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_clip_gradients(mut self, clip_gradients: f64) -> Self {
        self.clip_gradients = Some(clip_gradients);
        self
    }

    /// Sets every decay key from `config`.
    pub fn with_decay(mut self, config: DecayConfig) -> Self {
        self.decay_type = Some(config.decay_type);
        self.decay_rate = Some(config.decay_rate);
        self.decay_steps = Some(config.decay_steps);
        self.staircase = Some(config.staircase);
        self.start_decay_steps = Some(config.start_decay_steps);
        self.minimum_learning_rate = Some(config.minimum_learning_rate);
        self
    }

    pub fn learning_rate(&self) -> Result<f64> {
        self.learning_rate.ok_or_else(|| missing_key("learning_rate"))
    }

    pub fn optimizer(&self) -> Result<&str> {
        self.optimizer
            .as_deref()
            .ok_or_else(|| missing_key("optimizer"))
    }

    /// Decay configuration, `None` when `decay_type` is not set.
    pub fn decay_config(&self) -> Result<Option<DecayConfig>> {
        let Some(decay_type) = &self.decay_type else {
            return Ok(None);
        };
        let decay_rate = self.decay_rate.ok_or_else(|| missing_key("decay_rate"))?;
        let decay_steps = self.decay_steps.ok_or_else(|| missing_key("decay_steps"))?;
        Ok(Some(
            DecayConfig::new(decay_type.clone(), decay_rate, decay_steps)
                .with_staircase(self.staircase.unwrap_or(true))
                .with_start_decay_steps(self.start_decay_steps.unwrap_or(0))
                .with_minimum_learning_rate(self.minimum_learning_rate.unwrap_or(0.0)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_json() {
        let params = TrainParams::from_json(
            r#"{"learning_rate": 1.0, "optimizer": "sgd", "decay_type": "exponential_decay",
                "decay_rate": 0.7, "decay_steps": 1000}"#,
        )
        .unwrap();
        assert_eq!(params.learning_rate().unwrap(), 1.0);
        let decay = params.decay_config().unwrap().unwrap();
        assert!(decay.staircase);
        assert_eq!(decay.start_decay_steps, 0);
        assert_eq!(decay.minimum_learning_rate, 0.0);
    }

    #[test]
    fn missing_keys_are_config_errors() {
        let params = TrainParams::default();
        assert!(matches!(params.learning_rate(), Err(SeqflowError::Configuration(_))));
        assert!(matches!(params.optimizer(), Err(SeqflowError::Configuration(_))));
        assert!(params.decay_config().unwrap().is_none());

        let params = TrainParams {
            decay_type: Some("exponential_decay".into()),
            ..TrainParams::default()
        };
        let err = params.decay_config().unwrap_err();
        assert!(err.to_string().contains("decay_rate"));
    }
}
