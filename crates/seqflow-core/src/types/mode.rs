use std::fmt;

use serde::{Deserialize, Serialize};

/// Execution mode of a model invocation or an input pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Training: filtered, shuffled, repeated input and a train op.
    Train,
    /// Evaluation: single pass over labeled data.
    Eval,
    /// Inference: single pass over features only.
    Predict,
}

impl Mode {
    /// Returns `true` for [`Mode::Train`].
    #[must_use]
    pub fn is_training(self) -> bool {
        matches!(self, Self::Train)
    }

    /// Returns `true` when the mode consumes labels.
    #[must_use]
    pub fn requires_labels(self) -> bool {
        !matches!(self, Self::Predict)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Train => write!(f, "train"),
            Self::Eval => write!(f, "eval"),
            Self::Predict => write!(f, "predict"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_required_outside_predict() {
        assert!(Mode::Train.requires_labels());
        assert!(Mode::Eval.requires_labels());
        assert!(!Mode::Predict.requires_labels());
    }

    #[test]
    fn serde_uses_lowercase_names() {
        let json = serde_json::to_string(&Mode::Predict).unwrap();
        assert_eq!(json, "\"predict\"");
        let mode: Mode = serde_json::from_str("\"eval\"").unwrap();
        assert_eq!(mode, Mode::Eval);
        assert_eq!(Mode::Train.to_string(), "train");
    }
}
