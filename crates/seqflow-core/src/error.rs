use thiserror::Error;

/// Errors that can occur while building input pipelines or training ops.
#[derive(Debug, Error)]
pub enum SeqflowError {
    /// Invalid or incomplete configuration: unknown decay type, missing
    /// labels file, missing parameter keys, out of range bounds.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The features and labels streams do not have the same number of examples.
    #[error("features and labels are not aligned: {features} feature examples but {labels} label examples")]
    DataAlignment {
        /// Number of feature examples read before the mismatch was detected.
        features: usize,
        /// Number of label examples read before the mismatch was detected.
        labels: usize,
    },

    /// An example is missing a field the pipeline needs.
    #[error("example is missing the {field:?} field")]
    MissingField {
        /// Name of the missing field.
        field: String,
    },

    /// An example does not fit its padded shape spec.
    #[error("shape mismatch for field {field:?}: {reason}")]
    ShapeMismatch {
        /// Field whose shape is inconsistent.
        field: String,
        /// Human readable description of the inconsistency.
        reason: String,
    },

    /// I/O failure while reading an input file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Candle tensor runtime error.
    #[error("tensor error: {0}")]
    Candle(#[from] candle_core::Error),
}

impl SeqflowError {
    /// Shorthand for a [`SeqflowError::Configuration`] error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Shorthand for a [`SeqflowError::MissingField`] error.
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }
}

/// Result type alias for seqflow operations.
pub type Result<T> = std::result::Result<T, SeqflowError>;
