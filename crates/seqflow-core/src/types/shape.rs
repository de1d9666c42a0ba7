use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SeqflowError};
use crate::types::Example;

/// Padding rule for one field: one entry per dimension, `None` pads the
/// dimension to the longest example of the batch, `Some(n)` pads to `n`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PaddedShape(Vec<Option<usize>>);

impl PaddedShape {
    pub fn new(dims: Vec<Option<usize>>) -> Self {
        Self(dims)
    }

    /// Shape of a rank-0 field such as `length`.
    pub fn scalar() -> Self {
        Self(Vec::new())
    }

    /// Rank-1 field padded to the batch maximum (e.g. token ids).
    pub fn sequence() -> Self {
        Self(vec![None])
    }

    pub fn dims(&self) -> &[Option<usize>] {
        &self.0
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }
}

/// Padded shapes of every field of an example stream.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PaddedShapes {
    fields: BTreeMap<String, PaddedShape>,
}

impl PaddedShapes {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, shape: PaddedShape) -> Self {
        self.fields.insert(name.into(), shape);
        self
    }

    pub fn get(&self, name: &str) -> Option<&PaddedShape> {
        self.fields.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PaddedShape)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Checks that `example` has exactly the fields described here, with
    /// matching ranks.
    pub fn check(&self, example: &Example) -> Result<()> {
        for (name, value) in example.iter() {
            let shape = self.get(name).ok_or_else(|| SeqflowError::ShapeMismatch {
                field: name.to_string(),
                reason: "field has no padded shape".to_string(),
            })?;
            if shape.rank() != value.rank() {
                return Err(SeqflowError::ShapeMismatch {
                    field: name.to_string(),
                    reason: format!(
                        "padded shape has rank {} but value has rank {}",
                        shape.rank(),
                        value.rank()
                    ),
                });
            }
        }
        if let Some((name, _)) = self.iter().find(|(name, _)| !example.contains(name)) {
            return Err(SeqflowError::missing(name));
        }
        Ok(())
    }
}
