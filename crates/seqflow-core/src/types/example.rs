//! # Examples
//!
//! An [`Example`] maps field names to tensors. Feature and label examples
//! are independent mappings paired by position in their source files.

use std::collections::BTreeMap;

use candle_core::{DType, Tensor};

use crate::error::{Result, SeqflowError};

/// Name of the field carrying the sequence length of an example.
pub const LENGTH_FIELD: &str = "length";

/// A mapping from field name to tensor value.
///
/// Before batching `length` is a rank-0 integer tensor; after batching it is
/// a rank-1 tensor with one entry per example.
#[derive(Debug, Clone, Default)]
pub struct Example {
    fields: BTreeMap<String, Tensor>,
}

impl Example {
    /// Create an empty example.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: Tensor) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert or replace a field, returning the previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: Tensor) -> Option<Tensor> {
        self.fields.insert(name.into(), value)
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.fields.get(name)
    }

    /// Like [`Example::get`] but fails with [`SeqflowError::MissingField`].
    pub fn require(&self, name: &str) -> Result<&Tensor> {
        self.get(name).ok_or_else(|| SeqflowError::missing(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// The `length` field, if this example carries one.
    pub fn length(&self) -> Option<&Tensor> {
        self.get(LENGTH_FIELD)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tensor)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(String, Tensor)> for Example {
    fn from_iter<I: IntoIterator<Item = (String, Tensor)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// Reads every element of an integer valued length tensor.
pub fn length_values(length: &Tensor) -> Result<Vec<i64>> {
    Ok(length.to_dtype(DType::I64)?.flatten_all()?.to_vec1::<i64>()?)
}

/// Reads a length tensor that must hold exactly one value.
pub fn scalar_length(length: &Tensor) -> Result<i64> {
    let values = length_values(length)?;
    match values.as_slice() {
        [value] => Ok(*value),
        _ => Err(SeqflowError::ShapeMismatch {
            field: LENGTH_FIELD.to_string(),
            reason: format!("expected a single length, got {} values", values.len()),
        }),
    }
}

/// Sum of all entries of a length tensor.
pub fn length_sum(length: &Tensor) -> Result<i64> {
    Ok(length_values(length)?.iter().sum())
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn length_accessors() {
        let example = Example::new()
            .with("ids", Tensor::new(&[4i64, 5, 6], &Device::Cpu).unwrap())
            .with(LENGTH_FIELD, Tensor::new(3i64, &Device::Cpu).unwrap());

        assert_eq!(example.len(), 2);
        assert_eq!(example.keys().collect::<Vec<_>>(), vec!["ids", "length"]);
        let length = example.length().unwrap();
        assert_eq!(scalar_length(length).unwrap(), 3);
        assert_eq!(length_sum(length).unwrap(), 3);
    }

    #[test]
    fn batched_length_sum() {
        let lengths = Tensor::new(&[2u32, 7, 1], &Device::Cpu).unwrap();
        assert_eq!(length_sum(&lengths).unwrap(), 10);
        assert!(scalar_length(&lengths).is_err());
    }

    #[test]
    fn require_reports_missing_field() {
        let err = Example::new().require(LENGTH_FIELD).unwrap_err();
        assert!(matches!(err, SeqflowError::MissingField { field } if field == "length"));
    }
}
