//! Training-time example filtering.

use candle_core::Tensor;

use crate::error::Result;
use crate::types::{length_values, Example};

/// Returns `true` when the example should be kept for training.
///
/// Each modality carrying a `length` field must have `length > 0` and, when a
/// bound is given, `length <= bound`. Modalities without `length` impose no
/// condition, so an example with no length signal at all is always kept.
pub fn filter_example(
    features: &Example,
    labels: Option<&Example>,
    maximum_features_length: Option<usize>,
    maximum_labels_length: Option<usize>,
) -> Result<bool> {
    Ok(
        length_within(features.length(), maximum_features_length)?
            && length_within(labels.and_then(Example::length), maximum_labels_length)?,
    )
}

fn length_within(length: Option<&Tensor>, maximum: Option<usize>) -> Result<bool> {
    let Some(length) = length else {
        return Ok(true);
    };
    let values = length_values(length)?;
    Ok(values
        .iter()
        .all(|&value| {
            value > 0 && maximum.is_none_or(|max| i64::try_from(max).map_or(true, |max| value <= max))
        }))
}
