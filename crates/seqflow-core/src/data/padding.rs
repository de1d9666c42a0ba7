//! Padded batching.

use candle_core::Tensor;

use crate::data::{Batch, Element};
use crate::error::{Result, SeqflowError};
use crate::types::{Example, PaddedShapes};

/// Stacks `examples` field by field, zero padding every dimension to the
/// size requested by `shapes`.
pub fn pad_examples(examples: &[&Example], shapes: &PaddedShapes) -> Result<Example> {
    for example in examples {
        shapes.check(example)?;
    }

    let mut batch = Example::new();
    for (name, shape) in shapes.iter() {
        let values = examples
            .iter()
            .map(|example| example.require(name))
            .collect::<Result<Vec<_>>>()?;

        let mut target = Vec::with_capacity(shape.rank());
        for (dim, fixed) in shape.dims().iter().enumerate() {
            let longest = values
                .iter()
                .map(|value| value.dim(dim))
                .collect::<candle_core::Result<Vec<_>>>()?
                .into_iter()
                .max()
                .unwrap_or(0);
            match fixed {
                Some(size) if longest > *size => {
                    return Err(SeqflowError::ShapeMismatch {
                        field: name.to_string(),
                        reason: format!("dimension {dim} is {longest}, larger than padded size {size}"),
                    });
                }
                Some(size) => target.push(*size),
                None => target.push(longest),
            }
        }

        let padded = values
            .into_iter()
            .map(|value| pad_to(value, &target))
            .collect::<Result<Vec<_>>>()?;
        batch.insert(name, Tensor::stack(padded.as_slice(), 0)?);
    }
    Ok(batch)
}

fn pad_to(value: &Tensor, target: &[usize]) -> Result<Tensor> {
    let mut padded = value.clone();
    for (dim, &size) in target.iter().enumerate() {
        let current = padded.dim(dim)?;
        if current < size {
            padded = padded.pad_with_zeros(dim, 0, size - current)?;
        }
    }
    Ok(padded)
}

/// Pads a window of elements into one batch.
pub fn pad_elements(
    elements: Vec<Element>,
    features_shapes: &PaddedShapes,
    labels_shapes: Option<&PaddedShapes>,
) -> Result<Batch> {
    let features: Vec<&Example> = elements.iter().map(|element| &element.features).collect();
    let features = pad_examples(&features, features_shapes)?;

    let labels = match labels_shapes {
        Some(shapes) => {
            let labels = elements
                .iter()
                .map(|element| {
                    element
                        .labels
                        .as_ref()
                        .ok_or_else(|| SeqflowError::config("element has no labels but labels shapes were given"))
                })
                .collect::<Result<Vec<_>>>()?;
            Some(pad_examples(&labels, shapes)?)
        }
        None => None,
    };

    Ok(Batch::new(features, labels, elements.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PaddedShape;
    use candle_core::Device;

    fn sequence(ids: &[i64]) -> Example {
        Example::new()
            .with("ids", Tensor::new(ids, &Device::Cpu).unwrap())
            .with("length", Tensor::new(ids.len() as i64, &Device::Cpu).unwrap())
    }

    fn shapes() -> PaddedShapes {
        PaddedShapes::new()
            .with("ids", PaddedShape::sequence())
            .with("length", PaddedShape::scalar())
    }

    #[test]
    fn pads_to_batch_maximum() {
        let a = sequence(&[1, 2]);
        let b = sequence(&[3, 4, 5, 6]);
        let batch = pad_examples(&[&a, &b], &shapes()).unwrap();

        let ids = batch.get("ids").unwrap();
        assert_eq!(ids.dims(), &[2, 4]);
        assert_eq!(
            ids.to_vec2::<i64>().unwrap(),
            vec![vec![1, 2, 0, 0], vec![3, 4, 5, 6]]
        );
        assert_eq!(batch.get("length").unwrap().to_vec1::<i64>().unwrap(), vec![2, 4]);
    }

    #[test]
    fn fixed_dimension_pads_and_bounds() {
        let shapes = PaddedShapes::new()
            .with("ids", PaddedShape::new(vec![Some(5)]))
            .with("length", PaddedShape::scalar());
        let batch = pad_examples(&[&sequence(&[1])], &shapes).unwrap();
        assert_eq!(batch.get("ids").unwrap().dims(), &[1, 5]);

        let too_long = sequence(&[1, 2, 3, 4, 5, 6]);
        assert!(matches!(
            pad_examples(&[&too_long], &shapes),
            Err(SeqflowError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn unaligned_keys_are_rejected() {
        let extra = sequence(&[1]).with("mask", Tensor::new(&[1i64], &Device::Cpu).unwrap());
        assert!(pad_examples(&[&extra], &shapes()).is_err());
    }

    #[test]
    fn pads_labels_independently() {
        let elements = vec![
            Element::new(sequence(&[1, 2, 3]), Some(sequence(&[9]))),
            Element::new(sequence(&[4]), Some(sequence(&[7, 8]))),
        ];
        let batch = pad_elements(elements, &shapes(), Some(&shapes())).unwrap();
        assert_eq!(batch.size(), 2);
        assert_eq!(batch.features.get("ids").unwrap().dims(), &[2, 3]);
        assert_eq!(batch.labels.unwrap().get("ids").unwrap().dims(), &[2, 2]);
    }
}
