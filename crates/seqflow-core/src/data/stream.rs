//! Stream adapters: positional pairing and epoch repetition.

use tracing::{debug, warn};

use crate::data::{Element, ExampleStream};
use crate::error::{Result, SeqflowError};

/// Pairs feature and label examples by position.
///
/// When one stream ends before the other, a single
/// [`SeqflowError::DataAlignment`] is yielded and the stream ends.
pub struct Zip {
    features: ExampleStream,
    labels: Option<ExampleStream>,
    paired: usize,
    done: bool,
}

impl Zip {
    pub fn new(features: ExampleStream, labels: Option<ExampleStream>) -> Self {
        Self {
            features,
            labels,
            paired: 0,
            done: false,
        }
    }
}

impl Iterator for Zip {
    type Item = Result<Element>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let Some(labels) = self.labels.as_mut() else {
            let features = self.features.next()?;
            self.paired += 1;
            return Some(features.map(|features| Element::new(features, None)));
        };

        match (self.features.next(), labels.next()) {
            (None, None) => {
                self.done = true;
                None
            }
            (Some(features), Some(labels)) => {
                self.paired += 1;
                Some(features.and_then(|features| {
                    labels.map(|labels| Element::new(features, Some(labels)))
                }))
            }
            (Some(_), None) => {
                self.done = true;
                Some(Err(SeqflowError::DataAlignment {
                    features: self.paired + 1,
                    labels: self.paired,
                }))
            }
            (None, Some(_)) => {
                self.done = true;
                Some(Err(SeqflowError::DataAlignment {
                    features: self.paired,
                    labels: self.paired + 1,
                }))
            }
        }
    }
}

/// Repeats the stream produced by `factory` forever, calling it once per epoch.
///
/// Ends if an epoch yields nothing, since repeating an empty input would
/// never produce an element. Ends after yielding the first error.
pub struct Repeat<F, I> {
    factory: F,
    current: Option<I>,
    epoch: u64,
    produced: bool,
    done: bool,
}

impl<F, I, T> Repeat<F, I>
where
    F: FnMut(u64) -> Result<I>,
    I: Iterator<Item = Result<T>>,
{
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            current: None,
            epoch: 0,
            produced: false,
            done: false,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

impl<F, I, T> Iterator for Repeat<F, I>
where
    F: FnMut(u64) -> Result<I>,
    I: Iterator<Item = Result<T>>,
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            if self.current.is_none() {
                match (self.factory)(self.epoch) {
                    Ok(stream) => {
                        self.current = Some(stream);
                        self.produced = false;
                    }
                    Err(e) => {
                        self.done = true;
                        return Some(Err(e));
                    }
                }
            }

            if let Some(item) = self.current.as_mut().and_then(Iterator::next) {
                self.produced = true;
                if item.is_err() {
                    self.done = true;
                    self.current = None;
                }
                return Some(item);
            }

            self.current = None;
            if !self.produced {
                warn!(epoch = self.epoch, "input epoch produced no examples, stopping");
                self.done = true;
                return None;
            }
            self.epoch += 1;
            debug!(epoch = self.epoch, "starting new input epoch");
        }
        None
    }
}

/// Ends the wrapped stream right after its first error.
pub struct FuseOnError<I> {
    inner: I,
    failed: bool,
}

impl<I> FuseOnError<I> {
    pub fn new(inner: I) -> Self {
        Self {
            inner,
            failed: false,
        }
    }
}

impl<I, T> Iterator for FuseOnError<I>
where
    I: Iterator<Item = Result<T>>,
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = self.inner.next()?;
        self.failed = item.is_err();
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Example;
    use candle_core::{Device, Tensor};

    fn stream(count: usize) -> ExampleStream {
        Box::new((0..count).map(|i| -> Result<Example> {
            Ok(Example::new().with("id", Tensor::new(i as i64, &Device::Cpu)?))
        }))
    }

    #[test]
    fn zip_pairs_by_position() {
        let elements: Vec<_> = Zip::new(stream(3), Some(stream(3)))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(elements.len(), 3);
        assert!(elements.iter().all(|e| e.labels.is_some()));
    }

    #[test]
    fn zip_without_labels() {
        let elements: Vec<_> = Zip::new(stream(2), None).collect::<Result<_>>().unwrap();
        assert_eq!(elements.len(), 2);
        assert!(elements[0].labels.is_none());
    }

    #[test]
    fn zip_length_mismatch_is_fatal() {
        let items: Vec<_> = Zip::new(stream(3), Some(stream(2))).collect();
        assert_eq!(items.len(), 3);
        assert!(matches!(
            items.last(),
            Some(Err(SeqflowError::DataAlignment { features: 3, labels: 2 }))
        ));
    }

    #[test]
    fn repeat_restarts_each_epoch() {
        let mut epochs = Vec::new();
        let items: Vec<u64> = Repeat::new(|epoch| {
            epochs.push(epoch);
            Ok((0..2u64).map(move |i| Ok(epoch * 10 + i)))
        })
        .take(5)
        .collect::<Result<_>>()
        .unwrap();
        assert_eq!(items, vec![0, 1, 10, 11, 20]);
        assert_eq!(epochs, vec![0, 1, 2]);
    }

    #[test]
    fn repeat_ends_after_an_error() {
        let mut opened = 0;
        let items: Vec<Result<u64>> = Repeat::new(|_| {
            opened += 1;
            Ok(vec![Ok(1), Err(SeqflowError::config("bad input")), Ok(2)].into_iter())
        })
        .collect();
        assert_eq!(items.len(), 2);
        assert!(items[1].is_err());
        assert_eq!(opened, 1);
    }

    #[test]
    fn fuse_on_error_drops_the_tail() {
        let input: Vec<Result<u64>> = vec![Ok(1), Err(SeqflowError::config("bad input")), Ok(2)];
        let items: Vec<_> = FuseOnError::new(input.into_iter()).collect();
        assert_eq!(items.len(), 2);
        assert!(matches!(items[0], Ok(1)));
        assert!(items[1].is_err());
    }

    #[test]
    fn repeat_stops_on_empty_epoch() {
        let items: Vec<Result<u64>> =
            Repeat::new(|_| Ok(std::iter::empty::<Result<u64>>())).collect();
        assert!(items.is_empty());
    }
}
