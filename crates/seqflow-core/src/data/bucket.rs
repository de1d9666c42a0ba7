//! Length bucketing.
//!
//! Examples are grouped by `length / bucket_width` so that each batch holds
//! sequences of similar length and pads less.

use std::collections::BTreeMap;

use crate::data::Element;
use crate::error::Result;
use crate::types::{scalar_length, LENGTH_FIELD};

/// Bucket width used when no maximum features length is configured.
pub const DEFAULT_BUCKET_WIDTH: usize = 10;

/// `ceil(maximum_features_length / num_buckets)`, or [`DEFAULT_BUCKET_WIDTH`].
pub fn bucket_width(maximum_features_length: Option<usize>, num_buckets: usize) -> usize {
    match maximum_features_length {
        Some(maximum) if maximum > 0 => maximum.div_ceil(num_buckets.max(1)),
        _ => DEFAULT_BUCKET_WIDTH,
    }
}

/// Bucket of a sequence of `length`. Lengths at or past the nominal maximum
/// all land in the overflow bucket `num_buckets`.
pub fn bucket_id(length: i64, bucket_width: usize, num_buckets: usize) -> usize {
    (length.max(0) as usize / bucket_width.max(1)).min(num_buckets)
}

/// Groups consecutive elements of the same bucket into windows of
/// `window_size`.
///
/// A window is released as soon as its bucket is full. Relative order within
/// a bucket is preserved. When the input ends, the remaining partial windows
/// are released in ascending bucket order.
pub struct GroupByWindow<I> {
    inner: I,
    window_size: usize,
    bucket_width: usize,
    num_buckets: usize,
    buckets: BTreeMap<usize, Vec<Element>>,
    exhausted: bool,
}

impl<I> GroupByWindow<I>
where
    I: Iterator<Item = Result<Element>>,
{
    pub fn new(inner: I, window_size: usize, bucket_width: usize, num_buckets: usize) -> Self {
        Self {
            inner,
            window_size: window_size.max(1),
            bucket_width,
            num_buckets,
            buckets: BTreeMap::new(),
            exhausted: false,
        }
    }

    fn key(&self, element: &Element) -> Result<usize> {
        let length = scalar_length(element.features.require(LENGTH_FIELD)?)?;
        Ok(bucket_id(length, self.bucket_width, self.num_buckets))
    }
}

impl<I> Iterator for GroupByWindow<I>
where
    I: Iterator<Item = Result<Element>>,
{
    type Item = Result<Vec<Element>>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.exhausted {
            match self.inner.next() {
                Some(Ok(element)) => {
                    let key = match self.key(&element) {
                        Ok(key) => key,
                        Err(e) => return Some(Err(e)),
                    };
                    let bucket = self.buckets.entry(key).or_default();
                    bucket.push(element);
                    if bucket.len() >= self.window_size {
                        return Some(Ok(std::mem::take(bucket)));
                    }
                }
                Some(Err(e)) => return Some(Err(e)),
                None => self.exhausted = true,
            }
        }

        while let Some((_, window)) = self.buckets.pop_first() {
            if !window.is_empty() {
                return Some(Ok(window));
            }
        }
        None
    }
}

/// Windows of `window_size` consecutive elements, the last one possibly shorter.
pub struct Chunks<I> {
    inner: I,
    window_size: usize,
    pending: Vec<Element>,
}

impl<I> Chunks<I>
where
    I: Iterator<Item = Result<Element>>,
{
    pub fn new(inner: I, window_size: usize) -> Self {
        Self {
            inner,
            window_size: window_size.max(1),
            pending: Vec::new(),
        }
    }
}

impl<I> Iterator for Chunks<I>
where
    I: Iterator<Item = Result<Element>>,
{
    type Item = Result<Vec<Element>>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pending.len() < self.window_size {
            match self.inner.next() {
                Some(Ok(element)) => self.pending.push(element),
                Some(Err(e)) => return Some(Err(e)),
                None => break,
            }
        }
        if self.pending.is_empty() {
            None
        } else {
            Some(Ok(std::mem::take(&mut self.pending)))
        }
    }
}
