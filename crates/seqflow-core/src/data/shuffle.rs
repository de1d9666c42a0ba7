//! Buffer-bounded shuffling.

use std::time::{SystemTime, UNIX_EPOCH};

use oorandom::Rand64;

/// Seed derived from the wall clock, different on every run.
pub fn time_seed() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default()
}

/// Shuffles a stream through a reservoir of at most `capacity` items.
///
/// Only items currently held in the buffer can be reordered, so an item can
/// never be emitted more than `capacity - 1` positions earlier than its input
/// position. A capacity of 0 or 1 keeps the input order.
pub struct ShuffleBuffer<I: Iterator> {
    inner: I,
    buffer: Vec<I::Item>,
    capacity: usize,
    rng: Rand64,
    exhausted: bool,
}

impl<I: Iterator> ShuffleBuffer<I> {
    pub fn new(inner: I, capacity: usize, seed: u128) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner,
            buffer: Vec::with_capacity(capacity.min(4096)),
            capacity,
            rng: Rand64::new(seed),
            exhausted: false,
        }
    }
}

impl<I: Iterator> Iterator for ShuffleBuffer<I> {
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.exhausted && self.buffer.len() < self.capacity {
            match self.inner.next() {
                Some(item) => self.buffer.push(item),
                None => self.exhausted = true,
            }
        }
        if self.buffer.is_empty() {
            return None;
        }
        let index = self.rng.rand_range(0..self.buffer.len() as u64) as usize;
        Some(self.buffer.swap_remove(index))
    }
}
