//! # Training Counters
//!
//! Process-lifetime counters owned by a training run: the global step and
//! the total number of processed feature and label words.

use std::fmt;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{length_sum, Example};

/// Modality observed by a word counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modality {
    Features,
    Labels,
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Features => write!(f, "features"),
            Self::Labels => write!(f, "labels"),
        }
    }
}

/// Monotonic word counters for features and labels.
///
/// A counter only exists once a batch carrying a `length` field has been
/// observed for its modality.
#[derive(Debug, Default)]
pub struct WordCounters {
    features: OnceLock<AtomicU64>,
    labels: OnceLock<AtomicU64>,
}

/// Serializable copy of [`WordCounters`] for checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WordCountSnapshot {
    pub features: Option<u64>,
    pub labels: Option<u64>,
}

impl WordCounters {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, modality: Modality) -> &OnceLock<AtomicU64> {
        match modality {
            Modality::Features => &self.features,
            Modality::Labels => &self.labels,
        }
    }

    /// Adds `words` to the counter of `modality`, creating it if needed.
    pub fn add(&self, modality: Modality, words: u64) {
        self.slot(modality)
            .get_or_init(|| AtomicU64::new(0))
            .fetch_add(words, Ordering::Relaxed);
    }

    /// Current value, `None` if the counter was never created.
    pub fn get(&self, modality: Modality) -> Option<u64> {
        self.slot(modality)
            .get()
            .map(|counter| counter.load(Ordering::Relaxed))
    }

    /// Adds the batch sums of the `length` fields of `features` and `labels`.
    pub fn observe(&self, features: &Example, labels: Option<&Example>) -> Result<()> {
        if let Some(length) = features.length() {
            self.add(Modality::Features, length_sum(length)?.max(0) as u64);
        }
        if let Some(length) = labels.and_then(Example::length) {
            self.add(Modality::Labels, length_sum(length)?.max(0) as u64);
        }
        Ok(())
    }

    pub fn snapshot(&self) -> WordCountSnapshot {
        WordCountSnapshot {
            features: self.get(Modality::Features),
            labels: self.get(Modality::Labels),
        }
    }

    /// Rebuilds counters from a checkpoint snapshot.
    pub fn restore(snapshot: WordCountSnapshot) -> Self {
        let counters = Self::new();
        if let Some(words) = snapshot.features {
            counters.add(Modality::Features, words);
        }
        if let Some(words) = snapshot.labels {
            counters.add(Modality::Labels, words);
        }
        counters
    }
}

/// Global training step shared by the train op and the training driver.
#[derive(Debug, Default)]
pub struct GlobalStep(AtomicU64);

impl GlobalStep {
    pub fn new(step: u64) -> Self {
        Self(AtomicU64::new(step))
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// Increments the step and returns the new value.
    pub fn increment(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }
}
