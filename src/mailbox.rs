//! Single-slot handoff of correction vectors from the message handlers to the
//! round loop.
//!
//! The slot is overwritten on every delivery and never cleared or expired: a
//! round that runs before the next delivery reuses the last vector. Each publish
//! is stamped with a sequence number so that consumers can tell a fresh vector
//! from one they have already applied.
use crate::message::Gradient;

use tai64::Tai64N;

use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, PartialEq)]
pub struct GradientVector {
    pub values: Vec<f64>,
    pub capture_time: Tai64N,
}

impl GradientVector {
    pub fn new(values: Vec<f64>) -> Self {
        GradientVector { values, capture_time: Tai64N::now() }
    }

    /// Component for an actuator slot, if the coordinator supplied one.
    pub fn component(&self, slot: usize) -> Option<f64> {
        self.values.get(slot).cloned()
    }
}

impl From<Gradient> for GradientVector {
    fn from(gradient: Gradient) -> Self {
        GradientVector { values: gradient.values, capture_time: gradient.capture_time }
    }
}

/// A published vector together with its publish sequence number (starting at 1).
#[derive(Debug, Clone, PartialEq)]
pub struct Stamped {
    pub seq: u64,
    pub vector: GradientVector,
}

#[derive(Debug, Default)]
struct Slot {
    published: u64,
    latest: Option<GradientVector>,
}

#[derive(Debug, Default)]
pub struct GradientMailbox {
    slot: Mutex<Slot>,
}

impl GradientMailbox {
    pub fn new() -> Self {
        GradientMailbox::default()
    }

    /// Replaces the stored vector and returns its sequence number.
    pub fn publish(&self, vector: GradientVector) -> u64 {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.published += 1;
        slot.latest = Some(vector);
        slot.published
    }

    /// The most recently published vector, or `None` before the first publish.
    /// Reading does not consume the vector.
    pub fn take_latest(&self) -> Option<Stamped> {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.latest.as_ref().map(|vector| Stamped { seq: slot.published, vector: vector.clone() })
    }

    pub fn published(&self) -> u64 {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).published
    }
}
