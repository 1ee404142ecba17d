//! Transmit gate for capture audio.

use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::pipeline::Node;

/// Forwards items only while `transmitting` is set and counts what it holds
/// back.
///
/// Works on any frame type. A closed gate emits nothing, not even silence.
/// The count is shared so it stays readable after the gate has been moved
/// into a chain.
pub struct Gate<T> {
    transmitting: Arc<AtomicBool>,
    held_back: Arc<AtomicU64>,
    _frame: PhantomData<fn(T) -> T>,
}

impl<T> Gate<T> {
    pub fn new(transmitting: Arc<AtomicBool>) -> Self {
        Self {
            transmitting,
            held_back: Arc::new(AtomicU64::new(0)),
            _frame: PhantomData,
        }
    }

    /// Number of items dropped while closed.
    pub fn held_back(&self) -> Arc<AtomicU64> {
        self.held_back.clone()
    }
}

impl<T> Node for Gate<T> {
    type Input = T;
    type Output = T;

    fn process(&self, input: T) -> Option<T> {
        if !self.transmitting.load(Ordering::Acquire) {
            self.held_back.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        Some(input)
    }
}
