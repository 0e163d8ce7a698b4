use crate::reading::is_sentinel;
use std::collections::VecDeque;

pub const DEFAULT_WINDOW_SIZE: usize = 5;

/// Fixed-capacity FIFO of recent readings with a sentinel-excluding mean.
#[derive(Debug, Clone)]
pub struct SmoothingWindow {
    capacity: usize,
    values: VecDeque<f64>,
}

impl SmoothingWindow {
    /// Capacities below one are clamped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            values: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn push(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    /// Oldest first.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied()
    }

    pub fn average(&self) -> Option<f64> {
        let mut total = 0.0;
        let mut count = 0usize;
        for value in self.values.iter().copied().filter(|v| !is_sentinel(*v)) {
            total += value;
            count += 1;
        }
        if count == 0 {
            return None;
        }
        Some(total / count as f64)
    }
}

impl Default for SmoothingWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}
