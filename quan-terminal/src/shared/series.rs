/// Rolling (label, value) series backing a chart
use std::collections::VecDeque;

/// Fixed-capacity FIFO time series stored as two parallel sequences
#[derive(Debug, Clone)]
pub struct RollingSeries {
    /// Maximum number of points to keep
    capacity: usize,
    labels: VecDeque<String>,
    values: VecDeque<f64>,
}

impl RollingSeries {
    /// Create a new series with the specified capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            labels: VecDeque::with_capacity(capacity),
            values: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a point, evicting the oldest first when at capacity
    pub fn push(&mut self, label: impl Into<String>, value: f64) {
        if self.capacity == 0 {
            return;
        }

        if self.values.len() >= self.capacity {
            self.labels.pop_front();
            self.values.pop_front();
        }

        self.labels.push_back(label.into());
        self.values.push_back(value);
        debug_assert_eq!(self.labels.len(), self.values.len());
    }

    pub fn clear(&mut self) {
        self.labels.clear();
        self.values.clear();
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

    pub fn labels(&self) -> impl ExactSizeIterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }

    pub fn values(&self) -> impl ExactSizeIterator<Item = f64> + '_ {
        self.values.iter().copied()
    }

    /// Most recent point
    pub fn last(&self) -> Option<(&str, f64)> {
        Some((self.labels.back()?.as_str(), *self.values.back()?))
    }

    /// Points in insertion order, oldest first
    pub fn points(&self) -> Vec<(&str, f64)> {
        self.labels().zip(self.values()).collect()
    }
}
