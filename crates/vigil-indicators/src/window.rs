use std::collections::VecDeque;

use vigil_schemas::Bar;

/// Bounded ring of the most recent closed bars for one symbol/timeframe.
/// Oldest bars are dropped once `capacity` is exceeded, so memory use stays
/// flat regardless of how long a run lives.
#[derive(Debug, Clone)]
pub struct BarWindow {
    capacity: usize,
    bars: VecDeque<Bar>,
}

impl BarWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            bars: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, bar: Bar) {
        if self.bars.len() == self.capacity {
            self.bars.pop_front();
        }
        self.bars.push_back(bar);
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.back()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Closing prices in micros, oldest first.
    pub fn closes_micros(&self) -> Vec<i64> {
        self.bars.iter().map(|b| b.close_micros).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bar> {
        self.bars.iter()
    }
}
