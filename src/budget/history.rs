use std::collections::VecDeque;

/// Fixed-size ring of work samples covering one accounting horizon.
///
/// The sum estimates usage per horizon when a new limit arrives.
#[derive(Debug, Clone)]
pub struct UsageHistory {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl UsageHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        UsageHistory {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a sample, dropping the oldest once full
    pub fn add(&mut self, sample: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn sum(&self) -> f64 {
        self.samples.iter().sum()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
