//! Fixed-capacity rolling window of price samples.

use std::collections::VecDeque;

use rust_decimal::Decimal;

use crate::market::PriceSample;

/// Rolling buffer of the most recent `capacity` samples, oldest first.
///
/// Timestamps are kept non-decreasing: a sample stamped earlier than the newest
/// one is clamped to the newest timestamp on insert.
#[derive(Debug, Clone)]
pub struct PriceWindow {
    samples: VecDeque<PriceSample>,
    capacity: usize,
}

impl PriceWindow {
    /// Create an empty window. A zero capacity is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest when full.
    pub fn record(&mut self, mut sample: PriceSample) {
        if let Some(latest) = self.samples.back() {
            if sample.timestamp < latest.timestamp {
                sample.timestamp = latest.timestamp;
            }
        }

        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// Median of the current prices, `None` when empty.
    pub fn median(&self) -> Option<Decimal> {
        if self.samples.is_empty() {
            return None;
        }

        let mut prices: Vec<Decimal> = self.samples.iter().map(|s| s.price).collect();
        prices.sort_unstable();

        let mid = prices.len() / 2;
        if prices.len() % 2 == 1 {
            Some(prices[mid])
        } else {
            Some((prices[mid - 1] + prices[mid]) / Decimal::TWO)
        }
    }

    /// True once the window holds `capacity` samples.
    pub fn is_warm(&self) -> bool {
        self.samples.len() == self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recent sample.
    pub fn latest(&self) -> Option<&PriceSample> {
        self.samples.back()
    }

    /// Prices, oldest to newest.
    pub fn prices(&self) -> Vec<Decimal> {
        self.samples.iter().map(|s| s.price).collect()
    }

    /// Drop every sample.
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
