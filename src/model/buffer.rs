//! Sample buffer - bounded window of recent feature vectors.

use std::collections::VecDeque;

use crate::features::{FeatureVector, FEATURE_COUNT};

// ============================================================================
// SAMPLE BUFFER
// ============================================================================

/// Insertion-ordered ring of the most recent samples.
///
/// Capacity is fixed at construction; pushing past it evicts the oldest
/// entry. Exclusively owned by the batch model.
#[derive(Debug)]
pub struct SampleBuffer {
    samples: VecDeque<[f32; FEATURE_COUNT]>,
    capacity: usize,
}

impl SampleBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    pub fn push(&mut self, vector: &FeatureVector) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(vector.values);
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

    pub fn fill_percent(&self) -> f32 {
        if self.capacity == 0 {
            return 0.0;
        }
        (self.samples.len() as f32 / self.capacity as f32 * 100.0).min(100.0)
    }

    /// Oldest-first iteration over the window.
    pub fn iter(&self) -> impl Iterator<Item = &[f32; FEATURE_COUNT]> {
        self.samples.iter()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(tag: f32) -> FeatureVector {
        let mut values = [0.0; FEATURE_COUNT];
        values[0] = tag;
        FeatureVector::from_values(values)
    }

    #[test]
    fn test_eviction_drops_oldest() {
        let mut buffer = SampleBuffer::new(3);
        for tag in 0..5 {
            buffer.push(&vector(tag as f32));
        }
        assert_eq!(buffer.len(), 3);
        let tags: Vec<f32> = buffer.iter().map(|s| s[0]).collect();
        assert_eq!(tags, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_fill_percent() {
        let mut buffer = SampleBuffer::new(4);
        assert_eq!(buffer.fill_percent(), 0.0);
        buffer.push(&vector(1.0));
        buffer.push(&vector(2.0));
        assert_eq!(buffer.fill_percent(), 50.0);
    }
}
