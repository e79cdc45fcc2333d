// Rolling sample buffer
//
// Holds the most recent `horizon` samples in arrival order. Pushing past the
// horizon evicts from the front, so retained sequences stay contiguous.

use crate::types::Sample;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: VecDeque<Sample>,
    horizon: usize,
    evicted: u64,
}

impl SampleBuffer {
    pub fn new(horizon: usize) -> Self {
        let horizon = horizon.max(1);
        Self {
            samples: VecDeque::with_capacity(horizon.min(1 << 16)),
            horizon,
            evicted: 0,
        }
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Total samples dropped off the front since the last clear
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Append a sample, evicting the oldest ones past the horizon.
    /// Returns how many were evicted.
    pub fn push(&mut self, sample: Sample) -> usize {
        self.samples.push_back(sample);
        let mut dropped = 0;
        while self.samples.len() > self.horizon {
            self.samples.pop_front();
            dropped += 1;
        }
        self.evicted += dropped as u64;
        dropped
    }

    pub fn oldest(&self) -> Option<&Sample> {
        self.samples.front()
    }

    pub fn newest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    pub fn oldest_sequence(&self) -> Option<u64> {
        self.oldest().map(|s| s.sequence)
    }

    pub fn newest_sequence(&self) -> Option<u64> {
        self.newest().map(|s| s.sequence)
    }

    pub fn get(&self, index: usize) -> Option<&Sample> {
        self.samples.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    /// Samples at buffer indices `start..end`, clamped to the buffer
    pub fn slice(&self, start: usize, end: usize) -> impl Iterator<Item = &Sample> {
        let end = end.min(self.samples.len());
        let start = start.min(end);
        self.samples.range(start..end)
    }

    /// Latest sample taken at or before `at`
    pub fn latest_at_or_before(&self, at: DateTime<Utc>) -> Option<&Sample> {
        self.samples.iter().rev().find(|s| s.wall_clock <= at)
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.evicted = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Reading;
    use chrono::TimeDelta;

    fn sample(seq: u64, at: DateTime<Utc>) -> Sample {
        Sample::new(
            seq,
            at,
            Reading {
                position: Some(0.5),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_push_evicts_fifo() {
        let t0 = Utc::now();
        let mut buffer = SampleBuffer::new(3);
        for seq in 0..5 {
            buffer.push(sample(seq, t0));
        }
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.oldest_sequence(), Some(2));
        assert_eq!(buffer.newest_sequence(), Some(4));
        assert_eq!(buffer.evicted(), 2);
    }

    #[test]
    fn test_slice_is_clamped() {
        let t0 = Utc::now();
        let mut buffer = SampleBuffer::new(10);
        for seq in 0..4 {
            buffer.push(sample(seq, t0));
        }
        let seqs: Vec<u64> = buffer.slice(2, 99).map(|s| s.sequence).collect();
        assert_eq!(seqs, vec![2, 3]);
        assert_eq!(buffer.slice(7, 3).count(), 0);
    }

    #[test]
    fn test_latest_at_or_before() {
        let t0 = Utc::now();
        let mut buffer = SampleBuffer::new(10);
        for seq in 0..5 {
            buffer.push(sample(seq, t0 + TimeDelta::milliseconds(100 * seq as i64)));
        }
        let at = t0 + TimeDelta::milliseconds(250);
        assert_eq!(buffer.latest_at_or_before(at).map(|s| s.sequence), Some(2));
        assert!(buffer
            .latest_at_or_before(t0 - TimeDelta::seconds(1))
            .is_none());
    }
}
