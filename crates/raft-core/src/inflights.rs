//! # inflights
//!
//! why: bound how many append batches a leader pipelines to one follower
//! relations: owned by progress.rs, which consults it while replicating
//! what: Inflights, a bounded FIFO of the last index of each in-flight batch

use std::collections::VecDeque;

use crate::fatal;

/// Indices of unacknowledged append batches, oldest first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inflights {
    queue: VecDeque<u64>,
    cap: usize,
}

impl Inflights {
    pub fn new(cap: usize) -> Self {
        Self { queue: VecDeque::with_capacity(cap), cap }
    }

    /// Record a batch ending at `inflight`; callers must check `full()` first
    pub fn push(&mut self, inflight: u64) {
        if self.full() {
            fatal!("cannot add {} into a full inflights window (cap {})", inflight, self.cap);
        }
        self.queue.push_back(inflight);
    }

    /// Drop every batch acknowledged by a cumulative ack of `to`
    pub fn pop_to(&mut self, to: u64) {
        while self.queue.front().is_some_and(|&front| front <= to) {
            self.queue.pop_front();
        }
    }

    /// Drop only the oldest batch
    pub fn pop_first_one(&mut self) {
        self.queue.pop_front();
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub fn full(&self) -> bool {
        self.queue.len() == self.cap
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(ins: &Inflights) -> Vec<u64> {
        ins.queue.iter().copied().collect()
    }

    #[test]
    fn push_until_full() {
        let mut ins = Inflights::new(3);
        ins.push(1);
        ins.push(2);
        assert!(!ins.full());
        ins.push(3);
        assert!(ins.full());
        assert_eq!(ins.len(), 3);
    }

    #[test]
    #[should_panic(expected = "full inflights")]
    fn push_into_full_window_is_fatal() {
        let mut ins = Inflights::new(1);
        ins.push(1);
        ins.push(2);
    }

    #[test]
    fn pop_to_is_cumulative() {
        let mut ins = Inflights::new(10);
        for i in [5, 10, 15, 20] {
            ins.push(i);
        }

        ins.pop_to(12);
        assert_eq!(contents(&ins), vec![15, 20]);

        ins.pop_to(15);
        assert_eq!(contents(&ins), vec![20]);
    }

    #[test]
    fn pop_to_below_oldest_keeps_everything() {
        let mut ins = Inflights::new(10);
        ins.push(5);
        ins.push(6);

        ins.pop_to(4);
        assert_eq!(contents(&ins), vec![5, 6]);
    }

    #[test]
    fn pop_first_one_frees_oldest_slot() {
        let mut ins = Inflights::new(2);
        ins.push(7);
        ins.push(8);

        ins.pop_first_one();
        assert!(!ins.full());
        assert_eq!(contents(&ins), vec![8]);

        ins.clear();
        ins.pop_first_one();
        assert!(ins.is_empty());
    }
}
