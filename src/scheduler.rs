use std::collections::VecDeque;

use tracing::trace;

/// Hands out seeds to a bounded number of worker slots.
pub struct SeedScheduler {
    pending: VecDeque<u64>,
    free_workers: usize,
    running_matches: usize,
}

impl SeedScheduler {
    pub fn new(seeds: Vec<u64>, workers: usize) -> Self {
        SeedScheduler {
            pending: seeds.into(),
            free_workers: workers.max(1),
            running_matches: 0,
        }
    }

    /// Seeds that can start now.
    pub fn advance(&mut self) -> Vec<u64> {
        let mut matches_to_run = vec![];
        while self.free_workers > 0 {
            let Some(seed) = self.pending.pop_front() else {
                break;
            };
            self.free_workers -= 1;
            matches_to_run.push(seed);
        }
        self.running_matches += matches_to_run.len();
        trace!(?matches_to_run, pending = self.pending.len(), "advance");
        matches_to_run
    }

    /// A match finished: its worker slot is free again.
    pub fn on_result(&mut self) -> Vec<u64> {
        self.running_matches -= 1;
        self.free_workers += 1;
        self.advance()
    }

    /// All matches ran and finished
    pub fn is_finished(&self) -> bool {
        self.pending.is_empty() && self.running_matches == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_exceeds_worker_count() {
        let mut scheduler = SeedScheduler::new(vec![1, 2, 3, 4, 5], 2);
        assert_eq!(scheduler.advance(), vec![1, 2]);
        assert_eq!(scheduler.advance(), Vec::<u64>::new());
        assert_eq!(scheduler.on_result(), vec![3]);
        assert_eq!(scheduler.on_result(), vec![4]);
        assert_eq!(scheduler.on_result(), vec![5]);
        assert!(!scheduler.is_finished());
        assert!(scheduler.on_result().is_empty());
        assert!(scheduler.on_result().is_empty());
        assert!(scheduler.is_finished());
    }

    #[test]
    fn empty_batch_is_finished() {
        let mut scheduler = SeedScheduler::new(vec![], 4);
        assert!(scheduler.advance().is_empty());
        assert!(scheduler.is_finished());
    }
}
