//! Batch Scheduler - Runs work in fixed-size concurrent groups
//!
//! Items are split into groups of `max_concurrent`. Every item of a group
//! runs concurrently and the whole group settles before the next one starts,
//! so at most `max_concurrent` operations are ever in flight.

use futures::future::join_all;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Default group size
pub const DEFAULT_MAX_CONCURRENT: usize = 3;

/// Settled items plus the items a stop predicate prevented from starting
#[derive(Debug)]
pub struct BatchOutcome<T, O> {
    /// `(item, output)` pairs in input order
    pub completed: Vec<(T, O)>,
    /// Items never started, in input order
    pub skipped: Vec<T>,
}

/// Grouped concurrent executor
#[derive(Debug, Clone)]
pub struct BatchScheduler {
    max_concurrent: usize,
    delay_between_batches: Duration,
}

impl Default for BatchScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENT, Duration::ZERO)
    }
}

impl BatchScheduler {
    /// `max_concurrent` is raised to at least 1
    pub fn new(max_concurrent: usize, delay_between_batches: Duration) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            delay_between_batches,
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Run every item
    pub async fn run<T, F, Fut, O>(&self, items: Vec<T>, operation: F) -> Vec<(T, O)>
    where
        T: Clone,
        F: Fn(T) -> Fut,
        Fut: Future<Output = O>,
    {
        self.run_until(items, operation, |_| false).await.completed
    }

    /// Run groups until `stop` returns true for a settled group
    ///
    /// The group that triggered the stop is always kept in full; only later
    /// groups are skipped.
    pub async fn run_until<T, F, Fut, O, P>(
        &self,
        items: Vec<T>,
        operation: F,
        mut stop: P,
    ) -> BatchOutcome<T, O>
    where
        T: Clone,
        F: Fn(T) -> Fut,
        Fut: Future<Output = O>,
        P: FnMut(&[(T, O)]) -> bool,
    {
        let total_groups = items.len().div_ceil(self.max_concurrent);
        let mut remaining = items.into_iter().peekable();
        let mut completed = Vec::new();
        let mut group_index = 0;

        while remaining.peek().is_some() {
            if group_index > 0 && !self.delay_between_batches.is_zero() {
                sleep(self.delay_between_batches).await;
            }
            group_index += 1;

            let group: Vec<T> = remaining.by_ref().take(self.max_concurrent).collect();
            debug!(group = group_index, total_groups, size = group.len(), "starting batch");

            let outputs = join_all(group.iter().cloned().map(&operation)).await;
            let settled: Vec<(T, O)> = group.into_iter().zip(outputs).collect();

            let halt = stop(settled.as_slice());
            completed.extend(settled);

            if halt {
                let skipped: Vec<T> = remaining.collect();
                if !skipped.is_empty() {
                    debug!(group = group_index, skipped = skipped.len(), "stopping after batch");
                }
                return BatchOutcome { completed, skipped };
            }
        }

        BatchOutcome {
            completed,
            skipped: Vec::new(),
        }
    }
}
