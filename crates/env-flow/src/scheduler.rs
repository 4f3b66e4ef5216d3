//! Worker-pool scheduling: chunked map-reduce with dependency-handle collection.

use std::collections::BTreeSet;

use shale::{DependencyHandle, HandleSet};

use crate::configuration::Configuration;

/// Chunking policy for distributing inputs across workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    /// Lower bound on chunks handed to each worker.
    pub minimum_chunks_per_worker: usize,
    /// Lower bound on the number of inputs per chunk.
    pub minimum_chunk_size: usize,
    /// Preferred chunks per worker when inputs are plentiful.
    pub preferred_chunks_per_worker: usize,
}

impl Policy {
    /// A fixed-chunk-count policy.
    pub fn fixed_chunk_count(
        minimum_chunks_per_worker: usize,
        minimum_chunk_size: usize,
        preferred_chunks_per_worker: usize,
    ) -> Self {
        Policy {
            minimum_chunks_per_worker: minimum_chunks_per_worker.max(1),
            minimum_chunk_size: minimum_chunk_size.max(1),
            preferred_chunks_per_worker: preferred_chunks_per_worker.max(1),
        }
    }

    /// The chunk size to use for the given worker count and input length.
    fn chunk_size(&self, workers: usize, inputs: usize) -> usize {
        if inputs == 0 {
            return 1;
        }
        // The minimum chunk size dominates: never split below it, even if
        // that leaves workers idle.
        let max_chunks = inputs.div_ceil(self.minimum_chunk_size);
        let preferred = workers * self.preferred_chunks_per_worker;
        let floor = workers * self.minimum_chunks_per_worker;
        let chunks = floor.max(preferred.min(max_chunks)).min(max_chunks).max(1);
        inputs.div_ceil(chunks).max(1)
    }
}

/// Accumulates the dependency handles a worker touches during a map task.
#[derive(Debug, Default)]
pub struct HandleCollector {
    handles: BTreeSet<DependencyHandle>,
}

impl HandleCollector {
    /// Record a touched handle.
    pub fn record(&mut self, handle: DependencyHandle) {
        self.handles.insert(handle);
    }

    fn into_set(self) -> HandleSet {
        self.handles.into_iter().collect()
    }
}

/// Parallel worker coordinator.
///
/// The scheduler owns no threads; each map-reduce call spins up scoped workers
/// and joins them before returning, so borrowed inputs and closures work
/// without `'static` bounds.
#[derive(Debug, Clone)]
pub struct Scheduler {
    workers: usize,
}

impl Scheduler {
    /// A scheduler with the given worker count.
    pub fn new(workers: usize) -> Self {
        Scheduler {
            workers: workers.max(1),
        }
    }

    /// A single-worker scheduler that runs everything inline.
    pub fn serial() -> Self {
        Scheduler::new(1)
    }

    /// A scheduler sized by the configuration.
    pub fn from_configuration(configuration: &Configuration) -> Self {
        Scheduler::new(configuration.number_of_workers)
    }

    /// The number of workers map-reduce calls may use.
    pub fn number_of_workers(&self) -> usize {
        self.workers
    }

    /// Run `work` once on each worker, in parallel.
    pub fn once_per_worker(&self, work: impl Fn(usize) + Send + Sync) {
        if self.workers <= 1 {
            work(0);
            return;
        }
        std::thread::scope(|scope| {
            for worker in 0..self.workers {
                let work = &work;
                scope.spawn(move || work(worker));
            }
        });
    }

    /// Distribute `inputs` across workers in chunks, mapping each chunk and
    /// reducing the results into `initial`.
    pub fn map_reduce<I, R>(
        &self,
        policy: Policy,
        inputs: &[I],
        initial: R,
        map: impl Fn(&[I]) -> R + Send + Sync,
        reduce: impl Fn(R, R) -> R,
    ) -> R
    where
        I: Sync,
        R: Send,
    {
        let (result, _) = self.collected_map_reduce(
            policy,
            inputs,
            initial,
            |_, chunk| map(chunk),
            reduce,
        );
        result
    }

    /// Like [`Scheduler::map_reduce`], but each map invocation also accumulates
    /// the set of dependency handles touched during the work; the union of all
    /// locally collected sets is returned alongside the reduced result.
    pub fn collected_map_reduce<I, R>(
        &self,
        policy: Policy,
        inputs: &[I],
        initial: R,
        map: impl Fn(&mut HandleCollector, &[I]) -> R + Send + Sync,
        reduce: impl Fn(R, R) -> R,
    ) -> (R, HandleSet)
    where
        I: Sync,
        R: Send,
    {
        if inputs.is_empty() {
            return (initial, HandleSet::new());
        }
        let chunk_size = policy.chunk_size(self.workers, inputs.len());
        let chunks: Vec<&[I]> = inputs.chunks(chunk_size).collect();

        if self.workers <= 1 || chunks.len() <= 1 {
            let mut collector = HandleCollector::default();
            let mut result = initial;
            for chunk in chunks {
                let mapped = map(&mut collector, chunk);
                result = reduce(result, mapped);
            }
            return (result, collector.into_set());
        }

        let worker_count = self.workers.min(chunks.len());
        let outputs: Vec<(Vec<R>, HandleSet)> = std::thread::scope(|scope| {
            let chunks = &chunks;
            let map = &map;
            (0..worker_count)
                .map(|worker| {
                    scope.spawn(move || {
                        let mut collector = HandleCollector::default();
                        let mut mapped = Vec::new();
                        // Workers take chunks in a fixed stride, so the result
                        // order is deterministic for a given worker count.
                        for chunk in chunks.iter().skip(worker).step_by(worker_count) {
                            mapped.push(map(&mut collector, chunk));
                        }
                        (mapped, collector.into_set())
                    })
                })
                .collect::<Vec<_>>()
                .into_iter()
                .map(|join| join.join().expect("scheduler worker panicked"))
                .collect()
        });

        let mut result = initial;
        let mut collected = HandleSet::new();
        for (mapped, handles) in outputs {
            for value in mapped {
                result = reduce(result, value);
            }
            collected = collected.union(&handles);
        }
        (result, collected)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_chunk_size_respects_minimum() {
        let policy = Policy::fixed_chunk_count(1, 100, 5);
        // 50 inputs never split below the minimum chunk size.
        assert_eq!(policy.chunk_size(4, 50), 50);
        // Plenty of inputs: preferred chunk count of 20 over 4 workers.
        assert_eq!(policy.chunk_size(4, 20_000), 1_000);
    }

    #[test]
    fn test_map_reduce_sums() {
        let inputs: Vec<u64> = (0..1_000).collect();
        for workers in [1, 4] {
            let scheduler = Scheduler::new(workers);
            let total = scheduler.map_reduce(
                Policy::fixed_chunk_count(1, 10, 5),
                &inputs,
                0,
                |chunk| chunk.iter().sum::<u64>(),
                |a, b| a + b,
            );
            assert_eq!(total, 499_500);
        }
    }

    #[test]
    fn test_collected_handles_are_unioned() {
        let inputs: Vec<u32> = (0..500).collect();
        let scheduler = Scheduler::new(4);
        let (_, collected) = scheduler.collected_map_reduce(
            Policy::fixed_chunk_count(1, 10, 5),
            &inputs,
            (),
            |collector, chunk| {
                for input in chunk {
                    collector.record(DependencyHandle(input % 7));
                }
            },
            |(), ()| (),
        );
        assert_eq!(collected.len(), 7);
    }

    #[test]
    fn test_once_per_worker_runs_each_worker() {
        let scheduler = Scheduler::new(3);
        let count = AtomicUsize::new(0);
        scheduler.once_per_worker(|_| {
            count.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}
