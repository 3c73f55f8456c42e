//! Work queue, worker pool and the orchestration of a full scan.
//!
//! Data flow: paths are pushed onto the [`WorkQueue`], `k` workers pop them and
//! run the file processor, every [`ProcessingResult`] goes over a channel to the
//! single [`Aggregator`]. A run finishes in two phases: first the queue drains
//! (every item popped *and* completed), then the results channel drains (all
//! senders dropped and the aggregator joined).

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, warn};

use crate::aggregate::{Aggregator, ScanOutcome};
use crate::error::PoolError;
use crate::processor::{process_file, ErrorRecord, ProcessingResult};
use crate::progress::ScanProgress;

pub const MIN_THREADS: usize = 1;
pub const MAX_THREADS: usize = 20;

pub type WorkItem = PathBuf;

/// Function run by workers on every dequeued path.
pub type Processor = Arc<dyn Fn(&Path) -> ProcessingResult + Send + Sync>;

/// Configuration consumed by the scanning core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanConfig {
    pub threads: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            threads: MIN_THREADS,
        }
    }
}

impl ScanConfig {
    pub fn new(threads: usize) -> Result<Self, PoolError> {
        let config = ScanConfig { threads };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PoolError> {
        if (MIN_THREADS..=MAX_THREADS).contains(&self.threads) {
            Ok(())
        } else {
            Err(PoolError::InvalidThreadCount {
                requested: self.threads,
                min: MIN_THREADS,
                max: MAX_THREADS,
            })
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// FIFO queue of pending paths with task-completion tracking.
pub struct WorkQueue {
    sender: Mutex<Option<Sender<WorkItem>>>,
    receiver: Receiver<WorkItem>,
    pending: Mutex<usize>,
    drained: Condvar,
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkQueue {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        WorkQueue {
            sender: Mutex::new(Some(sender)),
            receiver,
            pending: Mutex::new(0),
            drained: Condvar::new(),
        }
    }

    /// Enqueues `item`. Hands the item back once the queue has been closed.
    pub fn push(&self, item: WorkItem) -> Result<(), WorkItem> {
        let sender = lock(&self.sender);
        let Some(tx) = sender.as_ref() else {
            return Err(item);
        };
        *lock(&self.pending) += 1;
        if let Err(rejected) = tx.send(item) {
            self.complete();
            return Err(rejected.into_inner());
        }
        Ok(())
    }

    /// Blocks until an item is available. `None` once closed and empty.
    pub fn pop(&self) -> Option<WorkItem> {
        self.receiver.recv().ok()
    }

    /// Marks one popped item as fully handled.
    pub fn complete(&self) {
        let mut pending = lock(&self.pending);
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.drained.notify_all();
        }
    }

    /// Number of pushed items not yet completed.
    #[cfg(test)]
    pub fn pending(&self) -> usize {
        *lock(&self.pending)
    }

    /// Blocks until every pushed item has been completed.
    pub fn wait_until_drained(&self) {
        let mut pending = lock(&self.pending);
        while *pending > 0 {
            pending = self
                .drained
                .wait(pending)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// No more items will arrive; idle workers wake up and exit.
    pub fn close(&self) {
        lock(&self.sender).take();
    }
}

/// Marks a popped item complete when dropped, including during unwinding.
struct CompletionGuard<'a> {
    queue: &'a WorkQueue,
}

impl Drop for CompletionGuard<'_> {
    fn drop(&mut self) {
        self.queue.complete();
    }
}

pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `size` workers. Fails before spawning anything on an invalid size.
    pub fn start(
        size: usize,
        queue: Arc<WorkQueue>,
        results: Sender<ProcessingResult>,
        processor: Processor,
        progress: Arc<ScanProgress>,
    ) -> Result<Self, PoolError> {
        ScanConfig { threads: size }.validate()?;

        let mut handles = Vec::with_capacity(size);
        for id in 0..size {
            let name = format!("pfrate-worker-{}", id);
            let queue_ref = Arc::clone(&queue);
            let results_tx = results.clone();
            let processor_ref = Arc::clone(&processor);
            let progress_ref = Arc::clone(&progress);
            let spawned = thread::Builder::new().name(name.clone()).spawn(move || {
                run_worker(&queue_ref, &results_tx, &processor_ref, &progress_ref)
            });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(source) => {
                    queue.close();
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(PoolError::Spawn { name, source });
                }
            }
        }
        debug!(workers = size, "worker pool started");
        Ok(WorkerPool { handles })
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Waits for every worker to exit; call after closing the queue.
    pub fn join(self) -> Result<(), PoolError> {
        let count = self
            .handles
            .into_iter()
            .map(JoinHandle::join)
            .filter(Result::is_err)
            .count();
        if count > 0 {
            return Err(PoolError::WorkerPanicked { count });
        }
        Ok(())
    }
}

fn run_worker(
    queue: &WorkQueue,
    results: &Sender<ProcessingResult>,
    processor: &Processor,
    progress: &ScanProgress,
) {
    while let Some(path) = queue.pop() {
        let _completion = CompletionGuard { queue };
        let result = panic::catch_unwind(AssertUnwindSafe(|| processor(path.as_path())))
            .unwrap_or_else(|_| {
                warn!(path = %path.display(), "processor panicked");
                ProcessingResult::failed(ErrorRecord::new(&path, "processor panicked"))
            });
        let lines = result.lines_scanned;
        if results.send(result).is_err() {
            warn!(path = %path.display(), "results channel closed; dropping result");
        }
        progress.file_done(&path, lines);
    }
}

/// Scans `paths` with the default file processor.
pub fn scan_files(
    paths: Vec<WorkItem>,
    config: &ScanConfig,
    progress: Arc<ScanProgress>,
) -> Result<ScanOutcome, PoolError> {
    scan_files_with(paths, config, Arc::new(process_file), progress)
}

/// Runs the full pipeline and returns the merged table and error list.
pub fn scan_files_with(
    paths: Vec<WorkItem>,
    config: &ScanConfig,
    processor: Processor,
    progress: Arc<ScanProgress>,
) -> Result<ScanOutcome, PoolError> {
    config.validate()?;

    let queue = Arc::new(WorkQueue::new());
    let (results_tx, results_rx) = unbounded();
    let aggregator = Aggregator::spawn(results_rx)?;

    let pool = match WorkerPool::start(
        config.threads,
        Arc::clone(&queue),
        results_tx.clone(),
        processor,
        progress,
    ) {
        Ok(pool) => pool,
        Err(err) => {
            drop(results_tx);
            let _ = aggregator.join();
            return Err(err);
        }
    };

    let total = paths.len();
    for path in paths {
        if let Err(rejected) = queue.push(path) {
            warn!(path = %rejected.display(), "work queue closed; file not scheduled");
        }
    }
    debug!(files = total, workers = pool.size(), "dispatched work items");

    queue.wait_until_drained();
    queue.close();
    let workers = pool.join();

    drop(results_tx);
    let outcome = aggregator
        .join()
        .map_err(|_| PoolError::AggregatorPanicked)?;
    workers?;
    Ok(outcome)
}
