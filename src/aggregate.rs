//! Single-writer merge of per-file results into the global table.

use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;
use tracing::debug;

use crate::error::PoolError;
use crate::processor::{ErrorRecord, ProcessingResult};
use crate::table::OccurrenceTable;

/// Final product of a run, handed to the reporter.
#[derive(Debug, Default, Clone)]
pub struct ScanOutcome {
    pub table: OccurrenceTable,
    pub errors: Vec<ErrorRecord>,
    pub files_processed: u64,
    pub lines_scanned: u64,
}

/// Owns the global table and error list; nothing else mutates them.
#[derive(Debug, Default)]
pub struct Aggregator {
    outcome: ScanOutcome,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn absorb(&mut self, result: ProcessingResult) {
        let outcome = &mut self.outcome;
        outcome.files_processed += 1;
        outcome.lines_scanned += result.lines_scanned;
        if !result.delta.is_empty() {
            outcome.table.merge(&result.delta);
        }
        if let Some(error) = result.error {
            outcome.errors.push(error);
        }
    }

    pub fn finish(self) -> ScanOutcome {
        self.outcome
    }

    /// Drains `results` on a dedicated thread until every sender is dropped.
    pub fn spawn(
        results: Receiver<ProcessingResult>,
    ) -> Result<JoinHandle<ScanOutcome>, PoolError> {
        let name = "pfrate-aggregator".to_string();
        thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let mut aggregator = Aggregator::new();
                for result in results.iter() {
                    aggregator.absorb(result);
                }
                let outcome = aggregator.finish();
                debug!(
                    files = outcome.files_processed,
                    functions = outcome.table.len(),
                    errors = outcome.errors.len(),
                    "aggregator drained results channel"
                );
                outcome
            })
            .map_err(|source| PoolError::Spawn { name, source })
    }
}
