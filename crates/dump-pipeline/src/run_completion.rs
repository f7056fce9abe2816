use std::time::Duration;

use crate::decoder::DecoderStats;
use crate::error::{PipelineError, Result};
use crate::worker::WorkerStats;
use crate::writer::WriterStats;

/// End-of-run counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub pages_read: u64,
    pub duplicates: u64,
    pub redirects: u64,
    pub transformed: u64,
    pub failed: u64,
    pub written: u64,
    pub bytes_written: u64,
    pub elapsed: Duration,
}

/// Resolve the stage outcomes of a run into one result.
///
/// Semantics:
/// - A writer failure wins; everything else is a consequence of it.
/// - Otherwise the first root-cause error from the decoder, then the workers.
/// - Otherwise, if any stage only reported cancellation or a closed queue,
///   the run was cancelled.
/// - If every stage succeeded, the merged counters are returned.
pub(crate) fn settle_run(
    writer: Result<WriterStats>,
    decoder: Result<DecoderStats>,
    workers: Vec<Result<WorkerStats>>,
    elapsed: Duration,
) -> Result<RunSummary> {
    let writer = writer?;

    let mut secondary: Option<PipelineError> = None;
    let mut keep_secondary = |err: PipelineError| -> Result<()> {
        if err.is_secondary() {
            secondary.get_or_insert(err);
            Ok(())
        } else {
            Err(err)
        }
    };

    let decoder = match decoder {
        Ok(stats) => Some(stats),
        Err(err) => {
            keep_secondary(err)?;
            None
        }
    };

    let mut merged = WorkerStats::default();
    for result in workers {
        match result {
            Ok(stats) => merged.merge(stats),
            Err(err) => keep_secondary(err)?,
        }
    }

    if secondary.is_some() {
        return Err(PipelineError::Cancelled);
    }
    let decoder = decoder.unwrap_or_default();

    Ok(RunSummary {
        pages_read: decoder.pages_read,
        duplicates: decoder.duplicates,
        redirects: merged.redirects,
        transformed: merged.transformed,
        failed: merged.failed,
        written: writer.records_written,
        bytes_written: writer.bytes_written,
        elapsed,
    })
}
