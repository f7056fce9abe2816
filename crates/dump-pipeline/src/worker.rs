//! Transform workers.
//!
//! Each worker pulls pages from the handoff queue, applies the transform
//! policy and pushes one serialized page per survivor onto the result queue.
//! Workers share nothing but the two queues, so output order is whatever
//! order the workers happen to finish in.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::context::RunContext;
use crate::error::{PipelineError, Result};
use crate::record::Page;
use crate::transform::{Transformer, escape_links, restore_links};

/// What the transform policy did with a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Redirect stub, serialized untouched.
    Redirect(String),
    /// Body rewritten by the transformer and serialized.
    Transformed(String),
    /// Transformer failed; the page is not emitted.
    Dropped,
}

/// Counters reported by a worker when it exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub processed: u64,
    pub redirects: u64,
    pub transformed: u64,
    pub failed: u64,
}

impl WorkerStats {
    pub fn merge(&mut self, other: WorkerStats) {
        self.processed += other.processed;
        self.redirects += other.redirects;
        self.transformed += other.transformed;
        self.failed += other.failed;
    }
}

/// Apply the transform policy to one page.
///
/// Redirect stubs bypass the transformer. Everything else has its links
/// escaped, goes through the transformer, and has its links restored.
/// A transformer failure drops the page; a serialization failure is fatal.
pub async fn process_page(
    transformer: &dyn Transformer,
    mut page: Page,
    redirect_marker: &str,
) -> Result<Disposition> {
    if page.is_redirect(redirect_marker) {
        return Ok(Disposition::Redirect(page.to_xml()?));
    }

    let escaped = escape_links(page.body());
    match transformer.transform(&escaped).await {
        Ok(cleaned) => {
            page.set_body(restore_links(&cleaned));
            Ok(Disposition::Transformed(page.to_xml()?))
        }
        Err(e) => {
            warn!(
                title = %page.title,
                transformer = transformer.name(),
                error = %e,
                "Failed to transform page, skipping"
            );
            Ok(Disposition::Dropped)
        }
    }
}

/// Worker loop. Returns once the handoff queue is closed and drained, or
/// when the run is cancelled.
pub async fn run_worker(
    id: usize,
    ctx: Arc<RunContext>,
    transformer: Arc<dyn Transformer>,
    input: flume::Receiver<Page>,
    output: flume::Sender<String>,
    redirect_marker: Arc<str>,
) -> Result<WorkerStats> {
    debug!(worker = id, "Worker started");
    let mut stats = WorkerStats::default();

    loop {
        let page = tokio::select! {
            biased;
            _ = ctx.token.cancelled() => {
                debug!(worker = id, "Worker cancelled");
                return Err(PipelineError::Cancelled);
            }
            next = input.recv_async() => match next {
                Ok(page) => page,
                // Closed and empty.
                Err(_) => break,
            },
        };

        debug!(worker = id, title = %page.title, "Processing page");
        stats.processed += 1;

        let disposition = tokio::select! {
            biased;
            _ = ctx.token.cancelled() => {
                debug!(worker = id, "Worker cancelled mid-page");
                return Err(PipelineError::Cancelled);
            }
            result = process_page(transformer.as_ref(), page, &redirect_marker) => result,
        };

        let serialized = match disposition {
            Ok(Disposition::Redirect(xml)) => {
                stats.redirects += 1;
                xml
            }
            Ok(Disposition::Transformed(xml)) => {
                stats.transformed += 1;
                xml
            }
            Ok(Disposition::Dropped) => {
                stats.failed += 1;
                continue;
            }
            Err(e) => {
                // Serialization failures mean the output can no longer be
                // trusted; stop every stage.
                ctx.token.cancel();
                return Err(e);
            }
        };

        if output.send_async(serialized).await.is_err() {
            return Err(if ctx.is_cancelled() {
                PipelineError::Cancelled
            } else {
                PipelineError::ChannelClosed("result")
            });
        }
    }

    debug!(
        worker = id,
        processed = stats.processed,
        failed = stats.failed,
        "Worker exiting"
    );
    Ok(stats)
}
