//! # Pipeline coordinator
//!
//! Wires the stages together:
//!
//! ```text
//! input -> decoder -> handoff queue -> workers (xN) -> result queue -> writer -> output
//! ```
//!
//! The decoder and the writer run on blocking threads with synchronous I/O;
//! the workers are async tasks because their only suspension points are the
//! queues and the transformer call. Both queues are bounded `flume` channels,
//! so a slow transformer pushes back all the way to the decoder.
//!
//! The result queue is closed only after every worker has exited: the
//! coordinator keeps its own sender alive until the worker set is fully
//! joined, then drops it, which lets the writer emit the trailer and finish.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::context::RunContext;
use crate::decoder::DumpDecoder;
use crate::error::{PipelineError, Result};
use crate::run_completion::{RunSummary, settle_run};
use crate::transform::Transformer;
use crate::worker::{WorkerStats, run_worker};
use crate::writer::DumpWriter;

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    /// Decoder, workers and writer all active.
    Running,
    /// Handoff queue closed; workers finishing in-flight pages.
    Draining,
    /// Result queue closed and the writer has finished.
    Done,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Idle => write!(f, "idle"),
            PipelineState::Running => write!(f, "running"),
            PipelineState::Draining => write!(f, "draining"),
            PipelineState::Done => write!(f, "done"),
        }
    }
}

/// Streaming dedup + transform pipeline over one dump.
pub struct DumpPipeline {
    config: PipelineConfig,
    context: Arc<RunContext>,
    transformer: Arc<dyn Transformer>,
    state: PipelineState,
}

impl DumpPipeline {
    pub fn new(config: PipelineConfig, transformer: Arc<dyn Transformer>) -> Self {
        Self {
            config,
            context: Arc::new(RunContext::default()),
            transformer,
            state: PipelineState::Idle,
        }
    }

    /// Use an externally owned context, e.g. to cancel the run from a signal
    /// handler.
    pub fn with_context(mut self, context: Arc<RunContext>) -> Self {
        self.context = context;
        self
    }

    pub fn context(&self) -> &Arc<RunContext> {
        &self.context
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Run over files. Both the input and the output are opened before any
    /// stage starts, so a bad path fails the run without side effects on the
    /// other file.
    pub async fn run(
        self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> Result<RunSummary> {
        self.config.validate()?;
        let input = input.as_ref();
        let output = output.as_ref();

        let reader = File::open(input).map_err(|source| PipelineError::OpenInput {
            path: input.to_path_buf(),
            source,
        })?;
        let writer = File::create(output).map_err(|source| PipelineError::CreateOutput {
            path: output.to_path_buf(),
            source,
        })?;
        info!(input = %input.display(), output = %output.display(), "Opened dump files");

        let reader = BufReader::with_capacity(self.config.read_buffer_size, reader);
        self.run_with(reader, BufWriter::new(writer)).await
    }

    /// Run over arbitrary reader and writer handles.
    pub async fn run_with<R, W>(mut self, input: R, output: W) -> Result<RunSummary>
    where
        R: BufRead + Send + 'static,
        W: Write + Send + 'static,
    {
        self.config.validate()?;
        let start = Instant::now();
        let ctx = self.context.clone();

        let (page_tx, page_rx) = flume::bounded(self.config.handoff_capacity);
        let (result_tx, result_rx) = flume::bounded::<String>(self.config.result_capacity);

        self.transition(PipelineState::Running);

        let writer_ctx = ctx.clone();
        let writer_task = tokio::task::spawn_blocking(move || {
            let result = DumpWriter::new(output).run(result_rx);
            if result.is_err() {
                writer_ctx.token.cancel();
            }
            result
        });

        let marker: Arc<str> = Arc::from(self.config.redirect_marker.as_str());
        let mut workers = JoinSet::new();
        for id in 0..self.config.workers {
            workers.spawn(run_worker(
                id,
                ctx.clone(),
                self.transformer.clone(),
                page_rx.clone(),
                result_tx.clone(),
                marker.clone(),
            ));
        }
        // Workers hold the only receivers, so the decoder notices if they
        // all go away.
        drop(page_rx);
        info!(
            workers = self.config.workers,
            transformer = self.transformer.name(),
            "Workers started"
        );

        let decoder_ctx = ctx.clone();
        let decoder_task = tokio::task::spawn_blocking(move || {
            let result = DumpDecoder::new(input).run(&decoder_ctx, page_tx);
            if let Err(e) = &result
                && !e.is_secondary()
            {
                decoder_ctx.token.cancel();
            }
            result
        });

        let decoder_result = decoder_task.await.unwrap_or_else(|e| Err(e.into()));
        self.transition(PipelineState::Draining);

        let mut worker_results: Vec<Result<WorkerStats>> = Vec::with_capacity(self.config.workers);
        while let Some(joined) = workers.join_next().await {
            let result = joined.unwrap_or_else(|e| Err(e.into()));
            if let Err(e) = &result
                && !e.is_secondary()
            {
                ctx.token.cancel();
            }
            worker_results.push(result);
        }
        debug!("All workers exited, closing result queue");
        drop(result_tx);

        let writer_result = writer_task.await.unwrap_or_else(|e| Err(e.into()));
        self.transition(PipelineState::Done);

        let summary = settle_run(writer_result, decoder_result, worker_results, start.elapsed())?;
        info!(
            dump = %ctx.name,
            pages_read = summary.pages_read,
            duplicates = summary.duplicates,
            redirects = summary.redirects,
            transformed = summary.transformed,
            failed = summary.failed,
            written = summary.written,
            elapsed = ?summary.elapsed,
            "Pipeline finished"
        );
        Ok(summary)
    }

    fn transition(&mut self, next: PipelineState) {
        debug!(from = %self.state, to = %next, "Pipeline state change");
        self.state = next;
    }
}
