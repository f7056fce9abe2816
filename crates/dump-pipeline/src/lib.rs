//! # Dump Pipeline
//!
//! Streaming transformation pipeline for MediaWiki XML dumps. Pages are read
//! one at a time, deduplicated by title, cleaned by a pluggable text
//! transformer and written back out as a new dump. Nothing is buffered in
//! bulk, so dumps far larger than memory can be processed.
//!
//! ## Stages
//!
//! - [`DumpDecoder`] streams `<page>` elements and applies the dedup gate
//! - [`run_worker`] applies the transform policy (redirect short-circuit or
//!   delegate to a [`Transformer`])
//! - [`DumpWriter`] frames the surviving pages with a fixed header/trailer
//! - [`DumpPipeline`] owns the queues and the shutdown order
//!
//! Output order is not input order: pages are written as workers finish them.
//!
//! ## License
//!
//! MIT OR Apache-2.0

pub mod config;
mod context;
pub mod decoder;
pub mod error;
pub mod pipeline;
pub mod record;
mod run_completion;
pub mod transform;
pub mod worker;
pub mod writer;

#[cfg(test)]
mod test_utils;

pub use config::PipelineConfig;
pub use context::RunContext;
pub use decoder::{DecoderStats, DedupSet, DumpDecoder};
pub use error::{PipelineError, Result};
pub use pipeline::{DumpPipeline, PipelineState};
pub use record::{Contributor, Page, PageText, Redirect, Revision};
pub use run_completion::RunSummary;
pub use transform::{FnTransformer, ProcessTransformer, TransformError, Transformer};
pub use worker::{Disposition, WorkerStats, process_page, run_worker};
pub use writer::{DumpWriter, WriterStats};

/// Re-exported so callers can build a [`RunContext`] without a direct
/// `tokio-util` dependency.
pub use tokio_util::sync::CancellationToken;
