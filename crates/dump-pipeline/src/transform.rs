//! # Text transformers
//!
//! The per-page text cleanup is delegated to a [`Transformer`]. The pipeline
//! only relies on the contract `text -> Result<text, failure>`; how the text
//! is cleaned is up to the backend.
//!
//! Two backends ship with the crate:
//!
//! - [`ProcessTransformer`] spawns an external executable per call, pipes the
//!   body to its stdin and reads the cleaned text back from its combined
//!   stdout/stderr. A non-zero exit is a failure for that page only.
//! - [`FnTransformer`] wraps an in-process closure.
//!
//! Link delimiters are swapped for sentinel tokens before the text reaches a
//! transformer ([`escape_links`]) and swapped back afterwards
//! ([`restore_links`]), so a wikitext-aware transformer does not treat links
//! as its own markup.

use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, trace};

pub const LINK_OPEN: &str = "[[";
pub const LINK_CLOSE: &str = "]]";
pub const SENTINEL_OPEN: &str = "<SPEC_START>";
pub const SENTINEL_CLOSE: &str = "<SPEC_END>";

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Per-page transformation failure. Never fatal to the run.
#[derive(Error, Debug)]
pub enum TransformError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error talking to transformer: {0}")]
    Io(#[from] std::io::Error),

    #[error("transformer exited with {}", exit_code(.code))]
    Exit { code: Option<i32>, output: String },

    #[error("transformer timed out after {0:?}")]
    TimedOut(Duration),

    #[error("transformer produced invalid output: {0}")]
    InvalidOutput(String),

    #[error("{0}")]
    Other(String),
}

fn exit_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {code}"),
        None => "a signal".to_string(),
    }
}

impl TransformError {
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

/// A stateless, single-shot text transformation.
///
/// Implementations must tolerate concurrent calls; the pipeline runs one
/// call per worker at a time.
#[async_trait]
pub trait Transformer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn transform(&self, text: &str) -> Result<String, TransformError>;
}

/// Replace link delimiters with sentinel tokens.
pub fn escape_links(text: &str) -> String {
    text.replace(LINK_OPEN, SENTINEL_OPEN)
        .replace(LINK_CLOSE, SENTINEL_CLOSE)
}

/// Undo [`escape_links`].
pub fn restore_links(text: &str) -> String {
    text.replace(SENTINEL_OPEN, LINK_OPEN)
        .replace(SENTINEL_CLOSE, LINK_CLOSE)
}

/// Runs an external executable once per page.
///
/// The returned text is the child's full stdout followed by its full stderr.
/// The two streams are read separately, so their writes are not interleaved.
#[derive(Debug, Clone)]
pub struct ProcessTransformer {
    program: PathBuf,
    args: Vec<OsString>,
    timeout: Option<Duration>,
}

impl ProcessTransformer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: None,
        }
    }

    /// Extra arguments passed on every invocation.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Kill the child and fail the page if it runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &std::path::Path {
        &self.program
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(windows)]
        {
            cmd.creation_flags(CREATE_NO_WINDOW);
        }
        cmd
    }

    async fn invoke(&self, text: &str) -> Result<String, TransformError> {
        let mut child = self.command().spawn().map_err(|source| TransformError::Spawn {
            program: self.program.display().to_string(),
            source,
        })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransformError::other("transformer stdin was not captured"))?;

        // Feed stdin while collecting output so a chatty child cannot fill its
        // pipe and deadlock against us.
        let feed = async move {
            stdin.write_all(text.as_bytes()).await?;
            stdin.shutdown().await
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output?;

        let mut combined = output.stdout;
        combined.extend_from_slice(&output.stderr);
        let combined = String::from_utf8(combined)
            .map_err(|e| TransformError::InvalidOutput(e.to_string()))?;

        if !output.status.success() {
            return Err(TransformError::Exit {
                code: output.status.code(),
                output: combined,
            });
        }
        // A child that exits cleanly without reading all of stdin is fine;
        // anything else on the write side is a real failure.
        if let Err(e) = fed
            && e.kind() != std::io::ErrorKind::BrokenPipe
        {
            return Err(TransformError::Io(e));
        }

        Ok(combined)
    }
}

#[async_trait]
impl Transformer for ProcessTransformer {
    fn name(&self) -> &'static str {
        "ProcessTransformer"
    }

    async fn transform(&self, text: &str) -> Result<String, TransformError> {
        let start = Instant::now();
        trace!(program = %self.program.display(), bytes = text.len(), "Invoking transformer");

        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.invoke(text)).await {
                Ok(result) => result,
                Err(_) => Err(TransformError::TimedOut(limit)),
            },
            None => self.invoke(text).await,
        };

        debug!(
            program = %self.program.display(),
            elapsed = ?start.elapsed(),
            ok = result.is_ok(),
            "Transformer finished"
        );
        result
    }
}

/// In-process transformer backed by a closure.
pub struct FnTransformer<F> {
    name: &'static str,
    f: F,
}

impl<F> FnTransformer<F>
where
    F: Fn(&str) -> Result<String, TransformError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self {
            name: "FnTransformer",
            f,
        }
    }

    pub fn named(name: &'static str, f: F) -> Self {
        Self { name, f }
    }
}

#[async_trait]
impl<F> Transformer for FnTransformer<F>
where
    F: Fn(&str) -> Result<String, TransformError> + Send + Sync,
{
    fn name(&self) -> &'static str {
        self.name
    }

    async fn transform(&self, text: &str) -> Result<String, TransformError> {
        (self.f)(text)
    }
}
