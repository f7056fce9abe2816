mod cli;
mod error;

use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use dump_pipeline::{
    CancellationToken, DumpPipeline, PipelineConfig, ProcessTransformer, RunContext,
};
use tracing::{Level, error, info, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::{
    cli::Args,
    error::{AppError, Result},
};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = init_logging(args.verbose, args.quiet) {
        eprintln!("Error: {e}");
        process::exit(1);
    }

    if let Err(e) = run(args).await {
        error!("Application error: {}", e);
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    if !args.input.is_file() {
        return Err(AppError::InvalidInput(format!(
            "input dump {} does not exist",
            args.input.display()
        )));
    }

    let transformer_path = args.transformer_path();
    if !transformer_path.exists() {
        warn!(
            path = %transformer_path.display(),
            "Transformer not found; every non-redirect page will be skipped"
        );
    }

    let transformer = ProcessTransformer::new(&transformer_path)
        .with_args(&args.transformer_args)
        .with_timeout(args.transform_timeout.map(Duration::from_secs));

    let config = PipelineConfig::default()
        .with_workers(args.workers)
        .with_queue_capacity(args.queue_capacity);

    let token = CancellationToken::new();
    let context = Arc::new(RunContext::with_name(
        args.input.display().to_string(),
        token.clone(),
    ));

    // First Ctrl-C asks every stage to stop; the writer still closes the
    // output document.
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            token.cancel();
        }
    });

    info!(
        input = %args.input.display(),
        output = %args.output.display(),
        transformer = %transformer_path.display(),
        workers = args.workers,
        "Starting dump pipeline"
    );

    let summary = DumpPipeline::new(config, Arc::new(transformer))
        .with_context(context)
        .run(&args.input, &args.output)
        .await?;

    info!(
        written = summary.written,
        duplicates = summary.duplicates,
        failed = summary.failed,
        "Done"
    );
    Ok(())
}

fn init_logging(verbose: bool, quiet: bool) -> Result<()> {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbose),
        )
        .try_init()
        .map_err(|e| AppError::Logging(e.to_string()))
}
