use std::path::{Path, PathBuf};

use clap::Parser;

/// Deduplicate a MediaWiki XML dump and clean every page body through an
/// external transformer.
#[derive(Parser, Debug)]
#[command(name = "dumpfix", version, about)]
pub struct Args {
    /// Input dump to process
    #[arg(long = "in", value_name = "PATH", env = "DUMPFIX_IN")]
    pub input: PathBuf,

    /// Output dump to write
    #[arg(long = "out", value_name = "PATH", env = "DUMPFIX_OUT")]
    pub output: PathBuf,

    /// Number of concurrent transform workers
    #[arg(long, default_value_t = 1, env = "DUMPFIX_WORKERS")]
    pub workers: usize,

    /// Transformer executable. Defaults to `../scripts/parse_xml` relative to
    /// the directory of the input dump
    #[arg(long, value_name = "PATH", env = "DUMPFIX_TRANSFORMER")]
    pub transformer: Option<PathBuf>,

    /// Extra argument passed to the transformer (repeatable)
    #[arg(long = "transformer-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub transformer_args: Vec<String>,

    /// Kill a transformer call after this many seconds and skip the page
    #[arg(long, value_name = "SECS", env = "DUMPFIX_TRANSFORM_TIMEOUT")]
    pub transform_timeout: Option<u64>,

    /// Capacity of the internal queues (0 = hand pages over one at a time)
    #[arg(long, default_value_t = 0, env = "DUMPFIX_QUEUE_CAPACITY")]
    pub queue_capacity: usize,

    /// Enable debug logging
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Transformer path, falling back to the conventional location next to
    /// the dump directory.
    pub fn transformer_path(&self) -> PathBuf {
        match &self.transformer {
            Some(path) => path.clone(),
            None => default_transformer_path(&self.input),
        }
    }
}

/// `<dir of input>/../scripts/parse_xml`
pub fn default_transformer_path(input: &Path) -> PathBuf {
    let dir = input.parent().unwrap_or_else(|| Path::new(""));
    dir.join("..").join("scripts").join("parse_xml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_args() {
        let args = Args::try_parse_from(["dumpfix", "--in", "build/dump.xml", "--out", "out.xml"])
            .unwrap();
        assert_eq!(args.input, PathBuf::from("build/dump.xml"));
        assert_eq!(args.output, PathBuf::from("out.xml"));
        assert_eq!(args.workers, 1);
        assert_eq!(args.queue_capacity, 0);
        assert!(args.transform_timeout.is_none());
        assert_eq!(
            args.transformer_path(),
            PathBuf::from("build/../scripts/parse_xml")
        );
    }

    #[test]
    fn test_explicit_transformer_and_args() {
        let args = Args::try_parse_from([
            "dumpfix",
            "--in",
            "dump.xml",
            "--out",
            "out.xml",
            "--workers",
            "8",
            "--transformer",
            "/usr/local/bin/clean",
            "--transformer-arg",
            "--strict",
            "--transformer-arg",
            "en",
            "--transform-timeout",
            "30",
        ])
        .unwrap();
        assert_eq!(args.workers, 8);
        assert_eq!(args.transformer_path(), PathBuf::from("/usr/local/bin/clean"));
        assert_eq!(args.transformer_args, vec!["--strict", "en"]);
        assert_eq!(args.transform_timeout, Some(30));
    }

    #[test]
    fn test_bare_filename_input() {
        assert_eq!(
            default_transformer_path(Path::new("dump.xml")),
            PathBuf::from("../scripts/parse_xml")
        );
    }

    #[test]
    fn test_input_and_output_required() {
        assert!(Args::try_parse_from(["dumpfix", "--out", "out.xml"]).is_err());
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        let result = Args::try_parse_from([
            "dumpfix", "--in", "a.xml", "--out", "b.xml", "-v", "-q",
        ]);
        assert!(result.is_err());
    }
}
