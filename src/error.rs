use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures that stop a run before or while the worker pool is set up.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("thread count must be {min}..{max}, got {requested}")]
    InvalidThreadCount {
        requested: usize,
        min: usize,
        max: usize,
    },

    #[error("failed to spawn {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("{count} worker thread(s) panicked")]
    WorkerPanicked { count: usize },

    #[error("aggregator thread panicked")]
    AggregatorPanicked,
}

/// Usage and path problems found while collecting input files.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("at least one path must be specified")]
    NoPaths,

    #[error("at least one file must be specified; or use -r")]
    NoFiles,

    #[error("{}", describe_disallowed(.0))]
    DisallowedExtension(Vec<PathBuf>),

    #[error("Invalid filespec pattern '{pattern}': {source}")]
    InvalidFilespec {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
}

fn describe_disallowed(files: &[PathBuf]) -> String {
    let names: Vec<String> = files.iter().map(|p| p.display().to_string()).collect();
    let (verb, noun) = if files.len() == 1 {
        ("is", "file")
    } else {
        ("are", "files")
    };
    format!("{} - {} not {} with allowed extension", names.join(", "), verb, noun)
}

impl From<PoolError> for io::Error {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::InvalidThreadCount { .. } => {
                io::Error::new(io::ErrorKind::InvalidInput, err)
            }
            other => io::Error::other(other),
        }
    }
}

impl From<DiscoveryError> for io::Error {
    fn from(err: DiscoveryError) -> Self {
        io::Error::new(io::ErrorKind::InvalidInput, err)
    }
}
