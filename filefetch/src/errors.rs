/// Error types for the filefetch pipeline.
///
/// Errors fall into two groups:
///
/// 1. **Per-file errors** (`FileOpen`, `Encoding`) are raised while scanning a
///    single input file. The pipeline contains them: the file is logged and
///    skipped, and the run carries on with the remaining files.
///
/// 2. **Terminal errors** (`Io`, `PoolClosed`, `TaskPanicked`, configuration
///    errors) abort the run and are handed back to the caller:
///    ```rust,ignore
///    match run_pipeline(&files, "apple", &output) {
///        Ok(report) => println!("{} files skipped", report.files_skipped),
///        Err(FetchError::Io { stage, path, .. }) => // stage and file are known,
///        Err(e) => // anything else
///    }
///    ```
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for pipeline operations
pub type FetchResult<T> = Result<T, FetchError>;

/// Pipeline stage an I/O error happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Discover,
    Prepare,
    Scan,
    Aggregate,
    Dedup,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Discover => "discover",
            Stage::Prepare => "prepare",
            Stage::Scan => "scan",
            Stage::Aggregate => "aggregate",
            Stage::Dedup => "dedup",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while running the pipeline
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Cannot open {path}: {source}")]
    FileOpen {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Worker pool is closed")]
    PoolClosed,
    #[error("IO error during {stage} on {path}: {source}")]
    Io {
        stage: Stage,
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid UTF-8 in file {path}: {source}")]
    Encoding {
        path: PathBuf,
        source: std::str::Utf8Error,
    },
    #[error("Failed to spawn worker thread: {0}")]
    WorkerSpawn(std::io::Error),
    #[error("Task panicked: {0}")]
    TaskPanicked(String),
    #[error("Invalid keyword: {0}")]
    InvalidKeyword(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Configuration error: {0}")]
    ConfigLoad(#[from] config::ConfigError),
}

/// Canonicalize the path and strip UNC prefixes so that
/// comparisons on Windows are consistent.
pub fn unify_path(original: &Path) -> PathBuf {
    let canonical = original
        .canonicalize()
        .unwrap_or_else(|_| original.to_path_buf());
    strip_unc_prefix(&canonical)
}

/// Strips the Windows UNC prefix (\\?\) from a path if present
fn strip_unc_prefix(p: &Path) -> PathBuf {
    let s = p.display().to_string();
    if let Some(stripped) = s.strip_prefix(r"\\?\") {
        PathBuf::from(stripped)
    } else {
        p.to_path_buf()
    }
}

impl FetchError {
    pub fn file_open(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileOpen {
            path: path.into(),
            source,
        }
    }

    pub fn io(stage: Stage, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            stage,
            path: path.into(),
            source,
        }
    }

    pub fn encoding(path: impl Into<PathBuf>, source: std::str::Utf8Error) -> Self {
        let path = path.into();
        Self::Encoding {
            path: unify_path(&path),
            source,
        }
    }

    pub fn invalid_keyword(msg: impl Into<String>) -> Self {
        Self::InvalidKeyword(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the error only affects one input file and can be skipped
    pub fn is_per_file(&self) -> bool {
        matches!(self, Self::FileOpen { .. } | Self::Encoding { .. })
            || matches!(self, Self::Io { stage: Stage::Scan, .. })
    }
}
