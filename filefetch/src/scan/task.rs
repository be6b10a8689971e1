use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace, warn};

use super::matcher::KeywordMatcher;
use super::store::{store_path, IntermediateStore, StoreIndexer, StoreWriter};
use crate::config::EncodingMode;
use crate::errors::{FetchError, FetchResult, Stage};
use crate::metrics::PipelineMetrics;

const BUFFER_CAPACITY: usize = 65536;

/// State shared by every scan task of one run
#[derive(Debug, Clone)]
pub struct ScanContext {
    matcher: Arc<KeywordMatcher>,
    store_dir: Arc<Path>,
    encoding_mode: EncodingMode,
    metrics: PipelineMetrics,
    indexer: Arc<StoreIndexer>,
}

impl ScanContext {
    pub fn new(
        matcher: KeywordMatcher,
        store_dir: &Path,
        encoding_mode: EncodingMode,
        metrics: PipelineMetrics,
    ) -> Self {
        Self {
            matcher: Arc::new(matcher),
            store_dir: Arc::from(store_dir),
            encoding_mode,
            metrics,
            indexer: Arc::new(StoreIndexer::new()),
        }
    }

    /// Creates the task for `path`, fixing its store index now so the merge
    /// order follows creation order rather than completion order
    pub fn task(&self, path: impl Into<PathBuf>) -> ScanTask {
        ScanTask {
            index: self.indexer.next_index(),
            path: path.into(),
            context: self.clone(),
        }
    }
}

/// What a scan task hands back to the orchestrator
#[derive(Debug)]
pub enum ScanOutcome {
    Scanned {
        store: IntermediateStore,
        path: PathBuf,
        lines_read: usize,
    },
    Skipped {
        index: usize,
        path: PathBuf,
        reason: String,
    },
}

/// Scans one input file into its own intermediate store
#[derive(Debug)]
pub struct ScanTask {
    index: usize,
    path: PathBuf,
    context: ScanContext,
}

#[derive(Debug, Default)]
struct LineCounts {
    bytes: usize,
    lines: usize,
}

impl ScanTask {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs the scan. Per-file failures are logged and reported as
    /// [`ScanOutcome::Skipped`]; they never escape as errors.
    pub fn run(self) -> ScanOutcome {
        match self.scan() {
            Ok((store, counts)) => {
                self.context.metrics.record_file_scanned(
                    counts.bytes as u64,
                    counts.lines as u64,
                    store.line_count() as u64,
                );
                debug!(
                    "Scanned {} ({} of {} lines matched) into store {}",
                    self.path.display(),
                    store.line_count(),
                    counts.lines,
                    store.index()
                );
                ScanOutcome::Scanned {
                    store,
                    path: self.path,
                    lines_read: counts.lines,
                }
            }
            Err(e) => {
                warn!("Skipping {}: {}", self.path.display(), e);
                self.context.metrics.record_file_skipped();
                ScanOutcome::Skipped {
                    index: self.index,
                    path: self.path,
                    reason: e.to_string(),
                }
            }
        }
    }

    fn scan(&self) -> FetchResult<(IntermediateStore, LineCounts)> {
        trace!("Scanning {} as task {}", self.path.display(), self.index);
        let file = File::open(&self.path).map_err(|e| FetchError::file_open(&self.path, e))?;
        let mut reader = BufReader::with_capacity(BUFFER_CAPACITY, file);

        // The store only comes into existence once the input is readable
        let mut writer = StoreWriter::create(&self.context.store_dir, self.index).map_err(|e| {
            FetchError::file_open(store_path(&self.context.store_dir, self.index), e)
        })?;

        match self.fill(&mut reader, &mut writer) {
            Ok(counts) => {
                let store_file = writer.path().to_path_buf();
                let store = writer
                    .finish()
                    .map_err(|e| FetchError::io(Stage::Scan, store_file, e))?;
                Ok((store, counts))
            }
            Err(e) => {
                writer.discard();
                Err(e)
            }
        }
    }

    fn fill(&self, reader: &mut impl BufRead, writer: &mut StoreWriter) -> FetchResult<LineCounts> {
        let mut counts = LineCounts::default();
        let mut buffer = Vec::with_capacity(256);
        let mut reported_invalid = false;

        loop {
            buffer.clear();
            let read = reader
                .read_until(b'\n', &mut buffer)
                .map_err(|e| FetchError::io(Stage::Scan, &self.path, e))?;
            if read == 0 {
                break;
            }
            counts.bytes += read;
            counts.lines += 1;

            let line = trim_line_ending(&buffer);
            if line.is_empty() {
                continue;
            }

            // Lines are kept byte for byte; decoding only matters for the check
            if let Err(e) = std::str::from_utf8(line) {
                match self.context.encoding_mode {
                    EncodingMode::FailFast => return Err(FetchError::encoding(&self.path, e)),
                    EncodingMode::Lossy if !reported_invalid => {
                        warn!(
                            "Invalid UTF-8 in {} at line {}, kept as raw bytes: {}",
                            self.path.display(),
                            counts.lines,
                            String::from_utf8_lossy(line)
                        );
                        reported_invalid = true;
                    }
                    EncodingMode::Lossy => {}
                }
            }

            if self.context.matcher.is_match(line) {
                writer
                    .append(line)
                    .map_err(|e| FetchError::io(Stage::Scan, writer.path(), e))?;
            }
        }

        Ok(counts)
    }
}

/// Strips a trailing `\n` or `\r\n`
pub(crate) fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
