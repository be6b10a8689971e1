use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::TempDir;
use tracing::{debug, error, info, warn};

use crate::aggregate::{aggregate, parent_dir};
use crate::config::PipelineConfig;
use crate::dedup::Deduplicator;
use crate::errors::{FetchError, FetchResult, Stage};
use crate::filters::discover_files;
use crate::metrics::PipelineMetrics;
use crate::pool::WorkerPool;
use crate::results::PipelineReport;
use crate::scan::{KeywordMatcher, ScanContext};

/// Scans `files` for `keyword` and writes the distinct matching lines to
/// `output_path`, using one worker and one dedup partition per CPU core.
///
/// Files that cannot be opened or read are skipped and listed in the report.
/// Line order in the output is unspecified.
pub fn run_pipeline(
    files: &[PathBuf],
    keyword: &str,
    output_path: &Path,
) -> FetchResult<PipelineReport> {
    let config = PipelineConfig {
        output_path: Some(output_path.to_path_buf()),
        ..PipelineConfig::new(keyword)
    };
    Pipeline::new(config).run_files(files)
}

/// Drives discovery, scanning, aggregation and deduplication for one config
#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    metrics: PipelineMetrics,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            metrics: PipelineMetrics::new(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    /// Enumerates the input files under `root_path` and processes them
    pub fn run(&self) -> FetchResult<PipelineReport> {
        self.check_keyword()?;
        let output = self.config.resolved_output_path();
        let files = discover_files(&self.config, &output)?;
        self.run_files(&files)
    }

    /// Processes an explicit list of files, in the given order
    pub fn run_files(&self, files: &[PathBuf]) -> FetchResult<PipelineReport> {
        self.check_keyword()?;
        let started = Instant::now();
        let output = self.config.resolved_output_path();
        info!(
            "Scanning {} files for '{}' into {}",
            files.len(),
            self.config.keyword,
            output.display()
        );

        let matcher = KeywordMatcher::new(self.config.keyword.as_str())?;
        let scratch = scratch_dir(&output)?;
        let context = ScanContext::new(
            matcher,
            scratch.path(),
            self.config.encoding_mode,
            self.metrics.clone(),
        );

        let mut report = PipelineReport::new(&output);
        let stores = {
            let pool = WorkerPool::new(self.config.worker_count)?;
            let handles = files
                .iter()
                .map(|path| {
                    let task = context.task(path.as_path());
                    pool.submit(move || Ok(task.run()))
                })
                .collect::<FetchResult<Vec<_>>>()?;

            // Every handle resolves before aggregation starts
            let mut stores = Vec::with_capacity(handles.len());
            for (path, handle) in files.iter().zip(handles) {
                let store = match handle.wait() {
                    Ok(outcome) => report.add_outcome(outcome),
                    Err(e) => {
                        error!("Scan of {} failed: {}", path.display(), e);
                        report.add_failed(path.as_path(), e.to_string())
                    }
                };
                stores.extend(store);
            }
            pool.shutdown();
            stores
        };
        debug!(
            "Scan finished: {} scanned, {} skipped",
            report.files_scanned, report.files_skipped
        );

        let merged = aggregate(stores, &output, self.config.append)?;
        report.merged_lines = merged.lines_kept + merged.lines_written;

        let dedup = Deduplicator::new(self.config.partitions).run(&output)?;
        report.unique_lines = dedup.unique_lines;

        if let Err(e) = scratch.close() {
            warn!("Failed to remove scratch directory: {}", e);
        }

        report.elapsed = started.elapsed();
        self.metrics.log_stats();
        info!(
            "Wrote {} unique lines ({} duplicates removed) to {} in {}",
            report.unique_lines,
            report.duplicates_removed(),
            output.display(),
            humantime::format_duration(report.elapsed)
        );
        Ok(report)
    }

    fn check_keyword(&self) -> FetchResult<()> {
        if self.config.keyword.is_empty() {
            if self.config.reject_empty_keyword {
                return Err(FetchError::invalid_keyword("keyword must not be empty"));
            }
            warn!("Empty keyword: every non-empty line will be selected");
        }
        Ok(())
    }
}

/// Creates the per-run directory holding the intermediate stores, next to
/// the output so the stores live on the same file system
fn scratch_dir(output: &Path) -> FetchResult<TempDir> {
    let dir = parent_dir(output);
    fs::create_dir_all(dir).map_err(|e| FetchError::io(Stage::Prepare, dir, e))?;
    tempfile::Builder::new()
        .prefix(".filefetch-")
        .tempdir_in(dir)
        .map_err(|e| FetchError::io(Stage::Prepare, dir, e))
}
