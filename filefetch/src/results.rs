use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::scan::{IntermediateStore, ScanOutcome};

/// A file the scan stage could not process
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Summary of one pipeline run
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineReport {
    /// Where the deduplicated lines were written
    pub output_path: PathBuf,
    /// Number of scan tasks submitted
    pub files_submitted: usize,
    /// Files scanned to the end
    pub files_scanned: usize,
    /// Files left out because they could not be opened or read
    pub files_skipped: usize,
    pub skipped: Vec<SkippedFile>,
    /// Lines read from all scanned files
    pub lines_read: usize,
    /// Lines in the merged output before deduplication
    pub merged_lines: usize,
    /// Lines in the final output
    pub unique_lines: usize,
    pub elapsed: Duration,
}

impl PipelineReport {
    /// Creates a new empty report
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
            ..Default::default()
        }
    }

    /// Counts a finished scan task and hands back its store, if it produced one
    pub fn add_outcome(&mut self, outcome: ScanOutcome) -> Option<IntermediateStore> {
        self.files_submitted += 1;
        match outcome {
            ScanOutcome::Scanned {
                store, lines_read, ..
            } => {
                self.files_scanned += 1;
                self.lines_read += lines_read;
                Some(store)
            }
            ScanOutcome::Skipped { path, reason, .. } => self.add_skipped(path, reason),
        }
    }

    /// Counts a scan task that ended without an outcome, e.g. because it panicked
    pub fn add_failed(
        &mut self,
        path: impl Into<PathBuf>,
        reason: impl Into<String>,
    ) -> Option<IntermediateStore> {
        self.files_submitted += 1;
        self.add_skipped(path, reason)
    }

    fn add_skipped(
        &mut self,
        path: impl Into<PathBuf>,
        reason: impl Into<String>,
    ) -> Option<IntermediateStore> {
        self.files_skipped += 1;
        self.skipped.push(SkippedFile {
            path: path.into(),
            reason: reason.into(),
        });
        None
    }

    /// Lines removed as duplicates
    pub fn duplicates_removed(&self) -> usize {
        self.merged_lines.saturating_sub(self.unique_lines)
    }
}
