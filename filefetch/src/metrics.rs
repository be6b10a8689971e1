use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Counters shared by every scan task of a run
#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    files_scanned: Arc<AtomicU64>,
    files_skipped: Arc<AtomicU64>,
    bytes_read: Arc<AtomicU64>,
    lines_read: Arc<AtomicU64>,
    lines_matched: Arc<AtomicU64>,
}

impl PipelineMetrics {
    /// Creates a new PipelineMetrics instance
    pub fn new() -> Self {
        Self {
            files_scanned: Arc::new(AtomicU64::new(0)),
            files_skipped: Arc::new(AtomicU64::new(0)),
            bytes_read: Arc::new(AtomicU64::new(0)),
            lines_read: Arc::new(AtomicU64::new(0)),
            lines_matched: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Records a file that was scanned to the end
    pub fn record_file_scanned(&self, bytes: u64, lines: u64, matched: u64) {
        self.files_scanned.fetch_add(1, Ordering::Relaxed);
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
        self.lines_read.fetch_add(lines, Ordering::Relaxed);
        let total = self.lines_matched.fetch_add(matched, Ordering::Relaxed) + matched;
        debug!("Matched {} lines, {} so far", matched, total);
    }

    /// Records a file that could not be scanned
    pub fn record_file_skipped(&self) {
        self.files_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Gets a snapshot of the counters
    pub fn get_stats(&self) -> ScanStats {
        ScanStats {
            files_scanned: self.files_scanned.load(Ordering::Relaxed),
            files_skipped: self.files_skipped.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            lines_read: self.lines_read.load(Ordering::Relaxed),
            lines_matched: self.lines_matched.load(Ordering::Relaxed),
        }
    }

    /// Logs the current counters
    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Scan stats:\n\
             Files scanned/skipped: {}/{}\n\
             Bytes read: {}\n\
             Lines read/matched: {}/{}",
            stats.files_scanned,
            stats.files_skipped,
            stats.bytes_read,
            stats.lines_read,
            stats.lines_matched
        );
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of [`PipelineMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanStats {
    pub files_scanned: u64,
    pub files_skipped: u64,
    pub bytes_read: u64,
    pub lines_read: u64,
    pub lines_matched: u64,
}
