//! Partitioned removal of duplicate lines.
//!
//! The merged file is read once and its non-empty lines are dealt round-robin
//! into `P` buckets (line `i` goes to bucket `i mod P`). Each bucket is turned
//! into a set on its own rayon task with no state shared between buckets,
//! then the sets are unioned serially and written back.
//!
//! The order of lines in the rewritten file follows the set's iteration order
//! and is **not** deterministic. Compare outputs as sets.
use rayon::prelude::*;
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::num::NonZeroUsize;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, trace};

use crate::aggregate::parent_dir;
use crate::config::default_parallelism;
use crate::errors::{FetchError, FetchResult, Stage};
use crate::scan::trim_line_ending;

/// Counters from one deduplication pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupStats {
    pub lines_read: usize,
    pub unique_lines: usize,
    pub partitions: usize,
}

/// Rewrites a file so that every line occurs once
#[derive(Debug, Clone, Copy)]
pub struct Deduplicator {
    partitions: NonZeroUsize,
}

impl Deduplicator {
    pub fn new(partitions: NonZeroUsize) -> Self {
        Self { partitions }
    }

    /// One partition per CPU core
    pub fn with_default_partitions() -> Self {
        Self::new(default_parallelism())
    }

    pub fn partitions(&self) -> NonZeroUsize {
        self.partitions
    }

    /// Deduplicates `path` in place.
    ///
    /// A read failure leaves the file untouched. The new content goes to a
    /// temporary file that replaces `path` by rename, so a failed write leaves
    /// the file untouched as well.
    pub fn run(&self, path: &Path) -> FetchResult<DedupStats> {
        let io_err = |e: io::Error| FetchError::io(Stage::Dedup, path, e);

        let file = File::open(path).map_err(io_err)?;
        let lines = read_lines(BufReader::new(file)).map_err(io_err)?;
        let lines_read = lines.len();

        let unique = self.dedup(lines);
        let unique_lines = unique.len();

        let mut writer = BufWriter::new(NamedTempFile::new_in(parent_dir(path)).map_err(io_err)?);
        for line in &unique {
            writer.write_all(line).map_err(io_err)?;
            writer.write_all(b"\n").map_err(io_err)?;
        }
        let temp = writer.into_inner().map_err(|e| io_err(e.into_error()))?;
        temp.persist(path).map_err(|e| io_err(e.error))?;

        debug!(
            "Deduplicated {}: {} lines -> {} unique across {} partitions",
            path.display(),
            lines_read,
            unique_lines,
            self.partitions
        );
        Ok(DedupStats {
            lines_read,
            unique_lines,
            partitions: self.partitions.get(),
        })
    }

    /// Collapses `lines` into the set of distinct lines, compared byte for byte
    pub fn dedup(&self, lines: Vec<Vec<u8>>) -> HashSet<Vec<u8>> {
        let buckets = self.partition(lines);
        let sets: Vec<HashSet<Vec<u8>>> = buckets
            .into_par_iter()
            .map(|bucket| bucket.into_iter().collect())
            .collect();
        union(sets)
    }

    /// Deals lines round-robin into `partitions` buckets, in read order
    fn partition(&self, lines: Vec<Vec<u8>>) -> Vec<Vec<Vec<u8>>> {
        let count = self.partitions.get();
        let mut buckets: Vec<Vec<Vec<u8>>> = (0..count)
            .map(|_| Vec::with_capacity(lines.len() / count + 1))
            .collect();
        for (i, line) in lines.into_iter().enumerate() {
            buckets[i % count].push(line);
        }
        trace!(
            "Bucket sizes: {:?}",
            buckets.iter().map(Vec::len).collect::<Vec<_>>()
        );
        buckets
    }
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::with_default_partitions()
    }
}

fn union(sets: Vec<HashSet<Vec<u8>>>) -> HashSet<Vec<u8>> {
    let mut sets = sets.into_iter();
    let mut merged = sets.next().unwrap_or_default();
    for set in sets {
        merged.extend(set);
    }
    merged
}

/// Reads the non-empty lines of `reader` without their line endings
fn read_lines(mut reader: impl BufRead) -> io::Result<Vec<Vec<u8>>> {
    let mut lines = Vec::new();
    let mut buffer = Vec::with_capacity(256);
    loop {
        buffer.clear();
        if reader.read_until(b'\n', &mut buffer)? == 0 {
            return Ok(lines);
        }
        let line = trim_line_ending(&buffer);
        if !line.is_empty() {
            lines.push(line.to_vec());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn dedup(partitions: usize) -> Deduplicator {
        Deduplicator::new(NonZeroUsize::new(partitions).unwrap())
    }

    fn line_set(content: &str) -> HashSet<String> {
        content.lines().map(String::from).collect()
    }

    fn bytes(lines: &[&str]) -> Vec<Vec<u8>> {
        lines.iter().map(|l| l.as_bytes().to_vec()).collect()
    }

    #[test]
    fn test_round_robin_partition() {
        let lines = bytes(&["0", "1", "2", "3", "4", "5", "6"]);
        let buckets = dedup(3).partition(lines);
        assert_eq!(buckets[0], bytes(&["0", "3", "6"]));
        assert_eq!(buckets[1], bytes(&["1", "4"]));
        assert_eq!(buckets[2], bytes(&["2", "5"]));
    }

    #[test]
    fn test_duplicates_across_buckets_collapse() {
        // With two buckets, the two "apple pie" lines land in different buckets
        let lines = bytes(&["apple pie", "apple pie", "apple tart"]);
        let unique = dedup(2).dedup(lines);
        assert_eq!(unique.len(), 2);
        assert!(unique.contains(&b"apple pie"[..]));
        assert!(unique.contains(&b"apple tart"[..]));
    }

    #[test]
    fn test_run_rewrites_file_as_set() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("apple.txt");
        fs::write(&path, "apple pie\napple tart\n\napple pie\napple tart\napple\n").unwrap();

        let stats = dedup(4).run(&path).unwrap();
        assert_eq!(stats.lines_read, 5);
        assert_eq!(stats.unique_lines, 3);
        assert_eq!(stats.partitions, 4);

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 3);
        assert_eq!(line_set(&content), line_set("apple pie\napple tart\napple"));
        assert!(content.ends_with('\n'));
    }

    #[test]
    fn test_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.txt");
        fs::write(&path, "b\na\nb\nc\na\n").unwrap();

        let deduplicator = dedup(3);
        deduplicator.run(&path).unwrap();
        let once = line_set(&fs::read_to_string(&path).unwrap());
        let stats = deduplicator.run(&path).unwrap();
        let twice = line_set(&fs::read_to_string(&path).unwrap());

        assert_eq!(once, twice);
        assert_eq!(stats.lines_read, stats.unique_lines);
    }

    #[test]
    fn test_partition_count_does_not_change_result() {
        let lines: Vec<Vec<u8>> = (0..200)
            .map(|i| format!("line {}", i % 37).into_bytes())
            .collect();
        let expected: HashSet<Vec<u8>> = lines.iter().cloned().collect();
        for partitions in [1, 2, 3, 8, 64, 500] {
            assert_eq!(dedup(partitions).dedup(lines.clone()), expected);
        }
    }

    #[test]
    fn test_empty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.txt");
        fs::write(&path, "").unwrap();

        let stats = dedup(2).run(&path).unwrap();
        assert_eq!(stats.unique_lines, 0);
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn test_invalid_utf8_lines_compared_as_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.txt");
        fs::write(&path, b"caf\xe9\ncaf\xe8\ncaf\xe9\n").unwrap();

        let stats = dedup(2).run(&path).unwrap();
        assert_eq!(stats.lines_read, 3);
        assert_eq!(stats.unique_lines, 2);

        let content = fs::read(&path).unwrap();
        let mut lines: Vec<&[u8]> = content.split(|&b| b == b'\n').filter(|l| !l.is_empty()).collect();
        lines.sort();
        assert_eq!(lines, vec![&b"caf\xe8"[..], &b"caf\xe9"[..]]);
    }

    #[test]
    fn test_crlf_lines_match_lf_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.txt");
        fs::write(&path, "apple pie\r\napple pie\napple tart\r\n").unwrap();

        let stats = dedup(3).run(&path).unwrap();
        assert_eq!(stats.unique_lines, 2);
        let content = fs::read_to_string(&path).unwrap();
        assert!(!content.contains('\r'));
        assert_eq!(line_set(&content), line_set("apple pie\napple tart"));
    }

    #[test]
    fn test_missing_file_fails_with_stage() {
        let dir = tempdir().unwrap();
        let result = dedup(2).run(&dir.path().join("missing.txt"));
        assert!(matches!(
            result,
            Err(FetchError::Io {
                stage: Stage::Dedup,
                ..
            })
        ));
    }
}
