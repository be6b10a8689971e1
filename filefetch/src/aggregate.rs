//! Merges intermediate stores into the single output file.
//!
//! Stores are concatenated in ascending index order, which is the order their
//! scan tasks were created in. The merged file is written next to the output
//! and renamed over it only once everything has been written.
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::errors::{FetchError, FetchResult, Stage};
use crate::scan::IntermediateStore;

/// Counters from one aggregation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateStats {
    pub stores_merged: usize,
    pub stores_missing: usize,
    /// Lines carried over from the existing output in append mode
    pub lines_kept: usize,
    pub lines_written: usize,
}

/// Writes the concatenation of `stores` to `output` and deletes the stores.
///
/// With `append`, whatever `output` already holds stays in front of the new
/// lines. A store that cannot be opened is logged and skipped; failing to
/// delete a store is logged only. Any other I/O failure aborts with
/// [`FetchError::Io`] and leaves `output` as it was.
pub fn aggregate(
    mut stores: Vec<IntermediateStore>,
    output: &Path,
    append: bool,
) -> FetchResult<AggregateStats> {
    stores.sort_by_key(IntermediateStore::index);
    debug!(
        "Aggregating {} stores into {}",
        stores.len(),
        output.display()
    );

    let io_err = |e: io::Error| FetchError::io(Stage::Aggregate, output, e);
    let dir = parent_dir(output);
    let temp = NamedTempFile::new_in(dir).map_err(io_err)?;
    let mut writer = BufWriter::new(temp);
    let mut stats = AggregateStats::default();

    if append {
        match File::open(output) {
            Ok(existing) => {
                stats.lines_kept =
                    copy_lines(BufReader::new(existing), &mut writer).map_err(io_err)?;
                debug!("Kept {} existing lines", stats.lines_kept);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_err(e)),
        }
    }

    for store in &stores {
        let file = match File::open(store.path()) {
            Ok(file) => file,
            Err(e) => {
                warn!("{}", FetchError::file_open(store.path(), e));
                stats.stores_missing += 1;
                continue;
            }
        };
        stats.lines_written += copy_lines(BufReader::new(file), &mut writer)
            .map_err(|e| FetchError::io(Stage::Aggregate, store.path(), e))?;
        stats.stores_merged += 1;
    }

    let temp = writer
        .into_inner()
        .map_err(|e| io_err(e.into_error()))?;
    temp.persist(output).map_err(|e| io_err(e.error))?;

    for store in stores {
        let path = store.path().to_path_buf();
        if let Err(e) = store.remove() {
            warn!("Failed to delete store {}: {}", path.display(), e);
        }
    }

    debug!(
        "Merged {} lines from {} stores ({} missing)",
        stats.lines_written, stats.stores_merged, stats.stores_missing
    );
    Ok(stats)
}

/// Directory holding `path`, `.` for bare file names
pub(crate) fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Copies every line of `reader`, terminating each with `\n`. Returns the
/// number of lines copied.
fn copy_lines(mut reader: impl BufRead, writer: &mut impl Write) -> io::Result<usize> {
    let mut buffer = Vec::with_capacity(256);
    let mut lines = 0;
    loop {
        buffer.clear();
        if reader.read_until(b'\n', &mut buffer)? == 0 {
            return Ok(lines);
        }
        if buffer.last() != Some(&b'\n') {
            buffer.push(b'\n');
        }
        writer.write_all(&buffer)?;
        lines += 1;
    }
}
