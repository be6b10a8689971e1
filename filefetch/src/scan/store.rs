use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{trace, warn};

/// Hands out store indices in task-creation order.
///
/// Indices start at 1 so store files read `log1.txt`, `log2.txt`, ...
#[derive(Debug)]
pub struct StoreIndexer {
    next: AtomicUsize,
}

impl StoreIndexer {
    pub fn new() -> Self {
        Self {
            next: AtomicUsize::new(1),
        }
    }

    /// Claims the next index; every call returns a distinct, larger value
    pub fn next_index(&self) -> usize {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for StoreIndexer {
    fn default() -> Self {
        Self::new()
    }
}

/// Location of the store file for `index` inside `dir`
pub fn store_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("log{}.txt", index))
}

/// Completed, file-backed list of matched lines from one scan task
#[derive(Debug)]
pub struct IntermediateStore {
    index: usize,
    path: PathBuf,
    lines: usize,
}

impl IntermediateStore {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of lines appended before the store was finished
    pub fn line_count(&self) -> usize {
        self.lines
    }

    /// Deletes the backing file
    pub fn remove(self) -> io::Result<()> {
        trace!("Removing store {}", self.path.display());
        fs::remove_file(&self.path)
    }
}

/// Append side of a store, owned by the task that creates it
#[derive(Debug)]
pub struct StoreWriter {
    index: usize,
    path: PathBuf,
    writer: BufWriter<File>,
    lines: usize,
}

impl StoreWriter {
    /// Creates an empty store file for `index` inside `dir`
    pub fn create(dir: &Path, index: usize) -> io::Result<Self> {
        let path = store_path(dir, index);
        let file = File::create(&path)?;
        Ok(Self {
            index,
            path,
            writer: BufWriter::new(file),
            lines: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one line, byte for byte, plus its terminator
    pub fn append(&mut self, line: &[u8]) -> io::Result<()> {
        self.writer.write_all(line)?;
        self.writer.write_all(b"\n")?;
        self.lines += 1;
        Ok(())
    }

    /// Flushes the file and hands the finished store over
    pub fn finish(mut self) -> io::Result<IntermediateStore> {
        self.writer.flush()?;
        Ok(IntermediateStore {
            index: self.index,
            path: self.path,
            lines: self.lines,
        })
    }

    /// Drops a partially written store
    pub fn discard(self) {
        let Self { path, writer, .. } = self;
        drop(writer);
        if let Err(e) = fs::remove_file(&path) {
            warn!("Failed to remove partial store {}: {}", path.display(), e);
        }
    }
}
