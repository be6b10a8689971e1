/// Enumeration of the input files for a run.
///
/// By default only regular files with a `.txt` extension directly inside the
/// root directory are picked up. The output file is never treated as an
/// input, so re-running into the same directory does not feed the previous
/// result back in. Candidates are sorted by path, which fixes the submission
/// order and with it the order of the merged output.
use glob::Pattern;
use ignore::WalkBuilder;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

use crate::config::PipelineConfig;
use crate::errors::{unify_path, FetchError, FetchResult, Stage};

/// Checks if a file has one of the wanted extensions.
/// An empty list accepts every file.
pub fn has_valid_extension(path: &Path, extensions: &[String]) -> bool {
    if extensions.is_empty() {
        return true;
    }
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

/// Checks if a path relative to the root matches one of the ignore patterns
pub fn should_ignore(relative: &Path, ignore_patterns: &[String]) -> bool {
    let normalized = relative.to_string_lossy().replace('\\', "/");
    ignore_patterns.iter().any(|pattern| match Pattern::new(pattern) {
        Ok(p) => p.matches(&normalized),
        Err(e) => {
            warn!("Ignoring invalid pattern '{}': {}", pattern, e);
            false
        }
    })
}

/// Comparable identity of a path that may not exist yet
fn path_key(path: &Path) -> PathBuf {
    if path.exists() {
        return unify_path(path);
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => {
            unify_path(parent).join(name)
        }
        (_, Some(name)) => unify_path(Path::new(".")).join(name),
        _ => path.to_path_buf(),
    }
}

/// Lists the files a run should scan, sorted by path
pub fn discover_files(config: &PipelineConfig, output: &Path) -> FetchResult<Vec<PathBuf>> {
    let root = &config.root_path;
    let metadata =
        std::fs::metadata(root).map_err(|e| FetchError::io(Stage::Discover, root, e))?;
    if !metadata.is_dir() {
        return Err(FetchError::io(
            Stage::Discover,
            root,
            io::Error::new(io::ErrorKind::InvalidInput, "not a directory"),
        ));
    }

    let mut walker = WalkBuilder::new(root);
    walker
        .standard_filters(false)
        .follow_links(true)
        .max_depth(if config.recursive { None } else { Some(1) });

    let output_key = path_key(output);
    let mut files: Vec<PathBuf> = walker
        .build()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
        .map(|entry| entry.into_path())
        .filter(|path| has_valid_extension(path, &config.file_extensions))
        .filter(|path| {
            let relative = path.strip_prefix(root).unwrap_or(path);
            !should_ignore(relative, &config.ignore_patterns)
        })
        .filter(|path| {
            let is_output = path_key(path) == output_key;
            if is_output {
                trace!("Leaving out output file {}", path.display());
            }
            !is_output
        })
        .collect();

    files.sort();
    debug!("Found {} files to scan under {}", files.len(), root.display());
    Ok(files)
}
