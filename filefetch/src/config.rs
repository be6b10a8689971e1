use config::{Config as ConfigBuilder, ConfigError, File};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

/// Configuration for a pipeline run.
///
/// # Configuration Locations
///
/// The configuration can be loaded from multiple locations in order of precedence:
/// 1. Custom config file specified via `--config` flag
/// 2. Local `.filefetch.yaml` in the current directory
/// 3. Global `$HOME/.config/filefetch/config.yaml`
///
/// # Configuration Format
///
/// ```yaml
/// # Substring to look for (case-sensitive)
/// keyword: "apple"
///
/// # Directory holding the input files
/// root_path: "."
///
/// # Output file (default: <root_path>/<keyword>.txt)
/// output_path: "apple.txt"
///
/// # Extensions of files to scan
/// file_extensions: ["txt"]
///
/// # Glob patterns to skip
/// ignore_patterns: ["drafts/*"]
///
/// # Walk subdirectories
/// recursive: false
///
/// # Keep what is already in the output file
/// append: false
///
/// # Worker threads and dedup partitions (default: CPU cores)
/// worker_count: 4
/// partitions: 4
///
/// # How to treat invalid UTF-8 (lossy, failfast)
/// encoding_mode: lossy
///
/// # Log level (trace, debug, info, warn, error)
/// log_level: "info"
/// ```
///
/// When using the CLI, command-line arguments take precedence over config file
/// values, see [`PipelineConfig::merge_with_cli`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Substring selecting the lines to keep
    #[serde(default)]
    pub keyword: String,

    /// Directory to enumerate input files from
    #[serde(default = "default_root_path")]
    pub root_path: PathBuf,

    /// Where the deduplicated result goes.
    /// If None, `<root_path>/<keyword>.txt` is used
    #[serde(default)]
    pub output_path: Option<PathBuf>,

    /// Extensions of files to scan, compared case-insensitively
    #[serde(default = "default_file_extensions")]
    pub file_extensions: Vec<String>,

    /// Patterns to ignore (supports glob syntax)
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Descend into subdirectories of `root_path`
    #[serde(default)]
    pub recursive: bool,

    /// Keep existing output contents in front of the new matches
    #[serde(default)]
    pub append: bool,

    /// Refuse an empty keyword instead of matching every line
    #[serde(default)]
    pub reject_empty_keyword: bool,

    /// Number of scan workers
    #[serde(default = "default_parallelism")]
    pub worker_count: NonZeroUsize,

    /// Number of dedup buckets
    #[serde(default = "default_parallelism")]
    pub partitions: NonZeroUsize,

    /// How to handle invalid UTF-8 in input files
    #[serde(default)]
    pub encoding_mode: EncodingMode,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// How to handle invalid UTF-8 in input files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingMode {
    /// Skip files containing invalid UTF-8
    FailFast,
    /// Keep lines with invalid UTF-8 byte for byte and keep going.
    /// Only log messages show them with U+FFFD replacements.
    #[default]
    Lossy,
}

impl std::str::FromStr for EncodingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "failfast" => Ok(Self::FailFast),
            "lossy" => Ok(Self::Lossy),
            other => Err(format!("unknown encoding mode '{}'", other)),
        }
    }
}

/// Default worker and partition count: one per CPU core, never zero
pub fn default_parallelism() -> NonZeroUsize {
    NonZeroUsize::new(num_cpus::get()).unwrap_or(NonZeroUsize::MIN)
}

fn default_root_path() -> PathBuf {
    PathBuf::from(".")
}

fn default_file_extensions() -> Vec<String> {
    vec!["txt".to_string()]
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            keyword: String::new(),
            root_path: default_root_path(),
            output_path: None,
            file_extensions: default_file_extensions(),
            ignore_patterns: Vec::new(),
            recursive: false,
            append: false,
            reject_empty_keyword: false,
            worker_count: default_parallelism(),
            partitions: default_parallelism(),
            encoding_mode: EncodingMode::default(),
            log_level: default_log_level(),
        }
    }
}

impl PipelineConfig {
    /// Creates a config for `keyword` with every other field defaulted
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            ..Self::default()
        }
    }

    /// Loads configuration from the default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Loads configuration from a specific file
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        let config_files = [
            dirs::config_dir().map(|p| p.join("filefetch/config.yaml")),
            Some(PathBuf::from(".filefetch.yaml")),
            config_path.map(PathBuf::from),
        ];

        for path in config_files.iter().flatten() {
            // An explicit file must exist; the default locations are optional
            let required = config_path.is_some_and(|p| p == path.as_path());
            if required || path.exists() {
                builder = builder.add_source(File::from(path.as_path()).required(required));
            }
        }

        builder.build()?.try_deserialize()
    }

    /// Merges CLI arguments with configuration file values
    pub fn merge_with_cli(mut self, cli_config: PipelineConfig) -> Self {
        if !cli_config.keyword.is_empty() {
            self.keyword = cli_config.keyword;
        }
        if cli_config.root_path != default_root_path() {
            self.root_path = cli_config.root_path;
        }
        if cli_config.output_path.is_some() {
            self.output_path = cli_config.output_path;
        }
        if cli_config.file_extensions != default_file_extensions() {
            self.file_extensions = cli_config.file_extensions;
        }
        if !cli_config.ignore_patterns.is_empty() {
            self.ignore_patterns = cli_config.ignore_patterns;
        }
        if cli_config.recursive {
            self.recursive = true;
        }
        if cli_config.append {
            self.append = true;
        }
        if cli_config.reject_empty_keyword {
            self.reject_empty_keyword = true;
        }
        if cli_config.worker_count != default_parallelism() {
            self.worker_count = cli_config.worker_count;
        }
        if cli_config.partitions != default_parallelism() {
            self.partitions = cli_config.partitions;
        }
        if cli_config.encoding_mode != EncodingMode::default() {
            self.encoding_mode = cli_config.encoding_mode;
        }
        if cli_config.log_level != default_log_level() {
            self.log_level = cli_config.log_level;
        }
        self
    }

    /// The output file, falling back to `<root_path>/<keyword>.txt`
    pub fn resolved_output_path(&self) -> PathBuf {
        self.output_path
            .clone()
            .unwrap_or_else(|| self.root_path.join(format!("{}.txt", self.keyword)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_load_config_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        let config_content = r#"
            keyword: "apple"
            root_path: "data"
            output_path: "out/apple.txt"
            file_extensions: ["txt", "log"]
            ignore_patterns: ["drafts/*"]
            recursive: true
            append: true
            worker_count: 4
            partitions: 2
            encoding_mode: failfast
            log_level: "debug"
        "#;

        let mut file = File::create(&config_path).unwrap();
        file.write_all(config_content.as_bytes()).unwrap();

        let config = PipelineConfig::load_from(Some(&config_path)).unwrap();
        assert_eq!(config.keyword, "apple");
        assert_eq!(config.root_path, PathBuf::from("data"));
        assert_eq!(config.output_path, Some(PathBuf::from("out/apple.txt")));
        assert_eq!(config.file_extensions, vec!["txt", "log"]);
        assert_eq!(config.ignore_patterns, vec!["drafts/*"]);
        assert!(config.recursive);
        assert!(config.append);
        assert_eq!(config.worker_count, NonZeroUsize::new(4).unwrap());
        assert_eq!(config.partitions, NonZeroUsize::new(2).unwrap());
        assert_eq!(config.encoding_mode, EncodingMode::FailFast);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_default_values() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        let mut file = File::create(&config_path).unwrap();
        file.write_all(b"keyword: \"apple\"\n").unwrap();

        let config = PipelineConfig::load_from(Some(&config_path)).unwrap();
        assert_eq!(config.keyword, "apple");
        assert_eq!(config.root_path, PathBuf::from("."));
        assert_eq!(config.output_path, None);
        assert_eq!(config.file_extensions, vec!["txt"]);
        assert!(config.ignore_patterns.is_empty());
        assert!(!config.recursive);
        assert!(!config.append);
        assert!(!config.reject_empty_keyword);
        assert_eq!(config.worker_count, default_parallelism());
        assert_eq!(config.encoding_mode, EncodingMode::Lossy);
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn test_merge_with_cli() {
        let config_file = PipelineConfig {
            root_path: PathBuf::from("data"),
            ignore_patterns: vec!["drafts/*".to_string()],
            worker_count: NonZeroUsize::new(3).unwrap(),
            log_level: "info".to_string(),
            ..PipelineConfig::new("apple")
        };

        let cli_config = PipelineConfig {
            output_path: Some(PathBuf::from("result.txt")),
            recursive: true,
            log_level: "debug".to_string(),
            ..PipelineConfig::new("pear")
        };

        let merged = config_file.merge_with_cli(cli_config);
        assert_eq!(merged.keyword, "pear"); // CLI value
        assert_eq!(merged.root_path, PathBuf::from("data")); // File value (CLI default)
        assert_eq!(merged.output_path, Some(PathBuf::from("result.txt"))); // CLI value
        assert_eq!(merged.ignore_patterns, vec!["drafts/*"]); // File value (CLI empty)
        assert!(merged.recursive); // CLI value
        assert_eq!(merged.log_level, "debug"); // CLI value
        if default_parallelism().get() != 3 {
            assert_eq!(merged.worker_count, NonZeroUsize::new(3).unwrap()); // File value
        }
    }

    #[test]
    fn test_resolved_output_path() {
        let mut config = PipelineConfig::new("apple");
        config.root_path = PathBuf::from("data");
        assert_eq!(config.resolved_output_path(), PathBuf::from("data/apple.txt"));

        config.output_path = Some(PathBuf::from("elsewhere.txt"));
        assert_eq!(config.resolved_output_path(), PathBuf::from("elsewhere.txt"));
    }

    #[test]
    fn test_encoding_mode_from_str() {
        assert_eq!("lossy".parse::<EncodingMode>(), Ok(EncodingMode::Lossy));
        assert_eq!("FailFast".parse::<EncodingMode>(), Ok(EncodingMode::FailFast));
        assert!("utf16".parse::<EncodingMode>().is_err());
    }

    #[test]
    fn test_invalid_config() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        let mut file = File::create(&config_path).unwrap();
        file.write_all(b"worker_count: \"many\"\nrecursive: [1, 2]\n")
            .unwrap();

        let result = PipelineConfig::load_from(Some(&config_path));
        assert!(result.is_err(), "Expected error loading invalid config");
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = PipelineConfig::load_from(Some(Path::new("nonexistent.yaml")));
        assert!(result.is_err());
    }
}
