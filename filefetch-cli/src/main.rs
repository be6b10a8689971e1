use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use filefetch::{EncodingMode, Pipeline, PipelineConfig, PipelineReport};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Substring to look for (case-sensitive; empty selects every line)
    keyword: String,

    /// Directory holding the files to scan
    #[arg(short = 'd', long, default_value = ".")]
    dir: PathBuf,

    /// Output file (default: <DIR>/<KEYWORD>.txt)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// File extensions to scan (e.g. txt,log)
    #[arg(short = 'e', long, default_value = "txt")]
    extensions: String,

    /// Patterns to ignore (glob format, relative to DIR)
    #[arg(short, long)]
    ignore: Vec<String>,

    /// Descend into subdirectories
    #[arg(short, long)]
    recursive: bool,

    /// Number of worker threads
    #[arg(short = 'j', long)]
    threads: Option<NonZeroUsize>,

    /// Number of deduplication partitions
    #[arg(short = 'P', long)]
    partitions: Option<NonZeroUsize>,

    /// Keep the existing contents of the output file
    #[arg(short, long)]
    append: bool,

    /// Fail instead of selecting every line when the keyword is empty
    #[arg(long)]
    reject_empty: bool,

    /// How to handle invalid UTF-8 sequences (failfast|lossy)
    #[arg(long, default_value = "lossy")]
    encoding: EncodingMode,

    /// Configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn to_config(&self) -> PipelineConfig {
        let defaults = PipelineConfig::default();
        PipelineConfig {
            keyword: self.keyword.clone(),
            root_path: self.dir.clone(),
            output_path: self.output.clone(),
            file_extensions: self
                .extensions
                .split(',')
                .map(|s| s.trim().trim_start_matches('.').to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            ignore_patterns: self.ignore.clone(),
            recursive: self.recursive,
            append: self.append,
            reject_empty_keyword: self.reject_empty,
            worker_count: self.threads.unwrap_or(defaults.worker_count),
            partitions: self.partitions.unwrap_or(defaults.partitions),
            encoding_mode: self.encoding,
            log_level: self.log_level.clone().unwrap_or(defaults.log_level),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let file_config = PipelineConfig::load_from(cli.config.as_deref())
        .context("Failed to load configuration")?;
    let mut config = file_config.merge_with_cli(cli.to_config());
    // The positional keyword always wins, including an explicit empty one
    config.keyword = cli.keyword.clone();

    init_logging(&config.log_level);
    debug!("Effective configuration: {:?}", config);

    let pipeline = Pipeline::new(config);
    let report = pipeline.run().with_context(|| {
        format!(
            "Failed to extract '{}' from {}",
            cli.keyword,
            pipeline.config().root_path.display()
        )
    })?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn print_report(report: &PipelineReport) {
    println!(
        "Processing complete. Files have been combined into {}",
        report.output_path.display().to_string().blue()
    );
    println!(
        "Matched {} lines, {} unique ({} duplicates removed) from {} files",
        report.merged_lines.to_string().green(),
        report.unique_lines.to_string().green(),
        report.duplicates_removed(),
        report.files_scanned
    );

    if report.files_skipped > 0 {
        println!(
            "{}",
            format!("Skipped {} files:", report.files_skipped).yellow()
        );
        for skipped in &report.skipped {
            println!("  {}: {}", skipped.path.display(), skipped.reason.red());
        }
    }
}
