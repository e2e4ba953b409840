//! Command-line interface for the extractor.

use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand, ValueEnum};
use console::style;
use indicatif::{HumanBytes, HumanDuration, ProgressBar, ProgressStyle};
use thiserror::Error;

use crate::config::ParserConfig;
use crate::error::XliffError;
use crate::parser::XliffStreamingParser;
use crate::types::UnitRecord;

/// Units between two progress updates in `bench`.
const PROGRESS_INTERVAL: usize = 50_000;

/// Units printed as a sample after each `bench` run.
const SAMPLE_SIZE: usize = 3;

/// Errors surfaced by the command-line tool.
#[derive(Debug, Error)]
pub enum CliError {
    /// Extraction failed.
    #[error("{0} (code {code})", code = .0.code())]
    Xliff(#[from] XliffError),

    /// Input file could not be read.
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization error.
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CliError>;

/// Streaming XLIFF extractor - pull translation units out of large XLIFF files.
#[derive(Parser)]
#[command(name = "xliff-streaming")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub limits: LimitArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Overrides for the parser limits. Unset flags keep the environment or
/// built-in value.
#[derive(Args, Debug, Default)]
pub struct LimitArgs {
    /// Maximum expanded size of entity content, in bytes
    #[arg(long, global = true, value_name = "BYTES")]
    pub max_entity_expansion: Option<usize>,

    /// Maximum number of entity substitutions
    #[arg(long, global = true, value_name = "N")]
    pub max_entity_substitutions: Option<usize>,

    /// Maximum nesting of entity references
    #[arg(long, global = true, value_name = "N")]
    pub max_entity_depth: Option<usize>,

    /// Maximum number of XML nodes in one unit
    #[arg(long, global = true, value_name = "N")]
    pub nodes_limit: Option<u32>,
}

impl LimitArgs {
    pub fn apply(&self, mut config: ParserConfig) -> ParserConfig {
        if let Some(bytes) = self.max_entity_expansion {
            config = config.with_max_entity_expansion(bytes);
        }
        if let Some(count) = self.max_entity_substitutions {
            config = config.with_max_entity_substitutions(count);
        }
        if let Some(depth) = self.max_entity_depth {
            config = config.with_max_entity_depth(depth);
        }
        if let Some(limit) = self.nodes_limit {
            config = config.with_nodes_limit(limit);
        }
        config
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print every translation unit in a file.
    Extract {
        /// XLIFF file to read
        file: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Stop after this many units
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Measure extraction throughput.
    Bench {
        /// XLIFF files to read
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// `line<TAB>id<TAB>source<TAB>target`
    Text,
    /// One JSON object per line
    Json,
}

/// Run the CLI.
pub fn run() -> Result<()> {
    execute(Cli::parse())
}

/// Execute an already parsed command line.
pub fn execute(cli: Cli) -> Result<()> {
    let config = cli.limits.apply(ParserConfig::from_env());
    let parser = XliffStreamingParser::with_config(config);

    match cli.command {
        Commands::Extract {
            file,
            format,
            limit,
        } => extract_command(&parser, &file, format, limit),
        Commands::Bench { files } => {
            for file in &files {
                bench_command(&parser, file)?;
            }
            Ok(())
        }
    }
}

fn read_input(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Execute the extract command.
fn extract_command(
    parser: &XliffStreamingParser,
    file: &Path,
    format: OutputFormat,
    limit: Option<usize>,
) -> Result<()> {
    let xml = read_input(file)?;
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    let units = parser.parse_trans_units(&xml);
    for unit in units.take(limit.unwrap_or(usize::MAX)) {
        let unit = unit?;
        match format {
            OutputFormat::Text => writeln!(out, "{}", format_text_line(&unit))?,
            OutputFormat::Json => writeln!(out, "{}", serde_json::to_string(&unit)?)?,
        }
    }

    out.flush()?;
    Ok(())
}

/// Execute the bench command for one file.
fn bench_command(parser: &XliffStreamingParser, file: &Path) -> Result<()> {
    let xml = read_input(file)?;

    println!(
        "{} {} ({})",
        style("Benchmarking").bold(),
        style(file.display()).cyan(),
        HumanBytes(xml.len() as u64)
    );

    let pb = ProgressBar::new_spinner();
    #[allow(clippy::expect_used)] // Static template string that is guaranteed to be valid
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .expect("valid template"),
    );
    pb.set_message("Extracting units...");
    pb.enable_steady_tick(Duration::from_millis(100));

    let started = Instant::now();
    let mut count = 0usize;
    let mut sample: Vec<UnitRecord> = Vec::with_capacity(SAMPLE_SIZE);

    for unit in parser.parse_trans_units(&xml) {
        let unit = match unit {
            Ok(unit) => unit,
            Err(e) => {
                pb.finish_and_clear();
                return Err(e.into());
            }
        };
        count += 1;
        if sample.len() < SAMPLE_SIZE {
            sample.push(unit);
        }
        if count % PROGRESS_INTERVAL == 0 {
            pb.set_message(format!("Extracted {count} units..."));
        }
    }

    let elapsed = started.elapsed();
    pb.finish_and_clear();

    let secs = elapsed.as_secs_f64();
    let (units_per_sec, bytes_per_sec) = if secs > 0.0 {
        (count as f64 / secs, xml.len() as f64 / secs)
    } else {
        (0.0, 0.0)
    };

    println!("  Units: {}", style(count).green());
    println!("  Elapsed: {} ({secs:.3}s)", HumanDuration(elapsed));
    println!(
        "  Throughput: {units_per_sec:.0} units/s, {}/s",
        HumanBytes(bytes_per_sec as u64)
    );

    if !sample.is_empty() {
        println!("  Sample:");
        for unit in &sample {
            println!("    {}", format_text_line(unit));
        }
    }
    println!();

    Ok(())
}

/// Render a record as `line<TAB>id<TAB>source<TAB>target`.
///
/// An absent target renders as an empty field.
pub fn format_text_line(unit: &UnitRecord) -> String {
    format!(
        "{}\t{}\t{}\t{}",
        unit.line,
        escape_field(&unit.id),
        escape_field(&unit.source),
        escape_field(unit.target.as_deref().unwrap_or_default())
    )
}

/// Escape backslashes and control characters so a field stays on one line
/// and never contains a tab.
fn escape_field(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\t' => escaped.push_str("\\t"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            c if c.is_control() => escaped.push_str(&format!("\\u{{{:04x}}}", c as u32)),
            c => escaped.push(c),
        }
    }
    escaped
}
