//! CLI argument definitions for rx-match.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};

#[derive(Parser)]
#[command(
    name = "rx-match",
    version,
    about = "Match OCR'd prescription medicine names against a product catalog",
    long_about = "Match OCR'd prescription medicine names against a product catalog.\n\n\
                  Results are printed as JSON: the prescription summary plus a\n\
                  validation verdict for human review."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for info, -vv for debug, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// SQLite catalog database (created if missing).
    #[arg(long = "db", value_name = "PATH", default_value = "rx-match.db", global = true)]
    pub db: PathBuf,

    /// Matcher configuration JSON (missing fields take defaults).
    #[arg(long = "config", value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Import products from a JSON array into the catalog.
    Import(ImportArgs),

    /// Search the catalog the same way the matcher does.
    Search(SearchArgs),

    /// Match an OCR payload (or explicit names) against the catalog.
    Match(MatchArgs),
}

#[derive(Parser)]
pub struct ImportArgs {
    /// JSON file holding an array of products.
    #[arg(value_name = "CATALOG_JSON")]
    pub catalog: PathBuf,
}

#[derive(Parser)]
pub struct SearchArgs {
    /// Substring to look for in product and generic names.
    #[arg(value_name = "QUERY")]
    pub query: String,

    /// Maximum number of rows.
    #[arg(long = "limit", default_value_t = 15)]
    pub limit: usize,
}

#[derive(Parser)]
pub struct MatchArgs {
    /// OCR JSON payload ({"medicineNames": [...], "confidence": ...}); "-" reads stdin.
    #[arg(value_name = "OCR_JSON", required_unless_present = "names")]
    pub input: Option<PathBuf>,

    /// Medicine name to match; repeat for several. Replaces OCR_JSON.
    #[arg(long = "name", value_name = "NAME", conflicts_with = "input")]
    pub names: Vec<String>,

    /// OCR confidence used with --name (0 - 100).
    #[arg(long = "ocr-confidence", default_value_t = 100.0)]
    pub ocr_confidence: f64,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
