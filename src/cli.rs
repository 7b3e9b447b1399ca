//! CLI argument parsing.
//!
//! Flags only carry values; defaults and precedence live in `config`.
use crate::schema::TargetSchema;
use crate::store::Encoding;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "bookrich",
    version,
    about = "Enrich a title/author table with LM-derived book metadata",
    after_help = "Commands:\n  run --input <csv>             Enrich rows in place (resumable with --start)\n  status --input <csv>          Report where the last run stopped\n  salvage --input <csv>         Keep rows written by a halted run\n  clean --input <csv> --output  Normalise a raw title/author file\n\nExamples:\n  bookrich run --input books.csv --backup\n  bookrich run --input books.csv --start 51 --schema extended\n  bookrich run --input books.csv --start 51 --discard-scratch\n  bookrich status --input books.csv --json\n  bookrich salvage --input books.csv",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    /// Emit debug logging to stderr
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Run(RunArgs),
    Status(StatusArgs),
    Salvage(SalvageArgs),
    Clean(CleanArgs),
}

/// Run command inputs. Unset options fall back to the config file, the
/// environment, then built-in defaults.
#[derive(Parser, Debug, Default)]
#[command(about = "Enrich rows in place, writing each row as it completes")]
pub struct RunArgs {
    /// Delimited input file (title, author, ...)
    #[arg(long, short = 'i', value_name = "PATH")]
    pub input: PathBuf,

    /// Model identifier sent to the chat-completions endpoint
    #[arg(long, short = 'm', value_name = "MODEL")]
    pub model: Option<String>,

    /// First row to enrich (1-indexed); earlier rows are copied unchanged
    #[arg(long, short = 's', value_name = "ROW")]
    pub start: Option<usize>,

    /// Seconds to wait between inference calls
    #[arg(long, short = 'd', value_name = "SECONDS")]
    pub delay: Option<f64>,

    /// Copy the input to <input>.bak first (never overwrites an existing backup)
    #[arg(long, short = 'b')]
    pub backup: bool,

    /// Delete a halted run's scratch file instead of reusing its finished rows
    #[arg(long)]
    pub discard_scratch: bool,

    /// Retries per row before writing sentinel values
    #[arg(long, value_name = "N")]
    pub max_retries: Option<u32>,

    /// Base backoff in seconds; doubles on each retry
    #[arg(long, value_name = "SECONDS")]
    pub retry_delay: Option<f64>,

    /// Trailing columns to derive
    #[arg(long, value_enum)]
    pub schema: Option<TargetSchema>,

    /// Field delimiter
    #[arg(long, value_name = "CHAR")]
    pub delimiter: Option<char>,

    /// Input text encoding
    #[arg(long, short = 'e', value_enum)]
    pub encoding: Option<Encoding>,

    /// JSON config file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Local LM command; reads the prompt on stdin, prints the completion
    #[arg(long, value_name = "CMD")]
    pub lm_command: Option<String>,

    /// Chat-completions base URL
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// Per-row outcome log (default: <input>.log.jsonl)
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

/// Status command inputs.
#[derive(Parser, Debug)]
#[command(about = "Report where the last run stopped and how to resume")]
pub struct StatusArgs {
    #[arg(long, short = 'i', value_name = "PATH")]
    pub input: PathBuf,

    /// Per-row outcome log (default: <input>.log.jsonl)
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

/// Salvage command inputs.
#[derive(Parser, Debug)]
#[command(about = "Fold rows written by a halted run into the input file")]
pub struct SalvageArgs {
    #[arg(long, short = 'i', value_name = "PATH")]
    pub input: PathBuf,

    /// Field delimiter
    #[arg(long, value_name = "CHAR", default_value_t = ',')]
    pub delimiter: char,

    /// Input text encoding
    #[arg(long, short = 'e', value_enum, default_value_t = Encoding::Auto)]
    pub encoding: Encoding,
}

/// Clean command inputs.
#[derive(Parser, Debug)]
#[command(about = "Strip punctuation and normalise author names in a raw table")]
pub struct CleanArgs {
    #[arg(long, short = 'i', value_name = "PATH")]
    pub input: PathBuf,

    /// Where to write the cleaned table (may equal --input)
    #[arg(long, short = 'o', value_name = "PATH")]
    pub output: PathBuf,

    /// Input text encoding
    #[arg(long, short = 'e', value_enum, default_value_t = Encoding::Auto)]
    pub encoding: Encoding,

    /// Copy the input to <input>.bak first (never overwrites an existing backup)
    #[arg(long, short = 'b')]
    pub backup: bool,
}
