//! Command-line interface implementation
//!
//! This module provides the CLI entry point and dispatches to submodules
//! for specific command implementations.

mod check;
mod encode;
mod render;

use clap::{ArgAction, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::config::{load_config, merge_cli_overrides, CliOverrides, PxrConfig};
use crate::filters::{parse_chain, Filter};
use crate::loader::{load_file, Definitions};

/// Process exit codes
pub(crate) const EXIT_SUCCESS: u8 = 0;
pub(crate) const EXIT_ERROR: u8 = 1;
pub(crate) const EXIT_INVALID_ARGS: u8 = 2;

/// pxr - Decode, composite and render run-length encoded sprites
#[derive(Parser)]
#[command(name = "pxr")]
#[command(about = "Decode, composite and render run-length encoded sprites to PNG")]
#[command(version)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Settings shared by commands that build an engine.
#[derive(clap::Args, Debug, Clone)]
pub struct EngineArgs {
    /// Path to pxr.toml (default: search upward from the working directory)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Bound the render cache to this many bytes (LRU eviction)
    #[arg(long)]
    pub max_bytes: Option<usize>,

    /// Maximum pixels a single sprite may decode to
    #[arg(long)]
    pub max_pixels: Option<u64>,

    /// Maximum composite nesting depth
    #[arg(long)]
    pub max_depth: Option<usize>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Render sprites from a definitions file to PNG
    Render {
        /// Definitions file (JSONL or multi-line JSON5)
        input: PathBuf,

        /// Output file or directory.
        /// If omitted: {input}_{sprite}.png
        /// If file (single sprite): output.png
        /// If file (multiple): output_{sprite}.png
        /// If directory (ends with /): dir/{sprite}.png
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Only render the sprite with this name
        #[arg(short, long)]
        sprite: Option<String>,

        /// Filter to apply, e.g. flip-h, flip-v, sub:1=2 (repeatable, or chained with '>')
        #[arg(short, long = "filter")]
        filters: Vec<String>,

        /// Scale output by integer factor (1-64, default: 1)
        #[arg(long, default_value = "1", value_parser = clap::value_parser!(u8).range(1..=64))]
        scale: u8,

        /// Strict mode: treat warnings as errors
        #[arg(long)]
        strict: bool,

        /// Print render cache statistics when done
        #[arg(long)]
        stats: bool,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Load a definitions file and report every problem without writing output
    Check {
        /// Definitions file (JSONL or multi-line JSON5)
        input: PathBuf,

        /// Strict mode: treat warnings as errors
        #[arg(long)]
        strict: bool,

        /// Output results as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Normalize a run-length encoded pixel string
    Encode {
        /// Encoded pixels, e.g. "4,0|2,1"
        data: String,

        /// Sprite width in pixels
        #[arg(short, long)]
        width: u32,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Run the CLI application
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Render { input, output, sprite, filters, scale, strict, stats, engine } => {
            render::run_render(
                &input,
                output.as_deref(),
                sprite.as_deref(),
                &filters,
                scale,
                strict,
                stats,
                &engine,
            )
        }
        Commands::Check { input, strict, json, engine } => {
            check::run_check(&input, strict, json, &engine)
        }
        Commands::Encode { data, width, json } => encode::run_encode(&data, width, json),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    // Only fails if a subscriber is already installed
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Load pxr.toml and apply command-line overrides.
pub(crate) fn resolve_config(args: &EngineArgs) -> Result<PxrConfig, String> {
    let mut config = load_config(args.config.as_deref()).map_err(|e| e.to_string())?;
    let overrides = CliOverrides {
        max_bytes: args.max_bytes,
        max_pixels: args.max_pixels,
        max_depth: args.max_depth,
    };
    merge_cli_overrides(&mut config, &overrides);

    let errors = config.validate();
    if !errors.is_empty() {
        let lines: Vec<String> = errors.iter().map(|e| format!("  - {}", e)).collect();
        return Err(format!("Invalid configuration:\n{}", lines.join("\n")));
    }
    Ok(config)
}

/// Parse `--filter` values; each may itself be a `>`-separated chain.
pub(crate) fn parse_filters(values: &[String]) -> Result<Vec<Filter>, String> {
    let mut filters = Vec::new();
    for value in values {
        filters.extend(parse_chain(value).map_err(|e| e.to_string())?);
    }
    Ok(filters)
}

/// Load a definitions file, printing warnings. Strict mode turns warnings
/// into a failure.
pub(crate) fn load_input(input: &Path, strict: bool) -> Result<Definitions, ExitCode> {
    let definitions = match load_file(input) {
        Ok(definitions) => definitions,
        Err(e) => {
            eprintln!("Error: {}: {}", input.display(), e);
            return Err(ExitCode::from(EXIT_ERROR));
        }
    };

    for warning in &definitions.warnings {
        let prefix = if strict { "Error" } else { "Warning" };
        if warning.line > 0 {
            eprintln!("{}: line {}: {}", prefix, warning.line, warning.message);
        } else {
            eprintln!("{}: {}", prefix, warning.message);
        }
    }
    if strict && !definitions.warnings.is_empty() {
        return Err(ExitCode::from(EXIT_ERROR));
    }
    Ok(definitions)
}
