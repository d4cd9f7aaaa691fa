//! Render command implementation

use std::path::Path;
use std::process::ExitCode;

use crate::output::{output_path, save_png};

use super::{load_input, parse_filters, resolve_config, EngineArgs};
use super::{EXIT_ERROR, EXIT_INVALID_ARGS, EXIT_SUCCESS};

/// Execute the render command
#[allow(clippy::too_many_arguments)]
pub fn run_render(
    input: &Path,
    output: Option<&Path>,
    sprite: Option<&str>,
    filter_args: &[String],
    scale: u8,
    strict: bool,
    stats: bool,
    engine_args: &EngineArgs,
) -> ExitCode {
    let filters = match parse_filters(filter_args) {
        Ok(filters) => filters,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_INVALID_ARGS);
        }
    };

    let config = match resolve_config(engine_args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let definitions = match load_input(input, strict) {
        Ok(definitions) => definitions,
        Err(code) => return code,
    };

    let names: Vec<String> = match sprite {
        Some(name) if !definitions.catalog.contains(name) => {
            eprintln!("Error: No sprite named '{}' found in input", name);
            return ExitCode::from(EXIT_INVALID_ARGS);
        }
        Some(name) => vec![name.to_string()],
        None => definitions.catalog.names().into_iter().map(String::from).collect(),
    };
    if names.is_empty() {
        eprintln!("Error: No sprites found in input file");
        return ExitCode::from(EXIT_ERROR);
    }

    let engine = definitions.into_builder().with_config(config).build();
    let single = names.len() == 1;
    let mut failed = false;

    for (name, result) in engine.prerender(&names, &filters) {
        let buffer = match result {
            Ok(buffer) => buffer,
            Err(e) => {
                eprintln!("Error: {}", e);
                failed = true;
                continue;
            }
        };

        let path = output_path(input, &name, output, single);
        match save_png(&buffer, &path, scale) {
            Ok(()) => println!("Saved: {}", path.display()),
            Err(e) => {
                eprintln!("Error: Failed to save '{}': {}", path.display(), e);
                failed = true;
            }
        }
    }

    if stats {
        let stats = engine.cache().stats();
        eprintln!(
            "Cache: {} lookups, {} hits, {} misses, {} entries, {} bytes",
            stats.lookups,
            stats.hits,
            stats.misses,
            engine.cache().len(),
            engine.cache().size_bytes()
        );
    }

    if failed {
        ExitCode::from(EXIT_ERROR)
    } else {
        ExitCode::from(EXIT_SUCCESS)
    }
}
