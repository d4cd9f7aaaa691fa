//! Check command: load, validate and trial-render a definitions file

use std::path::Path;
use std::process::ExitCode;

use crate::error::RenderError;

use super::{load_input, resolve_config, EngineArgs};
use super::{EXIT_ERROR, EXIT_SUCCESS};

/// Execute the check command
///
/// Reports structural problems (unknown children, cycles, depth) first, then
/// renders every sprite once to surface decode and palette errors.
pub fn run_check(input: &Path, strict: bool, json: bool, engine_args: &EngineArgs) -> ExitCode {
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
    let warnings = definitions.warnings.len();

    let names: Vec<String> =
        definitions.catalog.names().into_iter().map(String::from).collect();
    let engine = definitions.into_builder().with_config(config).build();
    let mut errors: Vec<RenderError> = engine.validate();

    // Structural failures would only repeat as render failures
    if errors.is_empty() {
        errors.extend(engine.prerender(&names, &[]).into_iter().filter_map(|(_, r)| r.err()));
    }

    if json {
        let report = serde_json::json!({
            "file": input.display().to_string(),
            "sprites": names.len(),
            "warnings": warnings,
            "valid": errors.is_empty(),
            "errors": errors.iter().map(|e| serde_json::json!({
                "kind": e.kind(),
                "message": e.to_string(),
            })).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&report).unwrap_or_default());
    } else {
        for error in &errors {
            eprintln!("Error: {}", error);
        }
        if errors.is_empty() {
            println!("{}: {} sprites OK", input.display(), names.len());
        }
    }

    if errors.is_empty() {
        ExitCode::from(EXIT_SUCCESS)
    } else {
        ExitCode::from(EXIT_ERROR)
    }
}
