//! Encode command: normalize a run-length string

use std::process::ExitCode;

use crate::tokenizer::{decode, encode};

use super::{EXIT_ERROR, EXIT_SUCCESS};

/// Execute the encode command
///
/// Decodes `data` at `width` and prints the canonical encoding (adjacent runs
/// merged, single pixels written bare).
pub fn run_encode(data: &str, width: u32, json: bool) -> ExitCode {
    let bitmap = match decode(data, width) {
        Ok(bitmap) => bitmap,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };
    let encoded = encode(&bitmap);

    if json {
        let report = serde_json::json!({
            "encoded": encoded,
            "width": bitmap.width(),
            "height": bitmap.height(),
        });
        println!("{}", report);
    } else {
        println!("{}", encoded);
    }
    ExitCode::from(EXIT_SUCCESS)
}
