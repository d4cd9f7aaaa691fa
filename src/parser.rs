//! Streaming JSON5 parsing for definition objects
//!
//! Supports both single-line JSONL and multi-line JSON5 formats.
//! JSON5 adds support for comments, trailing commas, and unquoted keys.

use crate::models::{DefinitionObject, Warning};
use std::io::{BufRead, BufReader, Read};
use thiserror::Error;

/// Error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("line {line}: {message}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
}

/// A parsed object and the line it starts on.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedObject {
    pub line: usize,
    pub object: DefinitionObject,
}

/// Result of parsing a JSON stream.
#[derive(Debug, Clone, Default)]
pub struct ParseResult {
    pub objects: Vec<ParsedObject>,
    pub warnings: Vec<Warning>,
}

/// Parse a single JSON5 string into a definition object.
pub fn parse_line(line: &str, line_number: usize) -> Result<DefinitionObject, ParseError> {
    json5::from_str(line).map_err(|e| ParseError { message: e.to_string(), line: line_number })
}

/// Parse a stream of JSON5 objects.
///
/// Objects may sit one per line (JSONL) or span several lines. Parsing stops
/// at the first malformed object, which is reported as a warning: after a
/// syntax error the next object boundary can't be found reliably.
pub fn parse_stream<R: Read>(reader: R) -> ParseResult {
    let mut result = ParseResult::default();

    let mut accumulator = String::new();
    let mut start_line = 1;
    let mut current_line = 1;
    let mut scanner = Scanner::default();

    for line in BufReader::new(reader).lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                let message = format!("unreadable input: {}", e);
                result.warnings.push(Warning { message, line: current_line });
                return result;
            }
        };
        if accumulator.is_empty() && line.trim().is_empty() {
            current_line += 1;
            start_line = current_line;
            continue;
        }

        if !accumulator.is_empty() {
            accumulator.push('\n');
        }
        accumulator.push_str(&line);

        let opened_before = scanner.seen_open;
        scanner.scan_line(&line);
        if !opened_before && scanner.seen_open {
            start_line = current_line;
        }

        if scanner.object_closed() {
            if let Err(warning) = push_object(&mut result, &accumulator, start_line) {
                result.warnings.push(warning);
                return result;
            }
            accumulator.clear();
            start_line = current_line + 1;
            scanner = Scanner::default();
        }

        current_line += 1;
    }

    // Trailing comments alone are not an object
    if scanner.seen_open {
        if let Err(warning) = push_object(&mut result, &accumulator, start_line) {
            result.warnings.push(warning);
        }
    }

    result
}

/// Tracks nesting across lines, ignoring brackets in strings and comments.
#[derive(Debug, Default)]
struct Scanner {
    depth: i32,
    seen_open: bool,
    in_string: bool,
    in_block_comment: bool,
}

impl Scanner {
    fn scan_line(&mut self, line: &str) {
        let mut chars = line.chars().peekable();
        while let Some(ch) = chars.next() {
            if self.in_block_comment {
                if ch == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    self.in_block_comment = false;
                }
                continue;
            }
            if self.in_string {
                match ch {
                    '\\' => {
                        chars.next();
                    }
                    '"' => self.in_string = false,
                    _ => {}
                }
                continue;
            }
            match ch {
                '"' => self.in_string = true,
                '/' if chars.peek() == Some(&'/') => break,
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    self.in_block_comment = true;
                }
                '{' | '[' => {
                    self.depth += 1;
                    self.seen_open = true;
                }
                '}' | ']' => self.depth -= 1,
                _ => {}
            }
        }
    }

    fn object_closed(&self) -> bool {
        self.seen_open && self.depth <= 0 && !self.in_block_comment
    }
}

fn push_object(result: &mut ParseResult, text: &str, line: usize) -> Result<(), Warning> {
    match json5::from_str::<DefinitionObject>(text) {
        Ok(object) => {
            result.objects.push(ParsedObject { line, object });
            Ok(())
        }
        Err(e) => Err(Warning { message: e.to_string(), line }),
    }
}
