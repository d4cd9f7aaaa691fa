//! Run-length token decoding for encoded sprite strings
//!
//! An encoded sprite is a sequence of runs separated by `|`. Each run is
//! either `count,index` or a bare `index` (count 1):
//!
//! ```text
//! stream := run ( '|' run )*
//! run    := index | count ',' index
//! count  := decimal, at least 1
//! index  := decimal 0..=255
//! ```
//!
//! Runs expand in order into a row-major index buffer; the height is the
//! pixel total divided by the declared width. Whitespace around runs and
//! numbers is ignored.

use thiserror::Error;

use crate::bitmap::DecodedBitmap;

/// Separates runs in an encoded stream.
pub const RUN_SEPARATOR: char = '|';

/// Separates the repeat count from the color index within a run.
pub const COUNT_SEPARATOR: char = ',';

/// Default cap on decoded pixels (a 4096x4096 sprite).
pub const DEFAULT_MAX_PIXELS: u64 = 4096 * 4096;

/// Error when decoding an encoded sprite string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum DecodeError {
    /// The token stream is not valid run syntax
    #[error("malformed encoding at run {run}: {message}")]
    MalformedEncoding { run: usize, message: String },
    /// Pixel total does not form whole rows of the declared width
    #[error("{pixels} pixels do not divide into rows of width {width}")]
    DimensionMismatch { pixels: u64, width: u32 },
    /// Pixel total exceeds the decoder's limit
    #[error("decoded size of {pixels} pixels exceeds limit of {limit}")]
    TooLarge { pixels: u64, limit: u64 },
}

impl DecodeError {
    fn malformed(run: usize, message: impl Into<String>) -> Self {
        Self::MalformedEncoding { run, message: message.into() }
    }
}

/// A single `count,index` run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run {
    pub count: u32,
    pub index: u8,
}

/// Something that turns an encoded string into an index bitmap.
///
/// The engine decodes every leaf through this trait, so alternative
/// decoders (instrumented, cached, or stricter) can be swapped in.
pub trait Decode: Send + Sync {
    fn decode(&self, encoded: &str, width: u32) -> Result<DecodedBitmap, DecodeError>;
}

/// The standard run-length decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenDecoder {
    max_pixels: u64,
}

impl TokenDecoder {
    pub fn new() -> Self {
        Self { max_pixels: DEFAULT_MAX_PIXELS }
    }

    /// Set the maximum number of pixels a single leaf may decode to.
    pub fn with_max_pixels(mut self, max_pixels: u64) -> Self {
        self.max_pixels = max_pixels;
        self
    }

    pub fn max_pixels(&self) -> u64 {
        self.max_pixels
    }
}

impl Default for TokenDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decode for TokenDecoder {
    fn decode(&self, encoded: &str, width: u32) -> Result<DecodedBitmap, DecodeError> {
        decode_with_limit(encoded, width, self.max_pixels)
    }
}

/// Decode an encoded sprite string with the default pixel limit.
///
/// # Examples
///
/// ```
/// use pxrender::tokenizer::decode;
///
/// let bitmap = decode("4,0|2,1", 3).unwrap();
/// assert_eq!((bitmap.width(), bitmap.height()), (3, 2));
/// assert_eq!(bitmap.indices(), &[0, 0, 0, 0, 1, 1]);
/// ```
pub fn decode(encoded: &str, width: u32) -> Result<DecodedBitmap, DecodeError> {
    decode_with_limit(encoded, width, DEFAULT_MAX_PIXELS)
}

/// Decode an encoded sprite string, failing if it expands past `max_pixels`.
///
/// The pixel total is checked before anything is allocated.
pub fn decode_with_limit(
    encoded: &str,
    width: u32,
    max_pixels: u64,
) -> Result<DecodedBitmap, DecodeError> {
    let runs = parse_runs(encoded)?;

    let pixels = runs.iter().map(|r| r.count as u64).sum::<u64>();
    if pixels > max_pixels {
        return Err(DecodeError::TooLarge { pixels, limit: max_pixels });
    }
    if width == 0 || pixels % width as u64 != 0 {
        return Err(DecodeError::DimensionMismatch { pixels, width });
    }

    let mut indices = Vec::with_capacity(pixels as usize);
    for run in &runs {
        indices.extend(std::iter::repeat(run.index).take(run.count as usize));
    }

    let height = (pixels / width as u64) as u32;
    tracing::trace!(width, height, runs = runs.len(), "decoded leaf");
    Ok(DecodedBitmap::from_raw(width, height, indices))
}

/// Parse an encoded string into its runs without expanding them.
///
/// Run numbers in errors are 1-based.
pub fn parse_runs(encoded: &str) -> Result<Vec<Run>, DecodeError> {
    if encoded.trim().is_empty() {
        return Err(DecodeError::malformed(0, "empty token stream"));
    }

    encoded
        .split(RUN_SEPARATOR)
        .enumerate()
        .map(|(i, run)| parse_run(run, i + 1))
        .collect()
}

fn parse_run(run: &str, position: usize) -> Result<Run, DecodeError> {
    let run = run.trim();
    if run.is_empty() {
        return Err(DecodeError::malformed(position, "empty run"));
    }

    let (count, index) = match run.split_once(COUNT_SEPARATOR) {
        Some((count, index)) => (parse_count(count, position)?, index),
        None => (1, run),
    };

    if index.contains(COUNT_SEPARATOR) {
        return Err(DecodeError::malformed(
            position,
            format!("too many '{}' in run '{}'", COUNT_SEPARATOR, run),
        ));
    }

    Ok(Run { count, index: parse_index(index, position)? })
}

fn parse_count(count: &str, position: usize) -> Result<u32, DecodeError> {
    let count = count.trim();
    if count.is_empty() {
        return Err(DecodeError::malformed(position, "missing repeat count"));
    }
    if !is_decimal(count) {
        return Err(DecodeError::malformed(
            position,
            format!("repeat count '{}' is not a number", count),
        ));
    }

    match count.parse::<u32>() {
        Ok(0) => Err(DecodeError::malformed(position, "repeat count must be at least 1")),
        Ok(n) => Ok(n),
        Err(_) => Err(DecodeError::malformed(
            position,
            format!("repeat count '{}' is too large", count),
        )),
    }
}

fn parse_index(index: &str, position: usize) -> Result<u8, DecodeError> {
    let index = index.trim();
    if index.is_empty() {
        return Err(DecodeError::malformed(position, "run ends before its color index"));
    }
    if !is_decimal(index) {
        return Err(DecodeError::malformed(
            position,
            format!("'{}' is not a color index", index),
        ));
    }

    index.parse::<u8>().map_err(|_| {
        DecodeError::malformed(position, format!("color index {} is above 255", index))
    })
}

fn is_decimal(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit())
}

/// Encode a bitmap into canonical run syntax.
///
/// Adjacent equal indices collapse into one run, and the count is omitted
/// for single pixels. Row boundaries are not marked; the width travels
/// separately.
///
/// # Examples
///
/// ```
/// use pxrender::tokenizer::{decode, encode};
///
/// let bitmap = decode("0|0|0|0|1|1", 3).unwrap();
/// assert_eq!(encode(&bitmap), "4,0|2,1");
/// ```
pub fn encode(bitmap: &DecodedBitmap) -> String {
    let mut runs: Vec<Run> = Vec::new();
    for &index in bitmap.indices() {
        match runs.last_mut() {
            Some(run) if run.index == index && run.count < u32::MAX => run.count += 1,
            _ => runs.push(Run { count: 1, index }),
        }
    }

    runs.iter()
        .map(|run| match run.count {
            1 => run.index.to_string(),
            n => format!("{}{}{}", n, COUNT_SEPARATOR, run.index),
        })
        .collect::<Vec<_>>()
        .join(&RUN_SEPARATOR.to_string())
}
