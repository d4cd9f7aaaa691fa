//! Filters over index bitmaps, and the terminal colorize step
//!
//! Filters run on palette indices, never on colors: flips reorder pixels and
//! substitution rewrites indices. Only [`colorize`] turns indices into RGBA,
//! so every filter is applied before colors are known.
//!
//! Text syntax, as used in definition files and on the command line:
//! - `flip-h` (aliases `flip-horizontal`, `mirror-h`)
//! - `flip-v` (aliases `flip-vertical`, `mirror-v`)
//! - `sub:1=2,3=4` (alias `palette-substitute:1=2,3=4`)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::bitmap::{DecodedBitmap, RenderedBuffer};
use crate::palette::Palette;

/// Separator between filters in a chain signature.
pub const CHAIN_SEPARATOR: char = '>';

/// Error when parsing a filter from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum FilterError {
    #[error("unknown filter '{0}'")]
    UnknownFilter(String),
    #[error("invalid substitution '{entry}': {message}")]
    InvalidSubstitution { entry: String, message: String },
}

/// A colorize failure: the bitmap references a color the palette lacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("index {index} is outside palette of {palette_len} colors")]
pub struct IndexOutOfPalette {
    pub index: u8,
    pub palette_len: usize,
}

/// A transform over an index bitmap.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Filter {
    FlipHorizontal,
    FlipVertical,
    /// Rewrite indices through the map; unmapped indices pass through.
    PaletteSubstitute(BTreeMap<u8, u8>),
}

impl Filter {
    /// Convenience constructor for substitution filters.
    pub fn substitute(pairs: impl IntoIterator<Item = (u8, u8)>) -> Self {
        Filter::PaletteSubstitute(pairs.into_iter().collect())
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::FlipHorizontal => write!(f, "flip-h"),
            Filter::FlipVertical => write!(f, "flip-v"),
            Filter::PaletteSubstitute(map) => {
                let pairs: Vec<String> =
                    map.iter().map(|(from, to)| format!("{}={}", from, to)).collect();
                write!(f, "sub:{}", pairs.join(","))
            }
        }
    }
}

impl FromStr for Filter {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (op, params) = match s.split_once(':') {
            Some((op, params)) => (op, Some(params)),
            None => (s, None),
        };

        match (op.to_lowercase().as_str(), params) {
            ("flip-h" | "flip-horizontal" | "mirror-h", None) => Ok(Filter::FlipHorizontal),
            ("flip-v" | "flip-vertical" | "mirror-v", None) => Ok(Filter::FlipVertical),
            ("sub" | "palette-substitute", Some(params)) => parse_substitution(params),
            _ => Err(FilterError::UnknownFilter(s.to_string())),
        }
    }
}

impl TryFrom<String> for Filter {
    type Error = FilterError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Filter> for String {
    fn from(filter: Filter) -> Self {
        filter.to_string()
    }
}

fn parse_substitution(params: &str) -> Result<Filter, FilterError> {
    let mut map = BTreeMap::new();
    for entry in params.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let invalid = |message: &str| FilterError::InvalidSubstitution {
            entry: entry.to_string(),
            message: message.to_string(),
        };
        let (from, to) = entry.split_once('=').ok_or_else(|| invalid("expected FROM=TO"))?;
        let from = from.trim().parse::<u8>().map_err(|_| invalid("FROM is not an index"))?;
        let to = to.trim().parse::<u8>().map_err(|_| invalid("TO is not an index"))?;
        if map.insert(from, to).is_some() {
            return Err(invalid("index mapped twice"));
        }
    }
    Ok(Filter::PaletteSubstitute(map))
}

/// Canonical signature of a filter chain, used as part of the cache key.
///
/// Equal chains always produce equal signatures, and the signature parses
/// back into the same chain. An empty chain has an empty signature.
///
/// ```
/// use pxrender::filters::{signature, Filter};
///
/// let chain = [Filter::FlipHorizontal, Filter::substitute([(3, 4), (1, 2)])];
/// assert_eq!(signature(&chain), "flip-h>sub:1=2,3=4");
/// assert_eq!(signature(&[]), "");
/// ```
pub fn signature(filters: &[Filter]) -> String {
    filters.iter().map(Filter::to_string).collect::<Vec<_>>().join(&CHAIN_SEPARATOR.to_string())
}

/// Parse a chain signature (or any `>`-separated filter list).
pub fn parse_chain(chain: &str) -> Result<Vec<Filter>, FilterError> {
    chain.split(CHAIN_SEPARATOR).filter(|s| !s.trim().is_empty()).map(str::parse).collect()
}

/// Apply filters in declaration order.
pub fn apply(bitmap: &DecodedBitmap, filters: &[Filter]) -> DecodedBitmap {
    filters.iter().fold(bitmap.clone(), |acc, filter| apply_filter(acc, filter))
}

/// Apply a single filter, consuming the input.
pub fn apply_filter(bitmap: DecodedBitmap, filter: &Filter) -> DecodedBitmap {
    let (width, height) = (bitmap.width(), bitmap.height());
    let mut indices = bitmap.into_indices();

    match filter {
        Filter::FlipHorizontal => {
            for row in indices.chunks_mut(width.max(1) as usize) {
                row.reverse();
            }
        }
        Filter::FlipVertical => {
            let flipped: Vec<u8> = indices
                .chunks(width.max(1) as usize)
                .rev()
                .flat_map(|row| row.iter().copied())
                .collect();
            indices = flipped;
        }
        Filter::PaletteSubstitute(map) => {
            for index in indices.iter_mut() {
                if let Some(&to) = map.get(&*index) {
                    *index = to;
                }
            }
        }
    }

    DecodedBitmap::from_raw(width, height, indices)
}

/// Map every index through the palette into an RGBA buffer.
///
/// # Examples
///
/// ```
/// use pxrender::filters::colorize;
/// use pxrender::palette::Palette;
/// use pxrender::tokenizer::decode;
///
/// let palette = Palette::parse(&["transparent", "#FF0000"]).unwrap();
/// let buffer = colorize(&decode("4,0|2,1", 3).unwrap(), &palette).unwrap();
/// assert_eq!(buffer.pixel(2, 1), Some(image::Rgba([255, 0, 0, 255])));
/// ```
pub fn colorize(
    bitmap: &DecodedBitmap,
    palette: &Palette,
) -> Result<RenderedBuffer, IndexOutOfPalette> {
    let mut pixels = Vec::with_capacity(bitmap.indices().len() * 4);
    for &index in bitmap.indices() {
        let color = palette
            .get(index)
            .ok_or(IndexOutOfPalette { index, palette_len: palette.len() })?;
        pixels.extend_from_slice(&color.0);
    }
    Ok(RenderedBuffer::from_raw(bitmap.width(), bitmap.height(), pixels))
}
