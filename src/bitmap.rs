//! Index bitmaps and rendered RGBA buffers
//!
//! Both types are immutable once built: the engine hands them out behind
//! `Arc`s, so a buffer returned to a caller never changes underneath it.

use image::{Rgba, RgbaImage};

use crate::tokenizer::DecodeError;

/// Palette index reserved for transparent pixels.
pub const TRANSPARENT_INDEX: u8 = 0;

/// A row-major buffer of palette indices with known dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DecodedBitmap {
    width: u32,
    height: u32,
    indices: Vec<u8>,
}

impl DecodedBitmap {
    /// Build a bitmap from raw indices.
    ///
    /// Returns `DimensionMismatch` if `indices.len()` is not `width * height`.
    ///
    /// # Examples
    ///
    /// ```
    /// use pxrender::bitmap::DecodedBitmap;
    ///
    /// let bitmap = DecodedBitmap::new(2, 1, vec![0, 1]).unwrap();
    /// assert_eq!(bitmap.get(1, 0), Some(1));
    /// assert!(DecodedBitmap::new(2, 2, vec![0, 1]).is_err());
    /// ```
    pub fn new(width: u32, height: u32, indices: Vec<u8>) -> Result<Self, DecodeError> {
        if indices.len() as u64 != width as u64 * height as u64 {
            return Err(DecodeError::DimensionMismatch { pixels: indices.len() as u64, width });
        }
        Ok(Self { width, height, indices })
    }

    /// Internal constructor for callers that already sized the buffer.
    pub(crate) fn from_raw(width: u32, height: u32, indices: Vec<u8>) -> Self {
        debug_assert_eq!(indices.len(), width as usize * height as usize);
        Self { width, height, indices }
    }

    /// A fully transparent bitmap.
    pub fn transparent(width: u32, height: u32) -> Self {
        Self::from_raw(width, height, vec![TRANSPARENT_INDEX; width as usize * height as usize])
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row-major palette indices.
    pub fn indices(&self) -> &[u8] {
        &self.indices
    }

    /// Index at `(x, y)`, or `None` outside the bitmap.
    pub fn get(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.indices.get((y * self.width + x) as usize).copied()
    }

    /// Iterate rows as slices.
    pub fn rows(&self) -> impl Iterator<Item = &[u8]> {
        // chunks() panics on zero, and a zero-width bitmap has no rows anyway
        self.indices.chunks(self.width.max(1) as usize)
    }

    /// Highest index used, `None` for an empty bitmap.
    pub fn max_index(&self) -> Option<u8> {
        self.indices.iter().copied().max()
    }

    pub(crate) fn into_indices(self) -> Vec<u8> {
        self.indices
    }
}

/// A row-major RGBA buffer (4 bytes per pixel), ready for upload to a pixel surface.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderedBuffer {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl RenderedBuffer {
    pub(crate) fn from_raw(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(pixels.len(), width as usize * height as usize * 4);
        Self { width, height, pixels }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Flat RGBA bytes.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// The RGBA quadruple at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba<u8>> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let start = (y as usize * self.width as usize + x as usize) * 4;
        let px = self.pixels.get(start..start + 4)?;
        Some(Rgba([px[0], px[1], px[2], px[3]]))
    }

    /// Size of the pixel data in bytes, used for cache accounting.
    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }

    /// Copy into an `image` buffer for PNG output or further processing.
    pub fn to_image(&self) -> RgbaImage {
        RgbaImage::from_fn(self.width, self.height, |x, y| {
            self.pixel(x, y).unwrap_or(Rgba([0, 0, 0, 0]))
        })
    }
}
