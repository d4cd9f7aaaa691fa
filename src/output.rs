//! PNG output and file path generation

use image::imageops::FilterType;
use image::RgbaImage;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::bitmap::RenderedBuffer;

/// Error type for output operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Save a rendered sprite as PNG, scaled by an integer factor.
///
/// Parent directories are created as needed.
pub fn save_png(buffer: &RenderedBuffer, path: &Path, scale: u8) -> Result<(), OutputError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    scale_image(buffer.to_image(), scale).save(path)?;
    Ok(())
}

/// Scale image by integer factor using nearest-neighbor interpolation.
///
/// This preserves crisp pixel edges. A factor of 0 or 1 returns the image
/// unchanged.
pub fn scale_image(image: RgbaImage, factor: u8) -> RgbaImage {
    if factor <= 1 {
        return image;
    }
    let (w, h) = image.dimensions();
    image::imageops::resize(&image, w * factor as u32, h * factor as u32, FilterType::Nearest)
}

/// Where a rendered sprite is written.
///
/// | Scenario | Output |
/// |----------|--------|
/// | No `-o`, sprite "hero" from `defs.jsonl` | `defs_hero.png` |
/// | `-o out.png`, single sprite | `out.png` |
/// | `-o out.png`, several sprites | `out_hero.png` |
/// | `-o dir/` | `dir/hero.png` |
pub fn output_path(
    input: &Path,
    sprite: &str,
    output: Option<&Path>,
    single: bool,
) -> PathBuf {
    match output {
        Some(out) if out.to_string_lossy().ends_with('/') || out.is_dir() => {
            out.join(format!("{}.png", sprite))
        }
        Some(out) if single => out.to_path_buf(),
        Some(out) => {
            let stem = out.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
            out.with_file_name(format!("{}_{}.png", stem, sprite))
        }
        None => {
            let stem = input.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
            input.with_file_name(format!("{}_{}.png", stem, sprite))
        }
    }
}
