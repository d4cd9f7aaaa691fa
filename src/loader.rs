//! Loading a definitions file into a catalog and palettes
//!
//! A definitions file is a stream of JSON5 objects (see [`crate::parser`]):
//! exactly one effective `palette`, any number of `sprite` and `composite`
//! definitions, and optional per-sprite `override` palettes.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

use crate::catalog::{CatalogError, SpriteCatalog};
use crate::color::ColorError;
use crate::engine::EngineBuilder;
use crate::models::{DefinitionObject, SpriteDefinition, Warning};
use crate::palette::Palette;
use crate::parser::{parse_stream, ParseError, ParsedObject};

/// Error when loading a definitions file.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoadError {
    #[error("Failed to read definitions: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("line {line}: {source}")]
    Color {
        line: usize,
        #[source]
        source: ColorError,
    },
    #[error("line {line}: {source}")]
    Catalog {
        line: usize,
        #[source]
        source: CatalogError,
    },
    #[error("no palette defined")]
    MissingPalette,
}

/// Everything a definitions file declares.
#[derive(Debug, Clone, Default)]
pub struct Definitions {
    pub catalog: SpriteCatalog,
    pub palette: Palette,
    /// Per-sprite palettes, by sprite name
    pub overrides: BTreeMap<String, Palette>,
    /// Non-fatal issues (redefinitions, overrides for unknown sprites)
    pub warnings: Vec<Warning>,
}

impl Definitions {
    /// An engine builder seeded with these definitions.
    pub fn into_builder(self) -> EngineBuilder {
        self.overrides.into_iter().fold(
            EngineBuilder::new().with_catalog(self.catalog).palette(self.palette),
            |builder, (sprite, palette)| builder.with_override(sprite, palette),
        )
    }
}

/// Load definitions from a file path.
pub fn load_file(path: &Path) -> Result<Definitions, LoadError> {
    let definitions = load_definitions(File::open(path)?)?;
    tracing::debug!(
        path = %path.display(),
        sprites = definitions.catalog.len(),
        overrides = definitions.overrides.len(),
        "loaded definitions"
    );
    Ok(definitions)
}

/// Load definitions from a reader.
///
/// The first malformed object aborts the load; semantic problems that still
/// leave a usable set of definitions become warnings.
pub fn load_definitions<R: Read>(reader: R) -> Result<Definitions, LoadError> {
    let parsed = parse_stream(reader);
    if let Some(warning) = parsed.warnings.into_iter().next() {
        return Err(ParseError { message: warning.message, line: warning.line }.into());
    }

    let mut definitions = Definitions::default();
    let mut palette_line = None;

    for ParsedObject { line, object } in parsed.objects {
        match object {
            DefinitionObject::Palette { colors } => {
                if let Some(previous) = palette_line.replace(line) {
                    definitions.warnings.push(Warning {
                        message: format!("palette redefined, replacing the one on line {}", previous),
                        line,
                    });
                }
                definitions.palette = parse_palette(&colors, line)?;
            }
            DefinitionObject::Sprite { name, width, data } => {
                register(&mut definitions.catalog, name, SpriteDefinition::leaf(data, width), line)?;
            }
            DefinitionObject::Composite { name, size: [w, h], parts } => {
                register(&mut definitions.catalog, name, SpriteDefinition::composite(w, h, parts), line)?;
            }
            DefinitionObject::Override { sprite, colors } => {
                let palette = parse_palette(&colors, line)?;
                if definitions.overrides.insert(sprite.clone(), palette).is_some() {
                    definitions.warnings.push(Warning {
                        message: format!("override for '{}' redefined", sprite),
                        line,
                    });
                }
            }
        }
    }

    if palette_line.is_none() {
        return Err(LoadError::MissingPalette);
    }

    for sprite in definitions.overrides.keys() {
        if !definitions.catalog.contains(sprite) {
            definitions.warnings.push(Warning {
                message: format!("override for unknown sprite '{}'", sprite),
                line: 0,
            });
        }
    }

    Ok(definitions)
}

fn parse_palette(colors: &[String], line: usize) -> Result<Palette, LoadError> {
    Palette::parse(colors).map_err(|source| LoadError::Color { line, source })
}

fn register(
    catalog: &mut SpriteCatalog,
    name: String,
    definition: SpriteDefinition,
    line: usize,
) -> Result<(), LoadError> {
    catalog.register(name, definition).map_err(|source| LoadError::Catalog { line, source })
}
