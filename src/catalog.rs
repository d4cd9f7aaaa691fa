//! Sprite catalog: name to raw definition
//!
//! The catalog is filled during initialization and then frozen (the engine
//! holds it behind an `Arc`), so resolution never races a registration.

use std::collections::HashMap;
use thiserror::Error;

use crate::composite::check_references;
use crate::error::RenderError;
use crate::models::SpriteDefinition;

/// Error when registering or looking up a sprite.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum CatalogError {
    #[error("Sprite '{0}' is already registered")]
    DuplicateName(String),
    #[error("Sprite '{0}' not found")]
    UnknownSprite(String),
    /// The definition can never render (zero width, empty canvas)
    #[error("Sprite '{name}' is invalid: {message}")]
    InvalidDefinition { name: String, message: String },
}

/// Registry of sprite definitions by name.
#[derive(Debug, Clone, Default)]
pub struct SpriteCatalog {
    sprites: HashMap<String, SpriteDefinition>,
}

impl SpriteCatalog {
    pub fn new() -> Self {
        Self { sprites: HashMap::new() }
    }

    /// Register a definition under a new name.
    ///
    /// # Examples
    ///
    /// ```
    /// use pxrender::catalog::{CatalogError, SpriteCatalog};
    /// use pxrender::models::SpriteDefinition;
    ///
    /// let mut catalog = SpriteCatalog::new();
    /// catalog.register("dot", SpriteDefinition::leaf("1", 1)).unwrap();
    /// assert_eq!(
    ///     catalog.register("dot", SpriteDefinition::leaf("2", 1)),
    ///     Err(CatalogError::DuplicateName("dot".to_string()))
    /// );
    /// ```
    pub fn register(
        &mut self,
        name: impl Into<String>,
        definition: SpriteDefinition,
    ) -> Result<(), CatalogError> {
        let name = name.into();
        if self.sprites.contains_key(&name) {
            return Err(CatalogError::DuplicateName(name));
        }
        check_shape(&name, &definition)?;
        self.sprites.insert(name, definition);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<&SpriteDefinition, CatalogError> {
        self.sprites.get(name).ok_or_else(|| CatalogError::UnknownSprite(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sprites.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.sprites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sprites.is_empty()
    }

    /// All registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.sprites.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Check every composite's references without rendering anything.
    ///
    /// Reports unknown children, cycles and over-deep nesting, one error per
    /// failing sprite, in name order.
    pub fn validate(&self, max_depth: usize) -> Vec<RenderError> {
        self.names()
            .into_iter()
            .filter(|name| self.sprites.get(*name).is_some_and(SpriteDefinition::is_composite))
            .filter_map(|name| check_references(self, name, max_depth).err())
            .collect()
    }
}

fn check_shape(name: &str, definition: &SpriteDefinition) -> Result<(), CatalogError> {
    let invalid = |message: &str| CatalogError::InvalidDefinition {
        name: name.to_string(),
        message: message.to_string(),
    };
    match definition {
        SpriteDefinition::Leaf { width: 0, .. } => Err(invalid("width must be positive")),
        SpriteDefinition::Composite { size: [w, h], .. } if *w == 0 || *h == 0 => {
            Err(invalid("canvas dimensions must be positive"))
        }
        _ => Ok(()),
    }
}
