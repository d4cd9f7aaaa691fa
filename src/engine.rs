//! The request entry point: catalog, palettes, decoder and cache wired together
//!
//! A request captures one palette view when it starts, builds its cache key
//! from that view's generation, and renders through the cache:
//!
//! 1. Resolve the sprite to an index bitmap (decode a leaf, or assemble a
//!    composite).
//! 2. Apply the request's filter chain.
//! 3. Colorize through the sprite's palette (its override, or the base).
//!
//! Only the first request for a key renders; everything after it is a map
//! lookup.

use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::bitmap::{DecodedBitmap, RenderedBuffer};
use crate::cache::{CacheKey, RenderCache};
use crate::catalog::{CatalogError, SpriteCatalog};
use crate::composite::{CancelToken, Resolver};
use crate::config::PxrConfig;
use crate::error::RenderError;
use crate::filters::{self, Filter};
use crate::models::SpriteDefinition;
use crate::palette::{Palette, PaletteRegistry, PaletteView};
use crate::tokenizer::{Decode, TokenDecoder};

/// Result of one render request.
pub type RenderResult = Result<Arc<RenderedBuffer>, RenderError>;

/// Filtered index bitmaps kept across palette generations, keyed by sprite
/// name and filter signature.
type RetainedBitmaps = RwLock<HashMap<(String, String), Arc<DecodedBitmap>>>;

/// Collects definitions, palettes and settings, then freezes them into a
/// [`SpriteEngine`].
///
/// # Examples
///
/// ```
/// use pxrender::engine::EngineBuilder;
/// use pxrender::models::SpriteDefinition;
/// use pxrender::palette::Palette;
///
/// let engine = EngineBuilder::new()
///     .palette(Palette::parse(&["transparent", "#FF0000"]).unwrap())
///     .register("dot", SpriteDefinition::leaf("4,0|2,1", 3))
///     .unwrap()
///     .build();
///
/// let buffer = engine.get("dot", &[], None).unwrap();
/// assert_eq!((buffer.width(), buffer.height()), (3, 2));
/// ```
#[derive(Default)]
pub struct EngineBuilder {
    catalog: SpriteCatalog,
    palette: Palette,
    overrides: Vec<(String, Palette)>,
    config: PxrConfig,
    decoder: Option<Arc<dyn Decode>>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an already populated catalog.
    pub fn with_catalog(mut self, catalog: SpriteCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Register one sprite definition.
    pub fn register(
        mut self,
        name: impl Into<String>,
        definition: SpriteDefinition,
    ) -> Result<Self, CatalogError> {
        self.catalog.register(name, definition)?;
        Ok(self)
    }

    /// Set the base palette (generation 0).
    pub fn palette(mut self, palette: Palette) -> Self {
        self.palette = palette;
        self
    }

    /// Give a sprite its own palette from generation 0.
    pub fn with_override(mut self, sprite: impl Into<String>, palette: Palette) -> Self {
        self.overrides.push((sprite.into(), palette));
        self
    }

    pub fn with_config(mut self, config: PxrConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the run-length decoder. The default honors `decode.max_pixels`;
    /// composite canvases are held to it either way.
    pub fn with_decoder(mut self, decoder: Arc<dyn Decode>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn build(self) -> SpriteEngine {
        let config = self.config;
        let decoder = self.decoder.unwrap_or_else(|| {
            Arc::new(TokenDecoder::new().with_max_pixels(config.decode.max_pixels))
        });
        let palettes = PaletteRegistry::with_history(self.palette, config.palette.history)
            .with_overrides(self.overrides);

        tracing::debug!(
            sprites = self.catalog.len(),
            policy = ?config.eviction_policy(),
            retain_decoded = config.cache.retain_decoded,
            "engine built"
        );

        SpriteEngine {
            catalog: Arc::new(self.catalog),
            palettes,
            cache: RenderCache::with_policy(config.eviction_policy()),
            decoder,
            max_depth: config.decode.max_depth,
            max_pixels: config.decode.max_pixels,
            retained: config.cache.retain_decoded.then(RetainedBitmaps::default),
        }
    }
}

/// Thread-safe sprite renderer with a memoizing cache.
///
/// Share it behind an `Arc`; every method takes `&self`.
pub struct SpriteEngine {
    catalog: Arc<SpriteCatalog>,
    palettes: PaletteRegistry,
    cache: RenderCache,
    decoder: Arc<dyn Decode>,
    max_depth: usize,
    max_pixels: u64,
    retained: Option<RetainedBitmaps>,
}

impl SpriteEngine {
    /// Render `name` with `filters` under the current palette, or under the
    /// retained palette `generation` when given.
    ///
    /// Returns the cached buffer when this exact request was rendered before.
    #[tracing::instrument(level = "debug", skip(self, filters), fields(filters = %filters::signature(filters)))]
    pub fn get(&self, name: &str, filters: &[Filter], generation: Option<u64>) -> RenderResult {
        self.request(name, filters, generation, None)
    }

    /// Like [`get`](Self::get), but stops at the next composite part once
    /// `cancel` is set. A cancelled render is not cached.
    pub fn get_cancellable(
        &self,
        name: &str,
        filters: &[Filter],
        generation: Option<u64>,
        cancel: &CancelToken,
    ) -> RenderResult {
        self.request(name, filters, generation, Some(cancel))
    }

    /// Render many sprites in parallel under one palette generation.
    ///
    /// Results come back in the order of `names`; one failure does not stop
    /// the others.
    pub fn prerender<S>(&self, names: &[S], filters: &[Filter]) -> Vec<(String, RenderResult)>
    where
        S: AsRef<str> + Sync,
    {
        let generation = self.palettes.generation();
        let results: Vec<(String, RenderResult)> = names
            .par_iter()
            .map(|name| {
                let name = name.as_ref();
                (name.to_string(), self.get(name, filters, Some(generation)))
            })
            .collect();

        let failed = results.iter().filter(|(_, r)| r.is_err()).count();
        tracing::info!(generation, sprites = results.len(), failed, "prerender finished");
        results
    }

    /// Drop cached renders of superseded palette generations.
    pub fn purge_stale(&self) -> usize {
        let removed = self.cache.retain_generation(self.palettes.generation());
        if removed > 0 {
            tracing::debug!(removed, "purged stale renders");
        }
        removed
    }

    /// The palette registry; swap palettes or overrides through it.
    pub fn palettes(&self) -> &PaletteRegistry {
        &self.palettes
    }

    pub fn cache(&self) -> &RenderCache {
        &self.cache
    }

    pub fn catalog(&self) -> &SpriteCatalog {
        &self.catalog
    }

    /// Structural check of every composite under the configured depth limit.
    pub fn validate(&self) -> Vec<RenderError> {
        self.catalog.validate(self.max_depth)
    }

    fn request(
        &self,
        name: &str,
        filters: &[Filter],
        generation: Option<u64>,
        cancel: Option<&CancelToken>,
    ) -> RenderResult {
        let view = match generation {
            Some(generation) => self.palettes.view(generation)?,
            None => self.palettes.current(),
        };
        let key = CacheKey::new(name, view.generation(), filters);

        let result = self.cache.get_or_render(&key, || self.render(name, filters, &view, cancel));
        if let Err(err) = &result {
            tracing::warn!(key = %key, kind = err.kind(), error = %err, "render failed");
        }
        result
    }

    fn render(
        &self,
        name: &str,
        filters: &[Filter],
        view: &PaletteView,
        cancel: Option<&CancelToken>,
    ) -> Result<RenderedBuffer, RenderError> {
        let bitmap = self.indices(name, filters, cancel)?;
        filters::colorize(&bitmap, view.palette_for(name)).map_err(|err| {
            RenderError::IndexOutOfPalette {
                sprite: name.to_string(),
                index: err.index,
                palette_len: err.palette_len,
            }
        })
    }

    /// The filtered index bitmap for a request, from the retained set when
    /// retention is on.
    fn indices(
        &self,
        name: &str,
        filters: &[Filter],
        cancel: Option<&CancelToken>,
    ) -> Result<Arc<DecodedBitmap>, RenderError> {
        let Some(retained) = &self.retained else {
            return self.resolve(name, filters, cancel).map(Arc::new);
        };

        let key = (name.to_string(), filters::signature(filters));
        if let Some(bitmap) = retained.read().unwrap_or_else(PoisonError::into_inner).get(&key) {
            return Ok(Arc::clone(bitmap));
        }

        let bitmap = Arc::new(self.resolve(name, filters, cancel)?);
        let mut retained = retained.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(retained.entry(key).or_insert(bitmap)))
    }

    fn resolve(
        &self,
        name: &str,
        filters: &[Filter],
        cancel: Option<&CancelToken>,
    ) -> Result<DecodedBitmap, RenderError> {
        let mut resolver = Resolver::new(&self.catalog, self.decoder.as_ref())
            .with_max_depth(self.max_depth)
            .with_max_pixels(self.max_pixels);
        if let Some(cancel) = cancel {
            resolver = resolver.with_cancel(cancel);
        }
        let bitmap = resolver.resolve(name)?;
        Ok(filters::apply(&bitmap, filters))
    }
}
