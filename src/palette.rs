//! Palettes and the palette registry
//!
//! The registry owns the active color table plus any per-sprite overrides.
//! Every change publishes a new immutable [`PaletteView`] under the next
//! generation id; views already handed out are never touched, so a render
//! that captured generation `n` finishes under generation `n` even if a swap
//! lands halfway through it.

use image::Rgba;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};

use crate::color::{parse_color, ColorError};
use crate::error::RenderError;

/// Number of superseded views kept for explicit-generation lookups.
pub const DEFAULT_HISTORY: usize = 8;

/// An ordered table of RGBA colors. Index 0 is transparent by convention.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Palette {
    colors: Vec<Rgba<u8>>,
}

impl Palette {
    pub fn new(colors: Vec<Rgba<u8>>) -> Self {
        Self { colors }
    }

    /// Parse color strings (hex or CSS) into a palette.
    ///
    /// ```
    /// use pxrender::palette::Palette;
    ///
    /// let palette = Palette::parse(&["transparent", "#FF0000"]).unwrap();
    /// assert_eq!(palette.len(), 2);
    /// assert_eq!(palette.get(1), Some(image::Rgba([255, 0, 0, 255])));
    /// ```
    pub fn parse<S: AsRef<str>>(colors: &[S]) -> Result<Self, ColorError> {
        colors
            .iter()
            .map(|c| parse_color(c.as_ref()))
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn get(&self, index: u8) -> Option<Rgba<u8>> {
        self.colors.get(index as usize).copied()
    }

    pub fn colors(&self) -> &[Rgba<u8>] {
        &self.colors
    }

    /// First index holding `color`, if any.
    pub fn index_of(&self, color: Rgba<u8>) -> Option<u8> {
        self.colors.iter().position(|c| *c == color).and_then(|i| u8::try_from(i).ok())
    }
}

/// An immutable snapshot of the registry at one generation.
#[derive(Debug, Clone)]
pub struct PaletteView {
    generation: u64,
    base: Arc<Palette>,
    overrides: Arc<HashMap<String, Arc<Palette>>>,
}

impl PaletteView {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The shared palette used by sprites without an override.
    pub fn base(&self) -> &Palette {
        &self.base
    }

    /// The palette a sprite renders with: its override, or the base palette.
    pub fn palette_for(&self, sprite: &str) -> &Palette {
        self.overrides.get(sprite).map(Arc::as_ref).unwrap_or(self.base.as_ref())
    }

    pub fn has_override(&self, sprite: &str) -> bool {
        self.overrides.contains_key(sprite)
    }
}

#[derive(Debug)]
struct RegistryState {
    current: PaletteView,
    history: VecDeque<PaletteView>,
}

/// Process-wide palette state with copy-on-write swaps.
#[derive(Debug)]
pub struct PaletteRegistry {
    state: RwLock<RegistryState>,
    history_limit: usize,
}

impl PaletteRegistry {
    /// Create a registry at generation 0.
    pub fn new(palette: Palette) -> Self {
        Self::with_history(palette, DEFAULT_HISTORY)
    }

    /// Create a registry retaining up to `history_limit` superseded views.
    pub fn with_history(palette: Palette, history_limit: usize) -> Self {
        let current = PaletteView {
            generation: 0,
            base: Arc::new(palette),
            overrides: Arc::new(HashMap::new()),
        };
        Self { state: RwLock::new(RegistryState { current, history: VecDeque::new() }), history_limit }
    }

    /// Seed per-sprite overrides into generation 0, before any view is taken.
    pub fn with_overrides(mut self, overrides: impl IntoIterator<Item = (String, Palette)>) -> Self {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        let mut seeded = state.current.overrides.as_ref().clone();
        seeded.extend(overrides.into_iter().map(|(sprite, palette)| (sprite, Arc::new(palette))));
        state.current.overrides = Arc::new(seeded);
        self
    }

    /// Snapshot of the active palette and its generation.
    pub fn current(&self) -> PaletteView {
        self.state.read().unwrap_or_else(PoisonError::into_inner).current.clone()
    }

    pub fn generation(&self) -> u64 {
        self.state.read().unwrap_or_else(PoisonError::into_inner).current.generation
    }

    /// Snapshot for a specific generation, current or retained.
    pub fn view(&self, generation: u64) -> Result<PaletteView, RenderError> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        if state.current.generation == generation {
            return Ok(state.current.clone());
        }
        state
            .history
            .iter()
            .find(|v| v.generation == generation)
            .cloned()
            .ok_or(RenderError::UnknownGeneration(generation))
    }

    /// Replace the base palette. Returns the new generation.
    pub fn set_palette(&self, palette: Palette) -> u64 {
        let colors = palette.len();
        let generation = self.publish(|current| PaletteView {
            generation: current.generation + 1,
            base: Arc::new(palette),
            overrides: Arc::clone(&current.overrides),
        });
        tracing::info!(generation, colors, "palette swapped");
        generation
    }

    /// Give one sprite its own palette. Returns the new generation.
    pub fn set_override(&self, sprite: impl Into<String>, palette: Palette) -> u64 {
        let sprite = sprite.into();
        let generation = self.publish(|current| {
            let mut overrides = current.overrides.as_ref().clone();
            overrides.insert(sprite.clone(), Arc::new(palette));
            PaletteView {
                generation: current.generation + 1,
                base: Arc::clone(&current.base),
                overrides: Arc::new(overrides),
            }
        });
        tracing::info!(generation, sprite = %sprite, "palette override set");
        generation
    }

    /// Remove a sprite's override. Returns the new generation, or `None` if
    /// the sprite had no override (nothing changes, no generation is used).
    pub fn clear_override(&self, sprite: &str) -> Option<u64> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if !state.current.overrides.contains_key(sprite) {
            return None;
        }

        let mut overrides = state.current.overrides.as_ref().clone();
        overrides.remove(sprite);
        let next = PaletteView {
            generation: state.current.generation + 1,
            base: Arc::clone(&state.current.base),
            overrides: Arc::new(overrides),
        };
        let generation = next.generation;
        self.push_history(&mut state, next);
        tracing::info!(generation, sprite, "palette override cleared");
        Some(generation)
    }

    fn publish(&self, build: impl FnOnce(&PaletteView) -> PaletteView) -> u64 {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let next = build(&state.current);
        let generation = next.generation;
        self.push_history(&mut state, next);
        generation
    }

    fn push_history(&self, state: &mut RegistryState, next: PaletteView) {
        let previous = std::mem::replace(&mut state.current, next);
        if self.history_limit == 0 {
            return;
        }
        state.history.push_back(previous);
        while state.history.len() > self.history_limit {
            state.history.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_color(second: [u8; 4]) -> Palette {
        Palette::new(vec![Rgba([0, 0, 0, 0]), Rgba(second)])
    }

    #[test]
    fn test_initial_generation() {
        let registry = PaletteRegistry::new(two_color([255, 0, 0, 255]));
        let view = registry.current();
        assert_eq!(view.generation(), 0);
        assert_eq!(view.base().len(), 2);
    }

    #[test]
    fn test_set_palette_bumps_generation() {
        let registry = PaletteRegistry::new(two_color([255, 0, 0, 255]));
        assert_eq!(registry.set_palette(two_color([0, 255, 0, 255])), 1);
        assert_eq!(registry.set_palette(two_color([0, 0, 255, 255])), 2);
        assert_eq!(registry.generation(), 2);
    }

    #[test]
    fn test_captured_view_survives_swap() {
        let registry = PaletteRegistry::new(two_color([255, 0, 0, 255]));
        let before = registry.current();
        registry.set_palette(two_color([0, 255, 0, 255]));

        assert_eq!(before.generation(), 0);
        assert_eq!(before.base().get(1), Some(Rgba([255, 0, 0, 255])));
        assert_eq!(registry.current().base().get(1), Some(Rgba([0, 255, 0, 255])));
    }

    #[test]
    fn test_overrides() {
        let registry = PaletteRegistry::new(two_color([255, 0, 0, 255]));
        let generation = registry.set_override("hero", two_color([0, 0, 255, 255]));
        assert_eq!(generation, 1);

        let view = registry.current();
        assert!(view.has_override("hero"));
        assert_eq!(view.palette_for("hero").get(1), Some(Rgba([0, 0, 255, 255])));
        assert_eq!(view.palette_for("slime").get(1), Some(Rgba([255, 0, 0, 255])));

        // Base swaps keep overrides
        registry.set_palette(two_color([1, 1, 1, 255]));
        assert!(registry.current().has_override("hero"));

        assert_eq!(registry.clear_override("hero"), Some(3));
        assert_eq!(registry.clear_override("hero"), None);
        assert_eq!(registry.generation(), 3);
    }

    #[test]
    fn test_seeded_overrides_stay_at_generation_zero() {
        let registry = PaletteRegistry::new(two_color([255, 0, 0, 255]))
            .with_overrides([("hero".to_string(), two_color([0, 0, 255, 255]))]);
        let view = registry.current();
        assert_eq!(view.generation(), 0);
        assert_eq!(view.palette_for("hero").get(1), Some(Rgba([0, 0, 255, 255])));
    }

    #[test]
    fn test_view_history() {
        let registry = PaletteRegistry::with_history(two_color([255, 0, 0, 255]), 2);
        registry.set_palette(two_color([0, 255, 0, 255]));
        registry.set_palette(two_color([0, 0, 255, 255]));
        registry.set_palette(two_color([9, 9, 9, 255]));

        assert_eq!(registry.view(3).unwrap().generation(), 3);
        assert_eq!(registry.view(2).unwrap().base().get(1), Some(Rgba([0, 0, 255, 255])));
        assert!(registry.view(1).is_ok());
        assert_eq!(registry.view(0).unwrap_err(), RenderError::UnknownGeneration(0));
        assert_eq!(registry.view(7).unwrap_err(), RenderError::UnknownGeneration(7));
    }

    #[test]
    fn test_index_of() {
        let palette = two_color([255, 0, 0, 255]);
        assert_eq!(palette.index_of(Rgba([255, 0, 0, 255])), Some(1));
        assert_eq!(palette.index_of(Rgba([1, 2, 3, 4])), None);
    }
}
