//! Composite resolution - assembling sprites from other sprites
//!
//! A composite is a canvas of palette indices onto which its parts are
//! resolved, filtered and blitted in declaration order. Parts may be
//! composites themselves; a resolution stack tracks the names currently being
//! resolved, so a cycle is reported instead of recursing forever.
//!
//! Blitting rules:
//! - The canvas starts fully transparent (index 0).
//! - Pixels falling outside the canvas are dropped without error.
//! - A part's transparent pixels leave the canvas untouched; every other
//!   index overwrites what earlier parts drew (last write wins, no blending).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::bitmap::{DecodedBitmap, TRANSPARENT_INDEX};
use crate::catalog::SpriteCatalog;
use crate::error::RenderError;
use crate::filters;
use crate::models::{CompositePart, SpriteDefinition};
use crate::tokenizer::{Decode, DecodeError, DEFAULT_MAX_PIXELS};

/// Default limit on composite nesting.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Cooperative cancellation flag for an in-flight render.
///
/// Clones share the flag. The resolver polls it before every part, so a
/// cancelled render stops at the next part boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Names currently being resolved, outermost first.
#[derive(Debug, Default)]
struct ResolveStack {
    names: Vec<String>,
}

impl ResolveStack {
    /// Enter `name`, failing on re-entry or when nesting exceeds `max_depth`.
    fn push(&mut self, name: &str, max_depth: usize) -> Result<(), RenderError> {
        if let Some(start) = self.names.iter().position(|n| n == name) {
            let mut path = self.names[start..].to_vec();
            path.push(name.to_string());
            return Err(RenderError::CyclicReference { path });
        }
        if self.names.len() >= max_depth {
            return Err(RenderError::DepthExceeded { sprite: name.to_string(), limit: max_depth });
        }
        self.names.push(name.to_string());
        Ok(())
    }

    fn pop(&mut self) {
        self.names.pop();
    }
}

/// Resolves sprite names to index bitmaps.
pub struct Resolver<'a> {
    catalog: &'a SpriteCatalog,
    decoder: &'a dyn Decode,
    max_depth: usize,
    max_pixels: u64,
    cancel: Option<&'a CancelToken>,
}

impl<'a> Resolver<'a> {
    pub fn new(catalog: &'a SpriteCatalog, decoder: &'a dyn Decode) -> Self {
        Self {
            catalog,
            decoder,
            max_depth: DEFAULT_MAX_DEPTH,
            max_pixels: DEFAULT_MAX_PIXELS,
            cancel: None,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Cap the canvas size of any composite, in pixels.
    pub fn with_max_pixels(mut self, max_pixels: u64) -> Self {
        self.max_pixels = max_pixels;
        self
    }

    pub fn with_cancel(mut self, cancel: &'a CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Resolve a sprite by name, decoding leaves and assembling composites.
    pub fn resolve(&self, name: &str) -> Result<DecodedBitmap, RenderError> {
        let mut stack = ResolveStack::default();
        self.resolve_named(name, None, &mut stack)
    }

    fn resolve_named(
        &self,
        name: &str,
        parent: Option<&str>,
        stack: &mut ResolveStack,
    ) -> Result<DecodedBitmap, RenderError> {
        self.check_cancelled(name)?;
        let definition = lookup(self.catalog, name, parent)?;

        stack.push(name, self.max_depth)?;
        let result = match definition {
            SpriteDefinition::Leaf { encoded, width } => self
                .decoder
                .decode(encoded, *width)
                .map_err(|source| RenderError::Decode { sprite: name.to_string(), source }),
            SpriteDefinition::Composite { size, parts } => self.compose(name, *size, parts, stack),
        };
        stack.pop();
        result
    }

    fn compose(
        &self,
        name: &str,
        [width, height]: [u32; 2],
        parts: &[CompositePart],
        stack: &mut ResolveStack,
    ) -> Result<DecodedBitmap, RenderError> {
        let pixels = width as u64 * height as u64;
        let len = usize::try_from(pixels).ok().filter(|_| pixels <= self.max_pixels).ok_or_else(
            || RenderError::Decode {
                sprite: name.to_string(),
                source: DecodeError::TooLarge { pixels, limit: self.max_pixels },
            },
        )?;
        let mut canvas = Canvas::new(width, height, len);
        for part in parts {
            self.check_cancelled(name)?;
            let child = self.resolve_named(&part.sprite, Some(name), stack)?;
            let child = filters::apply(&child, &part.filters);
            canvas.blit(&child, part.offset[0], part.offset[1]);
        }
        tracing::trace!(sprite = name, width, height, parts = parts.len(), "composited");
        Ok(canvas.into_bitmap())
    }

    fn check_cancelled(&self, name: &str) -> Result<(), RenderError> {
        match self.cancel {
            Some(token) if token.is_cancelled() => Err(RenderError::Cancelled(name.to_string())),
            _ => Ok(()),
        }
    }
}

fn lookup<'c>(
    catalog: &'c SpriteCatalog,
    name: &str,
    parent: Option<&str>,
) -> Result<&'c SpriteDefinition, RenderError> {
    catalog.lookup(name).map_err(|_| match parent {
        Some(parent) => {
            RenderError::UnknownChild { parent: parent.to_string(), child: name.to_string() }
        }
        None => RenderError::UnknownSprite(name.to_string()),
    })
}

/// Check that `name` and everything it references resolves structurally:
/// every child exists, no cycles, nesting within `max_depth`. Nothing is
/// decoded.
pub fn check_references(
    catalog: &SpriteCatalog,
    name: &str,
    max_depth: usize,
) -> Result<(), RenderError> {
    let mut stack = ResolveStack::default();
    let mut verified = HashMap::new();
    check_node(catalog, name, None, max_depth, &mut stack, &mut verified)
}

fn check_node(
    catalog: &SpriteCatalog,
    name: &str,
    parent: Option<&str>,
    max_depth: usize,
    stack: &mut ResolveStack,
    verified: &mut HashMap<String, usize>,
) -> Result<(), RenderError> {
    let definition = lookup(catalog, name, parent)?;
    let depth = stack.names.len();
    stack.push(name, max_depth)?;
    // A subtree verified at some depth also passes at any shallower one
    for child in definition.children() {
        if verified.get(child).is_some_and(|&at| depth + 1 <= at) {
            continue;
        }
        check_node(catalog, child, Some(name), max_depth, stack, verified)?;
    }
    stack.pop();
    verified.entry(name.to_string()).and_modify(|at| *at = (*at).max(depth)).or_insert(depth);
    Ok(())
}

/// A mutable index canvas used while assembling a composite.
struct Canvas {
    width: u32,
    height: u32,
    indices: Vec<u8>,
}

impl Canvas {
    fn new(width: u32, height: u32, len: usize) -> Self {
        Self { width, height, indices: vec![TRANSPARENT_INDEX; len] }
    }

    /// Draw `src` with its top-left corner at `(x, y)`, clipped to the canvas.
    fn blit(&mut self, src: &DecodedBitmap, x: i32, y: i32) {
        let (cw, ch) = (self.width as i64, self.height as i64);
        let (x, y) = (x as i64, y as i64);

        // Source rows/columns that land inside the canvas
        let col_start = (-x).max(0);
        let col_end = (cw - x).min(src.width() as i64);
        let row_start = (-y).max(0);
        let row_end = (ch - y).min(src.height() as i64);
        if col_start >= col_end || row_start >= row_end {
            return;
        }

        for sy in row_start..row_end {
            let src_row = (sy * src.width() as i64) as usize;
            let dst_row = ((sy + y) * cw) as usize;
            for sx in col_start..col_end {
                let index = src.indices()[src_row + sx as usize];
                if index != TRANSPARENT_INDEX {
                    self.indices[dst_row + (sx + x) as usize] = index;
                }
            }
        }
    }

    fn into_bitmap(self) -> DecodedBitmap {
        DecodedBitmap::from_raw(self.width, self.height, self.indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::Filter;
    use crate::tokenizer::TokenDecoder;

    fn catalog_with(entries: Vec<(&str, SpriteDefinition)>) -> SpriteCatalog {
        let mut catalog = SpriteCatalog::new();
        for (name, definition) in entries {
            catalog.register(name, definition).unwrap();
        }
        catalog
    }

    fn resolve(catalog: &SpriteCatalog, name: &str) -> Result<DecodedBitmap, RenderError> {
        Resolver::new(catalog, &TokenDecoder::new()).resolve(name)
    }

    #[test]
    fn test_leaf_resolves_through_decoder() {
        let catalog = catalog_with(vec![("dot", SpriteDefinition::leaf("4,0|2,1", 3))]);
        let bitmap = resolve(&catalog, "dot").unwrap();
        assert_eq!(bitmap.indices(), &[0, 0, 0, 0, 1, 1]);
    }

    #[test]
    fn test_two_parts_side_by_side() {
        let catalog = catalog_with(vec![
            ("red", SpriteDefinition::leaf("1", 1)),
            ("blue", SpriteDefinition::leaf("2", 1)),
            (
                "pair",
                SpriteDefinition::composite(
                    2,
                    2,
                    vec![CompositePart::new("red", 0, 0), CompositePart::new("blue", 1, 0)],
                ),
            ),
        ]);
        let bitmap = resolve(&catalog, "pair").unwrap();
        assert_eq!(bitmap.indices(), &[1, 2, 0, 0]);
    }

    #[test]
    fn test_later_parts_paint_over_earlier() {
        let catalog = catalog_with(vec![
            ("red", SpriteDefinition::leaf("4,1", 2)),
            ("blue", SpriteDefinition::leaf("2", 1)),
            (
                "stack",
                SpriteDefinition::composite(
                    2,
                    2,
                    vec![CompositePart::new("red", 0, 0), CompositePart::new("blue", 1, 1)],
                ),
            ),
        ]);
        let bitmap = resolve(&catalog, "stack").unwrap();
        assert_eq!(bitmap.indices(), &[1, 1, 1, 2]);
    }

    #[test]
    fn test_transparent_pixels_do_not_overwrite() {
        let catalog = catalog_with(vec![
            ("solid", SpriteDefinition::leaf("4,3", 2)),
            ("hole", SpriteDefinition::leaf("0|5|0|0", 2)),
            (
                "mix",
                SpriteDefinition::composite(
                    2,
                    2,
                    vec![CompositePart::new("solid", 0, 0), CompositePart::new("hole", 0, 0)],
                ),
            ),
        ]);
        assert_eq!(resolve(&catalog, "mix").unwrap().indices(), &[3, 5, 3, 3]);
    }

    #[test]
    fn test_out_of_bounds_parts_are_clipped() {
        let catalog = catalog_with(vec![
            ("block", SpriteDefinition::leaf("1|2|3|4", 2)),
            (
                "clipped",
                SpriteDefinition::composite(
                    3,
                    3,
                    vec![CompositePart::new("block", -1, -1), CompositePart::new("block", 2, 2)],
                ),
            ),
            (
                "gone",
                SpriteDefinition::composite(2, 2, vec![CompositePart::new("block", 5, -7)]),
            ),
        ]);

        let bitmap = resolve(&catalog, "clipped").unwrap();
        assert_eq!(bitmap.indices(), &[4, 0, 0, 0, 0, 0, 0, 0, 1]);

        let bitmap = resolve(&catalog, "gone").unwrap();
        assert_eq!(bitmap.indices(), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_part_filters() {
        let catalog = catalog_with(vec![
            ("row", SpriteDefinition::leaf("1|2", 2)),
            (
                "flipped",
                SpriteDefinition::composite(
                    2,
                    1,
                    vec![CompositePart::new("row", 0, 0).with_filter(Filter::FlipHorizontal)],
                ),
            ),
        ]);
        assert_eq!(resolve(&catalog, "flipped").unwrap().indices(), &[2, 1]);
    }

    #[test]
    fn test_nested_composites() {
        let catalog = catalog_with(vec![
            ("dot", SpriteDefinition::leaf("7", 1)),
            ("inner", SpriteDefinition::composite(2, 1, vec![CompositePart::new("dot", 1, 0)])),
            ("outer", SpriteDefinition::composite(2, 2, vec![CompositePart::new("inner", 0, 1)])),
        ]);
        assert_eq!(resolve(&catalog, "outer").unwrap().indices(), &[0, 0, 0, 7]);
    }

    #[test]
    fn test_cycle_detected() {
        let catalog = catalog_with(vec![
            ("a", SpriteDefinition::composite(1, 1, vec![CompositePart::new("b", 0, 0)])),
            ("b", SpriteDefinition::composite(1, 1, vec![CompositePart::new("a", 0, 0)])),
        ]);
        assert_eq!(
            resolve(&catalog, "a"),
            Err(RenderError::CyclicReference {
                path: vec!["a".to_string(), "b".to_string(), "a".to_string()]
            })
        );
    }

    #[test]
    fn test_self_reference() {
        let catalog = catalog_with(vec![(
            "loop",
            SpriteDefinition::composite(1, 1, vec![CompositePart::new("loop", 0, 0)]),
        )]);
        assert!(matches!(resolve(&catalog, "loop"), Err(RenderError::CyclicReference { .. })));
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let catalog = catalog_with(vec![
            ("dot", SpriteDefinition::leaf("1", 1)),
            ("left", SpriteDefinition::composite(1, 1, vec![CompositePart::new("dot", 0, 0)])),
            ("right", SpriteDefinition::composite(1, 1, vec![CompositePart::new("dot", 0, 0)])),
            (
                "top",
                SpriteDefinition::composite(
                    2,
                    1,
                    vec![CompositePart::new("left", 0, 0), CompositePart::new("right", 1, 0)],
                ),
            ),
        ]);
        assert_eq!(resolve(&catalog, "top").unwrap().indices(), &[1, 1]);
        assert_eq!(check_references(&catalog, "top", DEFAULT_MAX_DEPTH), Ok(()));
    }

    #[test]
    fn test_unknown_names() {
        let catalog = catalog_with(vec![(
            "comp",
            SpriteDefinition::composite(1, 1, vec![CompositePart::new("ghost", 0, 0)]),
        )]);
        assert_eq!(resolve(&catalog, "nope"), Err(RenderError::UnknownSprite("nope".into())));
        assert_eq!(
            resolve(&catalog, "comp"),
            Err(RenderError::UnknownChild { parent: "comp".into(), child: "ghost".into() })
        );
    }

    #[test]
    fn test_depth_limit() {
        let mut entries = vec![("s0", SpriteDefinition::leaf("1", 1))];
        let names: Vec<String> = (1..=5).map(|i| format!("s{}", i)).collect();
        let children: Vec<String> = (0..5).map(|i| format!("s{}", i)).collect();
        for (name, child) in names.iter().zip(&children) {
            entries.push((
                name.as_str(),
                SpriteDefinition::composite(1, 1, vec![CompositePart::new(child.as_str(), 0, 0)]),
            ));
        }
        let catalog = catalog_with(entries);
        let decoder = TokenDecoder::new();

        assert!(Resolver::new(&catalog, &decoder).with_max_depth(6).resolve("s5").is_ok());
        assert_eq!(
            Resolver::new(&catalog, &decoder).with_max_depth(3).resolve("s5"),
            Err(RenderError::DepthExceeded { sprite: "s2".into(), limit: 3 })
        );
    }

    #[test]
    fn test_canvas_over_pixel_limit() {
        let catalog = catalog_with(vec![
            ("dot", SpriteDefinition::leaf("1", 1)),
            (
                "big",
                SpriteDefinition::composite(1000, 1000, vec![CompositePart::new("dot", 0, 0)]),
            ),
            ("outer", SpriteDefinition::composite(2, 2, vec![CompositePart::new("big", 0, 0)])),
        ]);
        let decoder = TokenDecoder::new();
        let resolver = Resolver::new(&catalog, &decoder).with_max_pixels(16);

        let too_large = Err(RenderError::Decode {
            sprite: "big".into(),
            source: DecodeError::TooLarge { pixels: 1_000_000, limit: 16 },
        });
        assert_eq!(resolver.resolve("big"), too_large);
        // A small parent does not hide an oversized child
        assert_eq!(resolver.resolve("outer"), too_large);
        assert_eq!(resolver.resolve("dot").unwrap().indices(), &[1]);
    }

    #[test]
    fn test_shared_subtree_rechecked_when_deeper() {
        let catalog = catalog_with(vec![
            ("dot", SpriteDefinition::leaf("1", 1)),
            ("mid", SpriteDefinition::composite(1, 1, vec![CompositePart::new("dot", 0, 0)])),
            ("deep", SpriteDefinition::composite(1, 1, vec![CompositePart::new("mid", 0, 0)])),
            (
                "top",
                SpriteDefinition::composite(
                    1,
                    1,
                    vec![CompositePart::new("mid", 0, 0), CompositePart::new("deep", 0, 0)],
                ),
            ),
        ]);
        let decoder = TokenDecoder::new();
        let expected = Err(RenderError::DepthExceeded { sprite: "dot".into(), limit: 3 });

        // "mid" passes at depth 1 but not under "deep" at depth 2
        assert_eq!(check_references(&catalog, "top", 3), expected);
        assert_eq!(Resolver::new(&catalog, &decoder).with_max_depth(3).resolve("top").map(|_| ()), expected);
        assert_eq!(check_references(&catalog, "top", 4), Ok(()));
    }

    #[test]
    fn test_cancelled_before_parts() {
        let catalog = catalog_with(vec![
            ("dot", SpriteDefinition::leaf("1", 1)),
            ("comp", SpriteDefinition::composite(1, 1, vec![CompositePart::new("dot", 0, 0)])),
        ]);
        let decoder = TokenDecoder::new();
        let token = CancelToken::new();
        token.cancel();

        let result = Resolver::new(&catalog, &decoder).with_cancel(&token).resolve("comp");
        assert_eq!(result, Err(RenderError::Cancelled("comp".into())));
    }

    #[test]
    fn test_decode_errors_name_the_leaf() {
        let catalog = catalog_with(vec![
            ("bad", SpriteDefinition::leaf("5,1", 2)),
            ("comp", SpriteDefinition::composite(1, 1, vec![CompositePart::new("bad", 0, 0)])),
        ]);
        match resolve(&catalog, "comp") {
            Err(RenderError::Decode { sprite, .. }) => assert_eq!(sprite, "bad"),
            other => panic!("expected decode error, got {:?}", other),
        }
    }

    #[test]
    fn test_check_references_finds_cycle_without_decoding() {
        let catalog = catalog_with(vec![
            ("bad", SpriteDefinition::leaf("not runs", 1)),
            (
                "a",
                SpriteDefinition::composite(
                    1,
                    1,
                    vec![CompositePart::new("bad", 0, 0), CompositePart::new("b", 0, 0)],
                ),
            ),
            ("b", SpriteDefinition::composite(1, 1, vec![CompositePart::new("a", 0, 0)])),
        ]);
        assert!(matches!(
            check_references(&catalog, "a", DEFAULT_MAX_DEPTH),
            Err(RenderError::CyclicReference { .. })
        ));
        assert_eq!(check_references(&catalog, "bad", DEFAULT_MAX_DEPTH), Ok(()));
    }
}
