//! Sprite definitions and the objects of a definitions file

use serde::{Deserialize, Serialize};

use crate::filters::Filter;

/// A raw sprite definition as held by the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpriteDefinition {
    /// Run-length encoded pixels; height comes from the decoded pixel count.
    Leaf { encoded: String, width: u32 },
    /// Other sprites positioned on a canvas of `size` = `[width, height]`.
    Composite { size: [u32; 2], parts: Vec<CompositePart> },
}

impl SpriteDefinition {
    pub fn leaf(encoded: impl Into<String>, width: u32) -> Self {
        SpriteDefinition::Leaf { encoded: encoded.into(), width }
    }

    pub fn composite(width: u32, height: u32, parts: Vec<CompositePart>) -> Self {
        SpriteDefinition::Composite { size: [width, height], parts }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, SpriteDefinition::Composite { .. })
    }

    /// Names this definition references directly (empty for leaves).
    pub fn children(&self) -> impl Iterator<Item = &str> {
        let parts: &[CompositePart] = match self {
            SpriteDefinition::Leaf { .. } => &[],
            SpriteDefinition::Composite { parts, .. } => parts,
        };
        parts.iter().map(|p| p.sprite.as_str())
    }
}

/// One placed child of a composite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositePart {
    /// Name of the child sprite
    pub sprite: String,
    /// Top-left position on the canvas; may be negative
    #[serde(default)]
    pub offset: [i32; 2],
    /// Filters applied to the child before it is placed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<Filter>,
}

impl CompositePart {
    pub fn new(sprite: impl Into<String>, x: i32, y: i32) -> Self {
        Self { sprite: sprite.into(), offset: [x, y], filters: Vec::new() }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }
}

/// A top-level object in a definitions file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DefinitionObject {
    /// The base palette, as color strings in index order
    Palette { colors: Vec<String> },
    /// A leaf sprite
    Sprite { name: String, width: u32, data: String },
    /// A composite sprite
    Composite { name: String, size: [u32; 2], parts: Vec<CompositePart> },
    /// A per-sprite palette override
    Override { sprite: String, colors: Vec<String> },
}

/// A non-fatal problem found while reading definitions.
#[derive(Debug, Clone, PartialEq)]
pub struct Warning {
    pub message: String,
    pub line: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_children() {
        let leaf = SpriteDefinition::leaf("1", 1);
        assert_eq!(leaf.children().count(), 0);

        let comp = SpriteDefinition::composite(
            4,
            4,
            vec![CompositePart::new("a", 0, 0), CompositePart::new("b", 2, 2)],
        );
        assert!(comp.is_composite());
        assert_eq!(comp.children().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_part_defaults() {
        let part: CompositePart = serde_json::from_str(r#"{"sprite": "dot"}"#).unwrap();
        assert_eq!(part, CompositePart::new("dot", 0, 0));

        let part: CompositePart =
            serde_json::from_str(r#"{"sprite": "dot", "offset": [-1, 2], "filters": ["flip-v"]}"#)
                .unwrap();
        assert_eq!(part, CompositePart::new("dot", -1, 2).with_filter(Filter::FlipVertical));
    }

    #[test]
    fn test_object_tags() {
        let obj: DefinitionObject =
            serde_json::from_str(r#"{"type": "sprite", "name": "dot", "width": 3, "data": "4,0|2,1"}"#)
                .unwrap();
        assert_eq!(
            obj,
            DefinitionObject::Sprite { name: "dot".into(), width: 3, data: "4,0|2,1".into() }
        );
    }
}
