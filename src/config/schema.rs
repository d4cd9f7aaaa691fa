//! Configuration schema types for `pxr.toml`
//!
//! Defines the structure and validation rules for engine configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::cache::EvictionPolicy;
use crate::composite::DEFAULT_MAX_DEPTH;
use crate::palette::DEFAULT_HISTORY;
use crate::tokenizer::DEFAULT_MAX_PIXELS;

/// Which eviction policy the render cache uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    /// Never evict
    #[default]
    Unbounded,
    /// Least recently used, bounded by `max_bytes`
    Lru,
    /// Time to live, bounded by `ttl_secs`
    Ttl,
}

/// Render cache settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub policy: PolicyKind,
    /// Byte cap for the `lru` policy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_bytes: Option<usize>,
    /// Entry lifetime for the `ttl` policy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,
    /// Keep decoded index bitmaps so palette swaps skip the decode pass
    #[serde(default)]
    pub retain_decoded: bool,
}

/// Decoder and resolver limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodeConfig {
    /// Maximum pixels a single leaf may decode to
    #[serde(default = "default_max_pixels")]
    pub max_pixels: u64,
    /// Maximum composite nesting depth
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self { max_pixels: default_max_pixels(), max_depth: default_max_depth() }
    }
}

fn default_max_pixels() -> u64 {
    DEFAULT_MAX_PIXELS
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

/// Palette registry settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaletteConfig {
    /// Superseded palette generations kept for explicit-generation renders
    #[serde(default = "default_history")]
    pub history: usize,
}

impl Default for PaletteConfig {
    fn default() -> Self {
        Self { history: default_history() }
    }
}

fn default_history() -> usize {
    DEFAULT_HISTORY
}

/// Root configuration (`pxr.toml`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PxrConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub decode: DecodeConfig,
    #[serde(default)]
    pub palette: PaletteConfig,
}

/// A validation error in the configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationError {
    /// Path to the invalid field (e.g., "cache.max_bytes")
    pub field: String,
    /// Error message
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pxr.toml: '{}' {}", self.field, self.message)
    }
}

impl PxrConfig {
    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();
        let mut error = |field: &str, message: &str| {
            errors.push(ConfigValidationError {
                field: field.to_string(),
                message: message.to_string(),
            })
        };

        match self.cache.policy {
            PolicyKind::Lru if !matches!(self.cache.max_bytes, Some(n) if n > 0) => {
                error("cache.max_bytes", "must be a positive integer for the lru policy")
            }
            PolicyKind::Ttl if !matches!(self.cache.ttl_secs, Some(n) if n > 0) => {
                error("cache.ttl_secs", "must be a positive integer for the ttl policy")
            }
            _ => {}
        }

        if self.decode.max_pixels == 0 {
            error("decode.max_pixels", "must be a positive integer");
        }
        if self.decode.max_depth == 0 {
            error("decode.max_depth", "must be a positive integer");
        }

        errors
    }

    /// The cache eviction policy described by the `[cache]` section.
    ///
    /// Assumes a validated config; missing bounds fall back to unbounded.
    pub fn eviction_policy(&self) -> EvictionPolicy {
        match (self.cache.policy, self.cache.max_bytes, self.cache.ttl_secs) {
            (PolicyKind::Lru, Some(max_bytes), _) => EvictionPolicy::Lru { max_bytes },
            (PolicyKind::Ttl, _, Some(secs)) => EvictionPolicy::Ttl { ttl: Duration::from_secs(secs) },
            _ => EvictionPolicy::Unbounded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: PxrConfig = toml::from_str("").unwrap();
        assert_eq!(config, PxrConfig::default());
        assert_eq!(config.decode.max_depth, DEFAULT_MAX_DEPTH);
        assert_eq!(config.palette.history, DEFAULT_HISTORY);
        assert!(config.validate().is_empty());
        assert_eq!(config.eviction_policy(), EvictionPolicy::Unbounded);
    }

    #[test]
    fn test_lru_section() {
        let config: PxrConfig = toml::from_str(
            r#"
[cache]
policy = "lru"
max_bytes = 4096
retain_decoded = true
"#,
        )
        .unwrap();
        assert!(config.validate().is_empty());
        assert!(config.cache.retain_decoded);
        assert_eq!(config.eviction_policy(), EvictionPolicy::Lru { max_bytes: 4096 });
    }

    #[test]
    fn test_ttl_section() {
        let config: PxrConfig = toml::from_str("[cache]\npolicy = \"ttl\"\nttl_secs = 30").unwrap();
        assert_eq!(config.eviction_policy(), EvictionPolicy::Ttl { ttl: Duration::from_secs(30) });
    }

    #[test]
    fn test_validation_errors() {
        let config: PxrConfig = toml::from_str(
            r#"
[cache]
policy = "lru"

[decode]
max_pixels = 0
max_depth = 0
"#,
        )
        .unwrap();
        let fields: Vec<String> = config.validate().into_iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["cache.max_bytes", "decode.max_pixels", "decode.max_depth"]);
    }

    #[test]
    fn test_unknown_policy_rejected() {
        assert!(toml::from_str::<PxrConfig>("[cache]\npolicy = \"fifo\"").is_err());
    }
}
