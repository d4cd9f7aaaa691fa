//! Configuration loading and discovery for `pxr.toml`
//!
//! Provides functions to find, load, and override configuration.

use super::schema::PxrConfig;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the configuration file searched for.
pub const CONFIG_FILE: &str = "pxr.toml";

/// Configuration loading error
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// File I/O error
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error
    #[error("Failed to parse pxr.toml: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error
    #[error("Config validation failed:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    Validation(Vec<String>),
}

/// CLI arguments that can override config values
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    /// Override the LRU byte cap (switches the policy to lru)
    pub max_bytes: Option<usize>,
    /// Override the decode pixel limit
    pub max_pixels: Option<u64>,
    /// Override the composite depth limit
    pub max_depth: Option<usize>,
}

/// Find pxr.toml by walking up from the current working directory.
pub fn find_config() -> Option<PathBuf> {
    env::current_dir().ok().and_then(find_config_from)
}

/// Find pxr.toml by walking up from a specific directory.
pub fn find_config_from(start: PathBuf) -> Option<PathBuf> {
    let mut current = start;

    loop {
        let config_path = current.join(CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Load configuration from a pxr.toml file.
///
/// If a path is provided, loads from that file. Otherwise, uses `find_config()`
/// to locate the config file. If no config file is found, returns the default
/// configuration.
///
/// # Example
/// ```ignore
/// let config = load_config(None)?;
/// let config = load_config(Some(Path::new("game/pxr.toml")))?;
/// ```
pub fn load_config(path: Option<&Path>) -> Result<PxrConfig, ConfigError> {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => find_config(),
    };

    match config_path {
        Some(p) => load_config_file(&p),
        None => Ok(PxrConfig::default()),
    }
}

/// Load configuration from a specific file path.
fn load_config_file(path: &Path) -> Result<PxrConfig, ConfigError> {
    let contents = fs::read_to_string(path)?;
    let config: PxrConfig = toml::from_str(&contents)?;

    let errors = config.validate();
    if !errors.is_empty() {
        return Err(ConfigError::Validation(errors.into_iter().map(|e| e.to_string()).collect()));
    }

    tracing::debug!(path = %path.display(), "loaded config");
    Ok(config)
}

/// Merge CLI overrides into a configuration.
///
/// CLI arguments take precedence over config file values.
pub fn merge_cli_overrides(config: &mut PxrConfig, overrides: &CliOverrides) {
    if let Some(max_bytes) = overrides.max_bytes {
        config.cache.policy = super::PolicyKind::Lru;
        config.cache.max_bytes = Some(max_bytes);
    }

    if let Some(max_pixels) = overrides.max_pixels {
        config.decode.max_pixels = max_pixels;
    }

    if let Some(max_depth) = overrides.max_depth {
        config.decode.max_depth = max_depth;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::EvictionPolicy;
    use serial_test::serial;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_config(dir: &Path, contents: &str) -> PathBuf {
        let path = dir.join(CONFIG_FILE);
        File::create(&path)
            .expect("should create config file")
            .write_all(contents.as_bytes())
            .expect("should write config content");
        path
    }

    #[test]
    fn test_find_config_in_current_dir() {
        let temp = TempDir::new().expect("should create temp dir");
        let config_path = write_config(temp.path(), "");

        let found = find_config_from(temp.path().to_path_buf());
        assert_eq!(found, Some(config_path));
    }

    #[test]
    fn test_find_config_in_parent_dir() {
        let temp = TempDir::new().expect("should create temp dir");
        let config_path = write_config(temp.path(), "");

        let subdir = temp.path().join("assets").join("sprites");
        fs::create_dir_all(&subdir).expect("should create subdirectories");

        assert_eq!(find_config_from(subdir), Some(config_path));
    }

    #[test]
    fn test_load_config_from_file() {
        let temp = TempDir::new().expect("should create temp dir");
        let path = write_config(
            temp.path(),
            "[cache]\npolicy = \"lru\"\nmax_bytes = 2048\n\n[decode]\nmax_depth = 8\n",
        );

        let config = load_config(Some(&path)).expect("should load config");
        assert_eq!(config.eviction_policy(), EvictionPolicy::Lru { max_bytes: 2048 });
        assert_eq!(config.decode.max_depth, 8);
    }

    #[test]
    fn test_load_config_validation_error() {
        let temp = TempDir::new().expect("should create temp dir");
        let path = write_config(temp.path(), "[cache]\npolicy = \"ttl\"\n");

        match load_config(Some(&path)) {
            Err(ConfigError::Validation(errors)) => {
                assert_eq!(errors.len(), 1);
                assert!(errors[0].contains("cache.ttl_secs"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_load_config_parse_error() {
        let temp = TempDir::new().expect("should create temp dir");
        let path = write_config(temp.path(), "[cache\n");
        assert!(matches!(load_config(Some(&path)), Err(ConfigError::Parse(_))));
    }

    #[test]
    #[serial]
    fn test_load_config_discovers_from_cwd() {
        let temp = TempDir::new().expect("should create temp dir");
        write_config(temp.path(), "[palette]\nhistory = 3\n");
        let original = env::current_dir().expect("should read cwd");

        env::set_current_dir(temp.path()).expect("should enter temp dir");
        let config = load_config(None);
        env::set_current_dir(original).expect("should restore cwd");

        assert_eq!(config.expect("should load config").palette.history, 3);
    }

    #[test]
    fn test_merge_cli_overrides() {
        let mut config = PxrConfig::default();
        let overrides =
            CliOverrides { max_bytes: Some(512), max_depth: Some(4), ..Default::default() };
        merge_cli_overrides(&mut config, &overrides);

        assert_eq!(config.eviction_policy(), EvictionPolicy::Lru { max_bytes: 512 });
        assert_eq!(config.decode.max_depth, 4);
        assert_eq!(config.decode.max_pixels, crate::tokenizer::DEFAULT_MAX_PIXELS);
    }
}
