//! pxrender - run-length sprite decoding, compositing and render caching
//!
//! This library provides functionality to:
//! - Decode compact run-length pixel strings into palette-index bitmaps
//! - Assemble composite sprites from other sprites, with per-part filters
//! - Colorize bitmaps through swappable palettes
//! - Memoize renders so each (sprite, palette generation, filter chain) is
//!   computed at most once, even under concurrent requests
//!
//! The entry point is [`engine::EngineBuilder`], usually fed by
//! [`loader::load_file`].

pub mod bitmap;
pub mod cache;
pub mod catalog;
pub mod cli;
pub mod color;
pub mod composite;
pub mod config;
pub mod engine;
pub mod error;
pub mod filters;
pub mod loader;
pub mod models;
pub mod output;
pub mod palette;
pub mod parser;
pub mod tokenizer;
