//! Criterion benchmarks for pxrender critical paths
//!
//! Benchmarks the core performance-critical operations:
//! - Tokenizer: run-length decoding
//! - Parser: JSONL definition parsing
//! - Composite: multi-part sprite assembly
//! - Engine: cache hit path versus full render

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pxrender::catalog::SpriteCatalog;
use pxrender::composite::Resolver;
use pxrender::engine::EngineBuilder;
use pxrender::filters::{colorize, Filter};
use pxrender::models::{CompositePart, SpriteDefinition};
use pxrender::palette::Palette;
use pxrender::parser::parse_stream;
use pxrender::tokenizer::{decode, TokenDecoder};
use std::io::Cursor;

// =============================================================================
// Test Data Generators
// =============================================================================

/// Encoded square sprite cycling through 16 indices in runs of 3
fn make_encoded(size: u32) -> String {
    let pixels = size * size;
    let mut runs = Vec::new();
    let mut remaining = pixels;
    let mut index = 0u8;
    while remaining > 0 {
        let count = remaining.min(3);
        runs.push(format!("{},{}", count, index % 16));
        remaining -= count;
        index = index.wrapping_add(1);
    }
    runs.join("|")
}

fn make_palette() -> Palette {
    let colors: Vec<String> = (0..16).map(|i| format!("#{:02X}{:02X}{:02X}", i * 16, i * 8, 255 - i * 16)).collect();
    Palette::parse(&colors).unwrap()
}

fn make_jsonl(sprite_count: usize, size: u32) -> String {
    let mut lines = vec![r##"{"type": "palette", "colors": ["transparent", "#FF0000"]}"##.to_string()];
    for i in 0..sprite_count {
        lines.push(format!(
            r#"{{"type": "sprite", "name": "s{}", "width": {}, "data": "{}"}}"#,
            i,
            size,
            make_encoded(size)
        ));
    }
    lines.join("\n")
}

/// A grid-of-tiles composite: `tiles` x `tiles` copies of a 16x16 leaf
fn make_tiled_catalog(tiles: i32) -> SpriteCatalog {
    let mut catalog = SpriteCatalog::new();
    catalog.register("tile", SpriteDefinition::leaf(make_encoded(16), 16)).unwrap();
    let parts = (0..tiles * tiles)
        .map(|i| {
            let part = CompositePart::new("tile", (i % tiles) * 16, (i / tiles) * 16);
            if i % 2 == 0 {
                part.with_filter(Filter::FlipHorizontal)
            } else {
                part
            }
        })
        .collect();
    let side = (tiles * 16) as u32;
    catalog.register("map", SpriteDefinition::composite(side, side, parts)).unwrap();
    catalog
}

// =============================================================================
// Tokenizer Benchmarks
// =============================================================================

fn bench_tokenizer(c: &mut Criterion) {
    let mut group = c.benchmark_group("tokenizer");

    for size in [8u32, 32, 128].iter() {
        let encoded = make_encoded(*size);
        group.throughput(Throughput::Elements((*size * *size) as u64));
        group.bench_with_input(BenchmarkId::new("decode", size), &encoded, |b, encoded| {
            b.iter(|| decode(black_box(encoded), *size))
        });
    }

    let bitmap = decode(&make_encoded(64), 64).unwrap();
    let palette = make_palette();
    group.bench_function("colorize_64x64", |b| b.iter(|| colorize(black_box(&bitmap), &palette)));

    group.finish();
}

// =============================================================================
// Parser Benchmarks
// =============================================================================

fn bench_parser(c: &mut Criterion) {
    let mut group = c.benchmark_group("parser");

    for count in [10, 100].iter() {
        let content = make_jsonl(*count, 16);
        group.throughput(Throughput::Bytes(content.len() as u64));
        group.bench_with_input(BenchmarkId::new("parse_stream", count), &content, |b, content| {
            b.iter(|| parse_stream(Cursor::new(black_box(content.as_bytes()))))
        });
    }

    group.finish();
}

// =============================================================================
// Composite Benchmarks
// =============================================================================

fn bench_composite(c: &mut Criterion) {
    let mut group = c.benchmark_group("composite");
    let decoder = TokenDecoder::new();

    for tiles in [2, 8].iter() {
        let catalog = make_tiled_catalog(*tiles);
        group.bench_with_input(BenchmarkId::new("resolve_map", tiles), &catalog, |b, catalog| {
            b.iter(|| Resolver::new(catalog, &decoder).resolve(black_box("map")))
        });
    }

    group.finish();
}

// =============================================================================
// Engine Benchmarks
// =============================================================================

fn bench_engine(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine");
    let engine = EngineBuilder::new().with_catalog(make_tiled_catalog(4)).palette(make_palette()).build();

    engine.get("map", &[], None).unwrap();
    group.bench_function("cache_hit", |b| b.iter(|| engine.get(black_box("map"), &[], None)));

    group.bench_function("render_after_purge", |b| {
        b.iter(|| {
            engine.cache().clear();
            engine.get(black_box("map"), &[], None)
        })
    });

    group.finish();
}

// =============================================================================
// Criterion Configuration
// =============================================================================

criterion_group!(benches, bench_tokenizer, bench_parser, bench_composite, bench_engine);

criterion_main!(benches);
