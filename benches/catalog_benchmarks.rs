//! # Muse Catalog Performance Benchmarks
//!
//! ## Benchmark Categories
//!
//! - **Identifiers**: decoding and encoding browse identifiers
//! - **Snapshot Build**: grouping a shuffled library into albums and artists
//! - **Cached Reads**: browsing a loaded catalog
//!
//! ## Running Benchmarks
//!
//! ```bash
//! # Run all benchmarks
//! cargo bench
//!
//! # Run specific benchmark group
//! cargo bench browse_id
//! cargo bench snapshot_build
//! ```

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use muse_catalog::browse_id::{decode, encode, Root};
use muse_catalog::cache::build;
use muse_catalog::repository::{CatalogRepository, StalePolicy};
use muse_catalog::source::MetadataSource;
use muse_catalog::store::SqlitePlaylistStore;
use muse_catalog::track::{Track, TrackRecord};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::hint::black_box;
use std::sync::Arc;

/// Library of `count` tracks, 12 per album, 4 albums per artist, shuffled.
fn create_library(count: i64) -> Vec<Track> {
    let mut tracks: Vec<Track> = (0..count)
        .map(|id| {
            let album_id = id / 12;
            let artist_id = album_id / 4;
            Track::from(TrackRecord {
                id,
                title: format!("Track {id:05}"),
                album: format!("Album {album_id}"),
                artist: format!("Artist {artist_id}"),
                duration: 180_000,
                track: 100 + (id % 12) as u32 + 1,
                album_id,
                artist_id,
            })
        })
        .collect();
    tracks.shuffle(&mut StdRng::seed_from_u64(7));
    tracks
}

struct InMemorySource(Vec<Track>);

impl MetadataSource for InMemorySource {
    fn load_all_tracks(&self) -> anyhow::Result<Vec<Track>> {
        Ok(self.0.clone())
    }
}

fn benchmark_browse_id(c: &mut Criterion) {
    let mut group = c.benchmark_group("browse_id");

    for id in ["MUSIC", "ALBUMS/1234", "PLAYLISTS/17|987654"] {
        group.bench_with_input(BenchmarkId::new("decode", id), id, |b, id| {
            b.iter(|| decode(black_box(id)))
        });
    }

    group.bench_function("encode_leaf", |b| {
        b.iter(|| encode(black_box(Root::Albums), black_box(Some(1234)), black_box(Some(987654))))
    });

    group.finish();
}

fn benchmark_snapshot_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot_build");
    group.sample_size(20);

    for size in [1_000, 10_000] {
        let tracks = create_library(size);
        group.bench_with_input(BenchmarkId::new("build", size), &tracks, |b, tracks| {
            b.iter_batched(
                || tracks.clone(),
                |tracks| build(black_box(tracks), Vec::new()),
                BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

fn benchmark_cached_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("cached_reads");

    let source = Arc::new(InMemorySource(create_library(10_000)));
    let store = Arc::new(SqlitePlaylistStore::open_in_memory().expect("Failed to open store"));
    let repository = CatalogRepository::new(source, store, StalePolicy::ServeStale)
        .expect("Failed to create repository");
    repository.refresh().expect("Failed to load catalog");

    group.bench_function("albums", |b| {
        b.iter(|| repository.get_children(black_box("ALBUMS")))
    });
    group.bench_function("album_tracks", |b| {
        b.iter(|| repository.get_children(black_box("ALBUMS/400")))
    });
    group.bench_function("item", |b| {
        b.iter(|| repository.get_item(black_box("ARTISTS/100|4812")))
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_browse_id,
    benchmark_snapshot_build,
    benchmark_cached_reads
);
criterion_main!(benches);
