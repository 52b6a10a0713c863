//! Browsable catalog of a device's local music, grouped by album, artist and
//! playlist.
//!
//! Core modules:
//! - [`repository`] - Resolves browse requests, refreshes and playlist edits
//! - [`cache`] - Immutable catalog snapshots and their atomic publication
//! - [`browse_id`] - Encoding and decoding of browse identifiers
//! - [`source`] - Media index adapters
//! - [`store`] - Playlist persistence
//!
//! ### Supporting Modules
//!
//! - [`track`], [`playlist`] - Data model
//! - [`browse`] - Browse items and protocol responses
//! - [`session`] - Line-oriented browse sessions and connection events
//! - [`worker`] - Background refresh thread
//! - [`error`] - Error taxonomy
//! - [`config`] - Configuration and data directory management
//! - [`cli`] - Command-line interface definitions with clap integration
//! - [`completion`] - Shell completion generation
//!
//! ## Quick Start Example
//!
//! ```no_run
//! use muse_catalog::repository::{CatalogRepository, StalePolicy};
//! use muse_catalog::source::open_index;
//! use muse_catalog::store::SqlitePlaylistStore;
//! use muse_catalog::track::TrackId;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let source = open_index(Path::new("media.db"));
//! let store = Arc::new(SqlitePlaylistStore::open(Path::new("playlists.db"))?);
//! let catalog = CatalogRepository::new(source, store, StalePolicy::ServeStale)?;
//!
//! for album in catalog.get_children("ALBUMS")? {
//!     println!("{} - {}", album.id, album.title);
//! }
//!
//! let road_trip = catalog.create_playlist("Road Trip", &[TrackId(1), TrackId(2)])?;
//! let tracks = catalog.get_children(&format!("PLAYLISTS/{road_trip}"))?;
//! assert_eq!(tracks.len(), 2);
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Consistency
//!
//! Readers always see one complete snapshot. A refresh builds a new snapshot
//! off to the side on the refresh worker and swaps it in; readers holding the
//! old one keep it until they drop it. Concurrent refresh requests share a
//! single load. Playlist edits are written to the store and then published
//! before the edit returns.

pub mod browse;
pub mod browse_id;
pub mod cache;
pub mod cli;
pub mod completion;
pub mod config;
pub mod error;
pub mod playlist;
pub mod repository;
pub mod session;
pub mod source;
pub mod store;
pub mod track;
pub mod worker;

pub use error::{CatalogError, Result};
