//! # Muse Catalog
//!
//! Command-line front end of the catalog: browse a local media index by
//! album, artist and playlist, edit playlists, or serve browse requests over
//! stdin/stdout.
//!
//! ## Usage
//!
//! ```bash
//! # Top-level nodes
//! muse-catalog --index ~/media.db roots
//!
//! # Albums, then the tracks of one album
//! muse-catalog browse ALBUMS
//! muse-catalog browse ALBUMS/2
//!
//! # Playlists
//! muse-catalog playlist create "Road Trip" 1 2 3
//! muse-catalog playlist add 1 42
//!
//! # Line-oriented browse server
//! echo 'ALBUMS' | muse-catalog serve
//! ```

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use log::{debug, info};
use muse_catalog::browse::BrowseItem;
use muse_catalog::cli::{self, Command, PlaylistAction};
use muse_catalog::completion;
use muse_catalog::config::CatalogConfig;
use muse_catalog::playlist::PlaylistId;
use muse_catalog::repository::CatalogRepository;
use muse_catalog::session::BrowseSession;
use muse_catalog::source::open_index;
use muse_catalog::store::SqlitePlaylistStore;
use muse_catalog::track::TrackId;
use std::io;
use std::sync::Arc;

/// Main entry point.
///
/// Logging is controlled via `RUST_LOG`:
/// - `RUST_LOG=debug muse-catalog browse ALBUMS` - Enable debug logging
/// - `RUST_LOG=muse_catalog::repository=trace muse-catalog serve` - Module-specific logging
fn main() -> Result<()> {
    env_logger::init();

    let cli::Args {
        index,
        store,
        stale_policy,
        json,
        command,
    } = cli::Args::parse();
    let config = || -> Result<CatalogConfig> {
        CatalogConfig::load()?.with_overrides(index.clone(), store.clone(), stale_policy)
    };

    match command {
        Command::Completion { shell } => {
            let mut cmd = cli::Args::command();
            completion::generate_completions(
                completion::shell_to_completion_shell(shell),
                &mut cmd,
                &mut io::stdout(),
            );
        }
        Command::Roots => print_items(&open_repository(&config()?)?.roots(), json)?,
        Command::Browse { id } => {
            print_items(&open_repository(&config()?)?.get_children(&id)?, json)?
        }
        Command::Item { id } => print_items(&[open_repository(&config()?)?.get_item(&id)?], json)?,
        Command::Refresh => {
            let repository = open_repository(&config()?)?;
            repository.refresh()?;
            let snapshot = repository.snapshot()?;
            println!(
                "{} tracks, {} albums, {} artists, {} playlists",
                snapshot.library().len(),
                snapshot.albums().len(),
                snapshot.artists().len(),
                snapshot.playlists().len()
            );
        }
        Command::Playlist { action } => run_playlist(&open_repository(&config()?)?, action, json)?,
        Command::Serve => {
            let session = BrowseSession::new(Arc::new(open_repository(&config()?)?));
            let served = session.run(io::stdin().lock(), io::stdout().lock())?;
            info!("Browse session ended after {served} requests");
        }
    }

    Ok(())
}

fn open_repository(config: &CatalogConfig) -> Result<CatalogRepository> {
    debug!("Running with {config:?}");
    let source = open_index(&config.index_path);
    let store = SqlitePlaylistStore::open(&config.store_path)?;
    CatalogRepository::new(source, Arc::new(store), config.stale_policy)
}

fn run_playlist(repository: &CatalogRepository, action: PlaylistAction, json: bool) -> Result<()> {
    let tracks = |ids: Vec<i64>| ids.into_iter().map(TrackId).collect::<Vec<_>>();

    match action {
        PlaylistAction::List => print_items(&repository.list_playlists()?, json)?,
        PlaylistAction::Create { name, tracks: ids } => {
            let id = repository.create_playlist(&name, &tracks(ids))?;
            println!("Created playlist {id}");
        }
        PlaylistAction::Delete { id } => {
            repository.delete_playlist(PlaylistId(id))?;
            println!("Deleted playlist {id}");
        }
        PlaylistAction::Add { id, tracks: ids } => {
            repository.add_tracks(PlaylistId(id), &tracks(ids))?;
        }
        PlaylistAction::Remove { id, tracks: ids } => {
            let removed = repository.remove_tracks(PlaylistId(id), &tracks(ids))?;
            println!("Removed {removed} entries");
        }
        PlaylistAction::Played { id } => repository.mark_playlist_played(PlaylistId(id))?,
    }
    Ok(())
}

fn print_items(items: &[BrowseItem], json: bool) -> Result<()> {
    if json {
        let text = serde_json::to_string_pretty(items).context("Failed to encode items")?;
        println!("{text}");
        return Ok(());
    }

    for item in items {
        let marker = if item.browsable { "+" } else { " " };
        match &item.subtitle {
            Some(subtitle) => println!("{marker} {:<24} {}  ({subtitle})", item.id, item.title),
            None => println!("{marker} {:<24} {}", item.id, item.title),
        }
    }
    Ok(())
}
