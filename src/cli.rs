//! # Command-Line Interface Module
//!
//! Clap derive definitions for the `muse-catalog` binary.
//!
//! ## Commands
//!
//! - `roots`: List the four top-level nodes
//! - `browse`: List the children of a browse identifier
//! - `item`: Show a single node
//! - `refresh`: Rebuild the catalog from the media index
//! - `playlist`: Create, edit and delete playlists
//! - `serve`: Answer browse requests line by line on stdin/stdout
//!
//! ## Examples
//!
//! ```bash
//! muse-catalog --index ~/media.db browse ALBUMS
//! muse-catalog item 'MUSIC|1'
//! muse-catalog playlist create "Road Trip" 1 2 3
//! ```

use crate::repository::StalePolicy;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shell types supported for completion generation
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

/// Main application arguments structure.
///
/// Catalog locations may come from flags, the environment or `config.json`;
/// flags win.
#[derive(Parser, Debug)]
#[command(name = "muse-catalog")]
#[command(about = "Muse catalog: browse albums, artists & playlists of a local media index")]
#[command(version)]
pub struct Args {
    /// Media index to read tracks from (SQLite, or JSON with a .json extension)
    #[arg(long, global = true, env = "MUSE_CATALOG_INDEX")]
    pub index: Option<PathBuf>,

    /// Playlist database
    #[arg(long, global = true, env = "MUSE_CATALOG_STORE")]
    pub store: Option<PathBuf>,

    /// What reads do after the catalog was invalidated: serve-stale or block
    #[arg(long, global = true)]
    pub stale_policy: Option<StalePolicy>,

    /// Print JSON instead of human-readable lines
    #[arg(long, global = true)]
    pub json: bool,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the top-level nodes
    Roots,

    /// List the children of a node
    ///
    /// Identifiers look like `ALBUMS`, `ALBUMS/2` or `PLAYLISTS/7`.
    Browse {
        /// Browse identifier
        id: String,
    },

    /// Show a single node
    ///
    /// Leaf identifiers such as `MUSIC|1` or `ALBUMS/2|1` resolve to a track.
    Item {
        /// Browse identifier
        id: String,
    },

    /// Rebuild the catalog from the media index and report its size
    Refresh,

    /// Manage playlists
    Playlist {
        #[command(subcommand)]
        action: PlaylistAction,
    },

    /// Serve browse requests on stdin, one JSON response per line on stdout
    ///
    /// Each input line is a browse identifier, or `item <id>`.
    Serve,

    /// Generate shell completions
    ///
    /// Usage: muse-catalog completion bash > ~/.local/share/bash-completion/completions/muse-catalog
    Completion {
        /// Shell to generate completions for
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum PlaylistAction {
    /// List playlists
    List,

    /// Create a playlist from track ids, in the given order
    Create {
        name: String,
        #[arg(required = true)]
        tracks: Vec<i64>,
    },

    /// Delete a playlist and all of its entries
    Delete { id: i64 },

    /// Append tracks to a playlist
    Add {
        id: i64,
        #[arg(required = true)]
        tracks: Vec<i64>,
    },

    /// Remove every occurrence of the given tracks from a playlist
    Remove {
        id: i64,
        #[arg(required = true)]
        tracks: Vec<i64>,
    },

    /// Record that a playlist was just played
    Played { id: i64 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::try_parse_from([
            "muse-catalog",
            "browse",
            "ALBUMS",
            "--json",
            "--stale-policy",
            "block",
        ])
        .unwrap();
        assert!(args.json);
        assert_eq!(args.stale_policy, Some(StalePolicy::Block));
        assert!(matches!(args.command, Command::Browse { id } if id == "ALBUMS"));
    }

    #[test]
    fn test_playlist_create_needs_tracks() {
        assert!(Args::try_parse_from(["muse-catalog", "playlist", "create", "Road Trip"]).is_err());
        let args =
            Args::try_parse_from(["muse-catalog", "playlist", "create", "Road Trip", "1", "2"])
                .unwrap();
        assert!(matches!(
            args.command,
            Command::Playlist { action: PlaylistAction::Create { tracks, .. } } if tracks == vec![1, 2]
        ));
    }
}
