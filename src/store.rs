//! # Playlist Store
//!
//! Durable storage for user playlists and their ordered entries.
//!
//! The catalog only talks to storage through [`PlaylistStore`], so tests can
//! swap in doubles. [`SqlitePlaylistStore`] is the shipped implementation:
//! one `SQLite` file with two tables, foreign keys enabled so that deleting
//! a playlist cascades to its entries.

use crate::playlist::{Playlist, PlaylistEntry, PlaylistId, PlaylistWithEntries};
use anyhow::Context;
use chrono::{DateTime, Utc};
use log::{debug, trace};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Failures reported by a [`PlaylistStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("a playlist named `{0}` already exists")]
    DuplicateName(String),
    #[error("no playlist with id {0}")]
    UnknownPlaylist(PlaylistId),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Query/mutate interface over stored playlists.
///
/// Implementations serialize their own writes.
pub trait PlaylistStore: Send + Sync {
    fn list_playlists(&self) -> Result<Vec<Playlist>, StoreError>;

    /// Entries of one playlist, ordered by position.
    fn list_entries(&self, playlist_id: PlaylistId) -> Result<Vec<PlaylistEntry>, StoreError>;

    /// Saves a new playlist and returns its assigned id.
    ///
    /// Fails with [`StoreError::DuplicateName`] when the name is taken.
    fn insert_playlist(&self, playlist: &Playlist) -> Result<PlaylistId, StoreError>;

    fn insert_entries(&self, entries: &[PlaylistEntry]) -> Result<(), StoreError>;

    /// Deletes a playlist together with all of its entries.
    fn delete_playlist(&self, playlist_id: PlaylistId) -> Result<(), StoreError>;

    fn delete_entries(&self, entries: &[PlaylistEntry]) -> Result<(), StoreError>;

    fn touch_played(&self, playlist_id: PlaylistId, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Every saved playlist with its entries.
    ///
    /// A playlist deleted between the listing and its entry read is left out.
    fn list_with_entries(&self) -> Result<Vec<PlaylistWithEntries>, StoreError> {
        let mut saved = Vec::new();
        for playlist in self.list_playlists()? {
            let Some(id) = playlist.id else { continue };
            match self.list_entries(id) {
                Ok(entries) => saved.push(PlaylistWithEntries {
                    id,
                    entries,
                    playlist,
                }),
                Err(StoreError::UnknownPlaylist(_)) => {
                    trace!("Playlist {id} went away while listing");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(saved)
    }
}

/// `SQLite` backed [`PlaylistStore`].
#[derive(Debug)]
pub struct SqlitePlaylistStore {
    conn: Mutex<Connection>,
}

impl SqlitePlaylistStore {
    /// Opens (and creates, if needed) the store at `path`.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Playlist store connection refused. Location: {}", path.display()))?;
        Self::init(conn)
    }

    /// Store that lives only as long as the value. Useful for testing.
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory playlist store")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> anyhow::Result<Self> {
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
            CREATE TABLE IF NOT EXISTS playlists (
                id             INTEGER PRIMARY KEY AUTOINCREMENT,
                name           TEXT    NOT NULL UNIQUE,
                created_at     TEXT    NOT NULL,
                last_played_at TEXT,
                art_ref        TEXT
            );
            CREATE TABLE IF NOT EXISTS playlist_entries (
                playlist_id INTEGER NOT NULL REFERENCES playlists(id) ON DELETE CASCADE,
                track_id    INTEGER NOT NULL,
                position    INTEGER NOT NULL,
                PRIMARY KEY (playlist_id, position)
            );
            CREATE INDEX IF NOT EXISTS idx_playlist_entries_track ON playlist_entries(track_id);",
        )
        .context("Invalid SQL when creating playlist tables")?;

        debug!("Playlist store ready");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn playlist_exists(conn: &Connection, playlist_id: PlaylistId) -> anyhow::Result<bool> {
        let found = conn
            .query_row(
                "SELECT 1 FROM playlists WHERE id = ?1",
                [playlist_id.0],
                |_| Ok(()),
            )
            .optional()
            .context("Failed to look up playlist")?;
        Ok(found.is_some())
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation)
}

impl PlaylistStore for SqlitePlaylistStore {
    fn list_playlists(&self) -> Result<Vec<Playlist>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT id, name, created_at, last_played_at, art_ref FROM playlists ORDER BY id")
            .context("Invalid SQL statement when SELECTing playlists")?;

        let playlists = stmt
            .query_map([], |row| {
                Ok(Playlist {
                    id: Some(PlaylistId(row.get(0)?)),
                    name: row.get(1)?,
                    created_at: row.get(2)?,
                    last_played_at: row.get(3)?,
                    art_ref: row.get(4)?,
                })
            })
            .context("Cannot query playlists")?
            .collect::<Result<Vec<_>, _>>()
            .context("Queried playlist row is invalid")?;

        trace!("{} playlists in store", playlists.len());
        Ok(playlists)
    }

    fn list_entries(&self, playlist_id: PlaylistId) -> Result<Vec<PlaylistEntry>, StoreError> {
        let conn = self.conn();
        if !Self::playlist_exists(&conn, playlist_id)? {
            return Err(StoreError::UnknownPlaylist(playlist_id));
        }

        let mut stmt = conn
            .prepare(
                "SELECT track_id, position FROM playlist_entries
                 WHERE playlist_id = ?1 ORDER BY position",
            )
            .context("Invalid SQL statement when SELECTing playlist entries")?;

        let entries = stmt
            .query_map([playlist_id.0], |row| {
                Ok(PlaylistEntry {
                    playlist_id,
                    track_id: crate::track::TrackId(row.get(0)?),
                    position: row.get(1)?,
                })
            })
            .with_context(|| format!("Cannot query entries of playlist {playlist_id}"))?
            .collect::<Result<Vec<_>, _>>()
            .context("Queried playlist entry is invalid")?;

        Ok(entries)
    }

    fn insert_playlist(&self, playlist: &Playlist) -> Result<PlaylistId, StoreError> {
        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT INTO playlists (name, created_at, last_played_at, art_ref) VALUES (?1, ?2, ?3, ?4)",
            params![
                playlist.name,
                playlist.created_at,
                playlist.last_played_at,
                playlist.art_ref
            ],
        );

        match inserted {
            Ok(_) => {
                let id = PlaylistId(conn.last_insert_rowid());
                debug!("Saved playlist `{}` as {id}", playlist.name);
                Ok(id)
            }
            Err(err) if is_constraint_violation(&err) => {
                Err(StoreError::DuplicateName(playlist.name.clone()))
            }
            Err(err) => Err(anyhow::Error::from(err)
                .context(format!("Failed to INSERT playlist `{}`", playlist.name))
                .into()),
        }
    }

    fn insert_entries(&self, entries: &[PlaylistEntry]) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("Failed to start transaction")?;

        {
            let mut stmt = tx
                .prepare("INSERT INTO playlist_entries (playlist_id, track_id, position) VALUES (?1, ?2, ?3)")
                .context("Invalid SQL statement when INSERTing playlist entries")?;

            for entry in entries {
                match stmt.execute(params![entry.playlist_id.0, entry.track_id.0, entry.position]) {
                    Ok(_) => {}
                    Err(err) if is_constraint_violation(&err) => {
                        // Either the playlist is gone or the position is taken.
                        if !Self::playlist_exists(&tx, entry.playlist_id)? {
                            return Err(StoreError::UnknownPlaylist(entry.playlist_id));
                        }
                        return Err(anyhow::Error::from(err)
                            .context(format!("Position {} already used", entry.position))
                            .into());
                    }
                    Err(err) => {
                        return Err(anyhow::Error::from(err)
                            .context(format!("Failed to INSERT playlist entry {entry:?}"))
                            .into())
                    }
                }
            }
        }

        tx.commit().context("Committing SQL transaction failed")?;
        Ok(())
    }

    fn delete_playlist(&self, playlist_id: PlaylistId) -> Result<(), StoreError> {
        let conn = self.conn();
        let deleted = conn
            .execute("DELETE FROM playlists WHERE id = ?1", [playlist_id.0])
            .with_context(|| format!("Failed to DELETE playlist {playlist_id}"))?;

        if deleted == 0 {
            return Err(StoreError::UnknownPlaylist(playlist_id));
        }
        debug!("Deleted playlist {playlist_id}");
        Ok(())
    }

    fn delete_entries(&self, entries: &[PlaylistEntry]) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("Failed to start transaction")?;

        {
            let mut stmt = tx
                .prepare("DELETE FROM playlist_entries WHERE playlist_id = ?1 AND position = ?2")
                .context("Invalid SQL statement when DELETEing playlist entries")?;
            for entry in entries {
                stmt.execute(params![entry.playlist_id.0, entry.position])
                    .with_context(|| format!("Failed to DELETE playlist entry {entry:?}"))?;
            }
        }

        tx.commit().context("Committing SQL transaction failed")?;
        Ok(())
    }

    fn touch_played(&self, playlist_id: PlaylistId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let conn = self.conn();
        let updated = conn
            .execute(
                "UPDATE playlists SET last_played_at = ?1 WHERE id = ?2",
                params![at, playlist_id.0],
            )
            .with_context(|| format!("Failed to UPDATE last played of playlist {playlist_id}"))?;

        if updated == 0 {
            return Err(StoreError::UnknownPlaylist(playlist_id));
        }
        Ok(())
    }
}
