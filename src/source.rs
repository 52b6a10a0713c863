//! # Metadata Source
//!
//! The catalog's only window onto the device's media index. Sources are
//! pull-only: there are no change notifications, so the catalog re-reads the
//! whole index on every refresh.
//!
//! Two sources ship with the crate:
//!
//! - [`SqliteMediaIndex`] reads the `audio` table of an `SQLite` media index,
//!   opened read-only on every load.
//! - [`JsonMediaIndex`] reads a JSON array of [`TrackRecord`]s, the format
//!   produced by index exporters.

use crate::track::{Track, TrackRecord};
use anyhow::{Context, Result};
use log::{debug, info};
use rusqlite::{params, Connection, OpenFlags};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Schema of the `audio` table a [`SqliteMediaIndex`] expects.
pub const MEDIA_INDEX_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS audio (
    _id       INTEGER PRIMARY KEY,
    title     TEXT,
    album     TEXT,
    artist    TEXT,
    duration  INTEGER NOT NULL DEFAULT 0,
    track     INTEGER NOT NULL DEFAULT 0,
    album_id  INTEGER NOT NULL,
    artist_id INTEGER NOT NULL DEFAULT 0,
    is_music  INTEGER NOT NULL DEFAULT 1
)";

const UNKNOWN_ALBUM: &str = "Unknown Album";
const UNKNOWN_ARTIST: &str = "Unknown Artist";

/// Something that can list every track of the media index.
///
/// `load_all_tracks` blocks on disk I/O and may be slow; the catalog only
/// calls it from its refresh worker.
pub trait MetadataSource: Send + Sync {
    fn load_all_tracks(&self) -> Result<Vec<Track>>;
}

/// Media index stored in an `SQLite` file.
#[derive(Debug, Clone)]
pub struct SqliteMediaIndex {
    path: PathBuf,
}

impl SqliteMediaIndex {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MetadataSource for SqliteMediaIndex {
    fn load_all_tracks(&self) -> Result<Vec<Track>> {
        let conn = Connection::open_with_flags(&self.path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .with_context(|| format!("Media index unavailable at {}", self.path.display()))?;

        let mut stmt = conn
            .prepare(
                "SELECT _id, title, album, artist, duration, track, album_id, artist_id
                 FROM audio WHERE is_music != 0",
            )
            .context("Invalid SQL statement when SELECTing from media index")?;

        let tracks = stmt
            .query_map([], |row| {
                let id: i64 = row.get(0)?;
                Ok(TrackRecord {
                    id,
                    title: row
                        .get::<_, Option<String>>(1)?
                        .unwrap_or_else(|| format!("Track {id}")),
                    album: row
                        .get::<_, Option<String>>(2)?
                        .unwrap_or_else(|| UNKNOWN_ALBUM.to_string()),
                    artist: row
                        .get::<_, Option<String>>(3)?
                        .unwrap_or_else(|| UNKNOWN_ARTIST.to_string()),
                    duration: row.get(4)?,
                    track: row.get(5)?,
                    album_id: row.get(6)?,
                    artist_id: row.get(7)?,
                })
            })
            .context("Cannot query media index")?
            .map(|record| record.map(Track::from))
            .collect::<Result<Vec<_>, _>>()
            .context("Media index row is invalid")?;

        debug!("Loaded {} tracks from {}", tracks.len(), self.path.display());
        Ok(tracks)
    }
}

/// Media index exported as JSON.
#[derive(Debug, Clone)]
pub struct JsonMediaIndex {
    path: PathBuf,
}

impl JsonMediaIndex {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl MetadataSource for JsonMediaIndex {
    fn load_all_tracks(&self) -> Result<Vec<Track>> {
        let file = File::open(&self.path)
            .with_context(|| format!("Media index unavailable at {}", self.path.display()))?;
        let records: Vec<TrackRecord> = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Media index {} is not valid JSON", self.path.display()))?;

        debug!("Loaded {} tracks from {}", records.len(), self.path.display());
        Ok(records.into_iter().map(Track::from).collect())
    }
}

/// Picks the source implementation from the file extension.
pub fn open_index(path: &Path) -> Arc<dyn MetadataSource> {
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        Arc::new(JsonMediaIndex::new(path))
    } else {
        Arc::new(SqliteMediaIndex::new(path))
    }
}

/// Writes `records` into a (new or existing) `SQLite` media index at `path`.
///
/// Used to produce fixtures and to convert JSON exports.
pub fn write_media_index(path: &Path, records: &[TrackRecord]) -> Result<()> {
    let mut conn = Connection::open(path)
        .with_context(|| format!("Media index connection refused. Location: {}", path.display()))?;
    conn.execute(MEDIA_INDEX_SCHEMA, [])
        .context("Invalid SQL command when CREATEing audio TABLE")?;

    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO audio
             (_id, title, album, artist, duration, track, album_id, artist_id, is_music)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1)",
        )?;
        for record in records {
            stmt.execute(params![
                record.id,
                record.title,
                record.album,
                record.artist,
                record.duration,
                record.track,
                record.album_id,
                record.artist_id
            ])
            .with_context(|| format!("Failed to INSERT track INTO media index: {record:?}"))?;
        }
    }
    tx.commit().context("Committing SQL transaction failed")?;

    info!("Wrote {} tracks to media index {}", records.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::TrackId;

    fn records() -> Vec<TrackRecord> {
        vec![
            TrackRecord {
                id: 1,
                title: "Amerika".to_string(),
                album: "Reise, Reise".to_string(),
                artist: "Rammstein".to_string(),
                duration: 3046,
                track: 106,
                album_id: 2,
                artist_id: 5,
            },
            TrackRecord {
                id: 42,
                title: "Fever".to_string(),
                album: "Fever".to_string(),
                artist: "BFMV".to_string(),
                duration: 2567,
                track: 101,
                album_id: 3,
                artist_id: 6,
            },
        ]
    }

    #[test]
    fn test_sqlite_index_loads_tracks() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("media.db");
        write_media_index(&path, &records())?;

        let mut tracks = SqliteMediaIndex::new(&path).load_all_tracks()?;
        tracks.sort_by_key(|t| t.id);

        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].id, TrackId(1));
        assert_eq!((tracks[0].disc_number, tracks[0].track_number), (1, 6));
        assert_eq!(tracks[1].title, "Fever");
        Ok(())
    }

    #[test]
    fn test_sqlite_index_skips_non_music_and_fills_nulls() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("media.db");
        let conn = Connection::open(&path)?;
        conn.execute(MEDIA_INDEX_SCHEMA, [])?;
        conn.execute(
            "INSERT INTO audio (_id, title, album, artist, album_id, is_music)
             VALUES (1, NULL, NULL, NULL, 4, 1), (2, 'Ringtone', 'x', 'y', 5, 0)",
            [],
        )?;
        drop(conn);

        let tracks = SqliteMediaIndex::new(&path).load_all_tracks()?;
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].title, "Track 1");
        assert_eq!(tracks[0].album, UNKNOWN_ALBUM);
        assert_eq!(tracks[0].artist, UNKNOWN_ARTIST);
        Ok(())
    }

    #[test]
    fn test_missing_index_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = SqliteMediaIndex::new(dir.path().join("absent.db"));
        let err = source.load_all_tracks().unwrap_err();
        assert!(format!("{err:#}").contains("Media index unavailable"));
    }

    #[test]
    fn test_json_index_loads_tracks() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("media.json");
        std::fs::write(&path, serde_json::to_string(&records())?)?;

        let source = open_index(&path);
        let tracks = source.load_all_tracks()?;
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[1].id, TrackId(42));
        Ok(())
    }

    #[test]
    fn test_json_index_rejects_garbage() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("media.json");
        std::fs::write(&path, "{ not json")?;
        assert!(JsonMediaIndex::new(&path).load_all_tracks().is_err());
        Ok(())
    }
}
