//! # Track Records
//!
//! How a track, and the albums and artists derived from it, look inside the
//! catalog. Tracks arrive from the media index as [`TrackRecord`] rows and are
//! converted once into immutable [`Track`] values.
//!
//! ## Combined track field
//!
//! The media index stores disc and track number in a single integer,
//! `disc * 100 + track`. A record with `track = 106` is disc 1, track 6.
//! [`split_track_field`] is the only place that unpacks it.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

numeric_id!(
    /// Media index id of a track. Stable for the lifetime of the file.
    TrackId
);
numeric_id!(
    /// Media index id of an album.
    AlbumId
);
numeric_id!(
    /// Media index id of an artist.
    ArtistId
);

/// Raw row of the external media index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackRecord {
    pub id: i64,
    pub title: String,
    pub album: String,
    pub artist: String,
    /// Duration in milliseconds.
    pub duration: u64,
    /// Combined `disc * 100 + track` field.
    #[serde(default)]
    pub track: u32,
    pub album_id: i64,
    #[serde(default)]
    pub artist_id: i64,
}

/// A track, as the catalog cares about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Track {
    pub id: TrackId,
    pub title: String,
    pub album: String,
    pub artist: String,
    /// Duration in milliseconds.
    pub duration_ms: u64,
    pub disc_number: u32,
    pub track_number: u32,
    pub album_id: AlbumId,
    pub artist_id: ArtistId,
    /// Reference to the album art of this track.
    pub art_ref: String,
    /// Normalized title used for the global track ordering.
    #[serde(skip)]
    pub sort_key: String,
}

impl From<TrackRecord> for Track {
    fn from(record: TrackRecord) -> Self {
        let (disc_number, track_number) = split_track_field(record.track);
        let album_id = AlbumId(record.album_id);
        Track {
            id: TrackId(record.id),
            sort_key: sort_key(&record.title),
            title: record.title,
            album: record.album,
            artist: record.artist,
            duration_ms: record.duration,
            disc_number,
            track_number,
            album_id,
            artist_id: ArtistId(record.artist_id),
            art_ref: album_art_ref(album_id),
        }
    }
}

impl Track {
    /// Position of this track inside its album.
    pub fn album_position(&self) -> (u32, u32) {
        (self.disc_number, self.track_number)
    }
}

/// An album, derived by grouping tracks on their album id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Album {
    pub id: AlbumId,
    pub title: String,
    pub artist: String,
    pub art_ref: String,
    pub track_count: usize,
    #[serde(skip)]
    pub sort_key: String,
}

/// An artist, derived by grouping tracks on their artist id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artist {
    pub id: ArtistId,
    pub name: String,
    pub album_count: usize,
    pub track_count: usize,
    #[serde(skip)]
    pub sort_key: String,
}

/// Unpacks the media index's combined field into `(disc, track)`.
pub fn split_track_field(combined: u32) -> (u32, u32) {
    (combined / 100, combined % 100)
}

/// Art reference shared by every track of an album.
pub fn album_art_ref(album_id: AlbumId) -> String {
    format!("media://albumart/{album_id}")
}

/// Normalizes a display name into a sort key.
///
/// Lowercases, trims, drops one leading English article and any leading
/// punctuation, so `"The Fever"` and `"...fever"` both sort under `f`.
pub fn sort_key(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let without_article = ["the ", "an ", "a "]
        .iter()
        .find_map(|article| lowered.strip_prefix(article))
        .unwrap_or(&lowered);
    let key = without_article.trim_start_matches(|c: char| !c.is_alphanumeric());
    if key.is_empty() {
        lowered
    } else {
        key.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: i64, title: &str, track: u32) -> TrackRecord {
        TrackRecord {
            id,
            title: title.to_string(),
            album: "Reise, Reise".to_string(),
            artist: "Rammstein".to_string(),
            duration: 3046,
            track,
            album_id: 2,
            artist_id: 9,
        }
    }

    #[test]
    fn test_split_track_field_disc_then_track() {
        assert_eq!(split_track_field(106), (1, 6));
        assert_eq!(split_track_field(101), (1, 1));
        assert_eq!(split_track_field(7), (0, 7));
        assert_eq!(split_track_field(1203), (12, 3));
    }

    #[test]
    fn test_split_keeps_both_halves() {
        for combined in [0, 1, 99, 100, 106, 250, 1203, u32::MAX] {
            let (disc, track) = split_track_field(combined);
            assert!(track < 100);
            assert_eq!(u64::from(disc) * 100 + u64::from(track), u64::from(combined));
        }
    }

    #[test]
    fn test_track_from_record() {
        let track = Track::from(record(1, "Amerika", 106));
        assert_eq!(track.id, TrackId(1));
        assert_eq!(track.disc_number, 1);
        assert_eq!(track.track_number, 6);
        assert_eq!(track.duration_ms, 3046);
        assert_eq!(track.album_id, AlbumId(2));
        assert_eq!(track.artist_id, ArtistId(9));
        assert_eq!(track.art_ref, "media://albumart/2");
        assert_eq!(track.sort_key, "amerika");
    }

    #[test]
    fn test_sort_key_normalization() {
        assert_eq!(sort_key("  The Fever "), "fever");
        assert_eq!(sort_key("A Day"), "day");
        assert_eq!(sort_key("An Ending"), "ending");
        assert_eq!(sort_key("...Baby One More Time"), "baby one more time");
        assert_eq!(sort_key("Theory"), "theory");
        // Nothing alphanumeric left; fall back to the lowered name.
        assert_eq!(sort_key("!!!"), "!!!");
    }

    #[test]
    fn test_record_deserializes_without_optional_fields() -> anyhow::Result<()> {
        let record: TrackRecord = serde_json::from_str(
            r#"{"id":42,"title":"Fever","album":"Fever","artist":"BFMV","duration":2567,"album_id":3}"#,
        )?;
        assert_eq!(record.track, 0);
        assert_eq!(record.artist_id, 0);
        Ok(())
    }
}
