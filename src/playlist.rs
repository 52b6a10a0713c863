//! User playlists and their ordered entries.

use crate::track::TrackId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Store-assigned playlist id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaylistId(pub i64);

impl fmt::Display for PlaylistId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A user playlist. `id` is `None` until the playlist has been saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: Option<PlaylistId>,
    /// Unique across all playlists.
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub last_played_at: Option<DateTime<Utc>>,
    pub art_ref: Option<String>,
}

impl Playlist {
    /// A fresh, unsaved playlist created now.
    pub fn new(name: impl Into<String>) -> Self {
        Playlist {
            id: None,
            name: name.into(),
            created_at: Utc::now(),
            last_played_at: None,
            art_ref: None,
        }
    }
}

/// One occurrence of a track inside a playlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlaylistEntry {
    pub playlist_id: PlaylistId,
    pub track_id: TrackId,
    pub position: u32,
}

/// A saved playlist together with its entries in position order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistWithEntries {
    pub id: PlaylistId,
    pub playlist: Playlist,
    pub entries: Vec<PlaylistEntry>,
}

impl PlaylistWithEntries {
    /// Member track ids, in stored order. A track may appear more than once.
    pub fn track_ids(&self) -> impl Iterator<Item = TrackId> + '_ {
        self.entries.iter().map(|entry| entry.track_id)
    }
}

/// Position the next entry appended after `entries` gets.
pub fn next_position(entries: &[PlaylistEntry]) -> u32 {
    entries
        .iter()
        .map(|entry| entry.position + 1)
        .max()
        .unwrap_or(0)
}

/// Builds entries for `track_ids`, numbered contiguously from `first_position`.
pub fn entries_from(
    playlist_id: PlaylistId,
    first_position: u32,
    track_ids: &[TrackId],
) -> Vec<PlaylistEntry> {
    track_ids
        .iter()
        .zip(first_position..)
        .map(|(track_id, position)| PlaylistEntry {
            playlist_id,
            track_id: *track_id,
            position,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_are_contiguous() {
        let entries = entries_from(PlaylistId(1), 3, &[TrackId(7), TrackId(8), TrackId(7)]);
        let positions: Vec<u32> = entries.iter().map(|e| e.position).collect();
        assert_eq!(positions, vec![3, 4, 5]);
        assert!(entries.iter().all(|e| e.playlist_id == PlaylistId(1)));
    }

    #[test]
    fn test_next_position_follows_max() {
        assert_eq!(next_position(&[]), 0);

        // Gaps left by removals do not get reused.
        let entries = vec![
            PlaylistEntry { playlist_id: PlaylistId(1), track_id: TrackId(1), position: 0 },
            PlaylistEntry { playlist_id: PlaylistId(1), track_id: TrackId(2), position: 4 },
        ];
        assert_eq!(next_position(&entries), 5);
    }

    #[test]
    fn test_new_playlist_is_unsaved() {
        let playlist = Playlist::new("Focus");
        assert!(playlist.id.is_none());
        assert!(playlist.last_played_at.is_none());
    }
}
