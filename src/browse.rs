//! # Browse Protocol
//!
//! What a browsing client receives: [`BrowseItem`]s addressed by browse
//! identifiers, and [`BrowseResponse`], the JSON envelope written by the
//! browse session.

use crate::browse_id::{encode, Root};
use crate::cache::Snapshot;
use crate::error::CatalogError;
use crate::playlist::PlaylistWithEntries;
use crate::track::{Album, Artist, Track};
use serde::{Deserialize, Serialize};

/// One node of the catalog tree as shown to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowseItem {
    pub id: String,
    pub title: String,
    pub subtitle: Option<String>,
    pub art_ref: Option<String>,
    pub playable: bool,
    pub browsable: bool,
}

impl BrowseItem {
    /// Top-level node for `root`.
    pub fn root(root: Root) -> Self {
        BrowseItem {
            id: encode(root, None, None),
            title: root.title().to_string(),
            subtitle: None,
            art_ref: None,
            playable: false,
            browsable: true,
        }
    }

    /// A playable track, addressed inside the container `root[/category]`.
    pub fn track(track: &Track, root: Root, category: Option<i64>) -> Self {
        BrowseItem {
            id: encode(root, category, Some(track.id.0)),
            title: track.title.clone(),
            subtitle: Some(track.artist.clone()),
            art_ref: Some(track.art_ref.clone()),
            playable: true,
            browsable: false,
        }
    }

    pub fn album(album: &Album) -> Self {
        BrowseItem {
            id: encode(Root::Albums, Some(album.id.0), None),
            title: album.title.clone(),
            subtitle: Some(album.artist.clone()),
            art_ref: Some(album.art_ref.clone()),
            playable: false,
            browsable: true,
        }
    }

    pub fn artist(artist: &Artist) -> Self {
        BrowseItem {
            id: encode(Root::Artists, Some(artist.id.0), None),
            title: artist.name.clone(),
            subtitle: Some(format!(
                "{} albums, {} tracks",
                artist.album_count, artist.track_count
            )),
            art_ref: None,
            playable: false,
            browsable: true,
        }
    }

    /// Summary of a playlist; art falls back to its first track's.
    ///
    /// Counts only entries whose track is still in the snapshot, matching
    /// what browsing the playlist returns.
    pub fn playlist(playlist: &PlaylistWithEntries, snapshot: &Snapshot) -> Self {
        let count = snapshot
            .playlist_tracks(playlist.id)
            .map_or(playlist.entries.len(), Iterator::count);
        BrowseItem {
            id: encode(Root::Playlists, Some(playlist.id.0), None),
            title: playlist.playlist.name.clone(),
            subtitle: Some(format!("{count} tracks")),
            art_ref: snapshot.playlist_art(playlist.id),
            playable: false,
            browsable: true,
        }
    }
}

/// Error payload of a [`BrowseResponse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

/// One reply of the browse protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowseResponse {
    Items(Vec<BrowseItem>),
    Error(ErrorBody),
}

impl From<Result<Vec<BrowseItem>, CatalogError>> for BrowseResponse {
    fn from(result: Result<Vec<BrowseItem>, CatalogError>) -> Self {
        match result {
            Ok(items) => BrowseResponse::Items(items),
            Err(err) => BrowseResponse::Error(ErrorBody {
                kind: err.kind().to_string(),
                message: err.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::TrackRecord;

    fn amerika() -> Track {
        Track::from(TrackRecord {
            id: 1,
            title: "Amerika".to_string(),
            album: "Reise, Reise".to_string(),
            artist: "Rammstein".to_string(),
            duration: 3046,
            track: 106,
            album_id: 2,
            artist_id: 5,
        })
    }

    #[test]
    fn test_track_ids_follow_container() {
        let track = amerika();
        assert_eq!(BrowseItem::track(&track, Root::Music, None).id, "MUSIC|1");
        assert_eq!(BrowseItem::track(&track, Root::Albums, Some(2)).id, "ALBUMS/2|1");

        let item = BrowseItem::track(&track, Root::Music, None);
        assert!(item.playable && !item.browsable);
        assert_eq!(item.subtitle.as_deref(), Some("Rammstein"));
        assert_eq!(item.art_ref.as_deref(), Some("media://albumart/2"));
    }

    #[test]
    fn test_response_json_shape() -> anyhow::Result<()> {
        let ok = BrowseResponse::from(Ok(vec![BrowseItem::root(Root::Albums)]));
        let json = serde_json::to_value(&ok)?;
        assert_eq!(json["items"][0]["id"], "ALBUMS");
        assert_eq!(json["items"][0]["browsable"], true);

        let err = BrowseResponse::from(Err(CatalogError::NotFound("track 9".to_string())));
        let json = serde_json::to_value(&err)?;
        assert_eq!(json["error"]["kind"], "not_found");
        assert_eq!(json["error"]["message"], "not found: track 9");
        Ok(())
    }
}
