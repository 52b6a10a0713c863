//! # Catalog Cache
//!
//! In-memory, immutable views of the catalog ([`Snapshot`]s) and the single
//! slot that publishes the current one ([`CatalogCache`]).
//!
//! ## Snapshots
//!
//! [`build`] turns the raw tracks and playlists into a [`Snapshot`]:
//!
//! - every track, ordered by its normalized title (ties broken by id);
//! - albums and artists, derived by grouping tracks on their ids;
//! - per album, tracks ordered by `(disc, track)`;
//! - per artist, tracks in title order;
//! - playlists keyed by id, entries in stored position order.
//!
//! A snapshot is never mutated after it is built. Track data and playlist
//! data live behind separate `Arc`s so that a playlist edit can publish a new
//! snapshot without copying the library.
//!
//! ## Publishing
//!
//! [`CatalogCache`] holds the current snapshot behind an `RwLock`. Readers
//! clone the `Arc` and release the lock immediately, so a reader holding a
//! snapshot keeps seeing it in full while newer ones are swapped in.
//!
//! Two counters keep concurrent publishers honest:
//!
//! - the *invalidation epoch*: a load that started before an
//!   [`invalidate`](CatalogCache::invalidate) publishes its result but leaves
//!   the cache stale;
//! - the *playlist sequence*: playlist projections are only published when
//!   they were read after every projection already visible.

use crate::playlist::{PlaylistId, PlaylistWithEntries};
use crate::track::{Album, AlbumId, Artist, ArtistId, Track, TrackId};
use log::{debug, trace, warn};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Playlists of a snapshot, keyed by id.
pub type PlaylistMap = BTreeMap<PlaylistId, PlaylistWithEntries>;

/// Tracks of the media index and the groupings derived from them.
#[derive(Debug, Default)]
pub struct Library {
    tracks: HashMap<TrackId, Track>,
    by_title: Vec<TrackId>,
    albums: Vec<Album>,
    album_index: HashMap<AlbumId, usize>,
    album_tracks: HashMap<AlbumId, Vec<TrackId>>,
    artists: Vec<Artist>,
    artist_index: HashMap<ArtistId, usize>,
    artist_tracks: HashMap<ArtistId, Vec<TrackId>>,
}

impl Library {
    /// Groups `tracks` into albums and artists.
    pub fn build(mut tracks: Vec<Track>) -> Self {
        tracks.par_sort_by(|a, b| a.sort_key.cmp(&b.sort_key).then(a.id.cmp(&b.id)));

        let mut library = Library::default();
        let mut artist_albums: HashMap<ArtistId, HashSet<AlbumId>> = HashMap::new();

        for track in tracks {
            if library.tracks.contains_key(&track.id) {
                warn!("Duplicate track id {} in media index; keeping the first", track.id);
                continue;
            }
            library.by_title.push(track.id);
            library.album_tracks.entry(track.album_id).or_default().push(track.id);
            library.artist_tracks.entry(track.artist_id).or_default().push(track.id);
            artist_albums.entry(track.artist_id).or_default().insert(track.album_id);
            library.tracks.insert(track.id, track);
        }

        let tracks = &library.tracks;
        for ids in library.album_tracks.values_mut() {
            // Stable: equal (disc, track) pairs keep title order.
            ids.sort_by_key(|id| tracks[id].album_position());
        }

        library.albums = library
            .album_tracks
            .iter()
            .map(|(album_id, ids)| {
                let first = &tracks[&ids[0]];
                Album {
                    id: *album_id,
                    title: first.album.clone(),
                    artist: first.artist.clone(),
                    art_ref: first.art_ref.clone(),
                    track_count: ids.len(),
                    sort_key: crate::track::sort_key(&first.album),
                }
            })
            .collect();
        library
            .albums
            .sort_by(|a, b| a.sort_key.cmp(&b.sort_key).then(a.id.cmp(&b.id)));

        library.artists = library
            .artist_tracks
            .iter()
            .map(|(artist_id, ids)| {
                let first = &tracks[&ids[0]];
                Artist {
                    id: *artist_id,
                    name: first.artist.clone(),
                    album_count: artist_albums.get(artist_id).map_or(0, HashSet::len),
                    track_count: ids.len(),
                    sort_key: crate::track::sort_key(&first.artist),
                }
            })
            .collect();
        library
            .artists
            .sort_by(|a, b| a.sort_key.cmp(&b.sort_key).then(a.id.cmp(&b.id)));

        library.album_index = library
            .albums
            .iter()
            .enumerate()
            .map(|(idx, album)| (album.id, idx))
            .collect();
        library.artist_index = library
            .artists
            .iter()
            .enumerate()
            .map(|(idx, artist)| (artist.id, idx))
            .collect();

        trace!(
            "Built library: {} tracks, {} albums, {} artists",
            library.tracks.len(),
            library.albums.len(),
            library.artists.len()
        );
        library
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    fn resolve<'a>(&'a self, ids: &'a [TrackId]) -> impl Iterator<Item = &'a Track> + 'a {
        ids.iter().filter_map(|id| self.tracks.get(id))
    }
}

/// An immutable, fully built view of the catalog.
#[derive(Debug, Clone)]
pub struct Snapshot {
    generation: u64,
    library: Arc<Library>,
    playlists: Arc<PlaylistMap>,
}

/// Builds a snapshot from the raw tracks and stored playlists.
pub fn build(tracks: Vec<Track>, playlists: Vec<PlaylistWithEntries>) -> Snapshot {
    Snapshot {
        generation: 0,
        library: Arc::new(Library::build(tracks)),
        playlists: Arc::new(playlist_map(playlists)),
    }
}

/// Keys stored playlists by id.
pub fn playlist_map(playlists: Vec<PlaylistWithEntries>) -> PlaylistMap {
    playlists.into_iter().map(|p| (p.id, p)).collect()
}

impl Snapshot {
    /// Number assigned when the snapshot was published; 0 if never published.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Same library, different playlists.
    pub fn with_playlists(&self, playlists: Arc<PlaylistMap>) -> Snapshot {
        Snapshot {
            generation: 0,
            library: Arc::clone(&self.library),
            playlists,
        }
    }

    pub fn library(&self) -> &Library {
        &self.library
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.library.tracks.get(&id)
    }

    /// Every track, in title order.
    pub fn tracks(&self) -> impl Iterator<Item = &Track> + '_ {
        self.library.resolve(&self.library.by_title)
    }

    pub fn albums(&self) -> &[Album] {
        &self.library.albums
    }

    pub fn album(&self, id: AlbumId) -> Option<&Album> {
        self.library
            .album_index
            .get(&id)
            .map(|idx| &self.library.albums[*idx])
    }

    /// Tracks of an album by `(disc, track)`, `None` for an unknown album.
    pub fn album_tracks(&self, id: AlbumId) -> Option<impl Iterator<Item = &Track> + '_> {
        let ids = self.library.album_tracks.get(&id)?;
        Some(self.library.resolve(ids))
    }

    pub fn artists(&self) -> &[Artist] {
        &self.library.artists
    }

    pub fn artist(&self, id: ArtistId) -> Option<&Artist> {
        self.library
            .artist_index
            .get(&id)
            .map(|idx| &self.library.artists[*idx])
    }

    /// Tracks of an artist in title order, `None` for an unknown artist.
    pub fn artist_tracks(&self, id: ArtistId) -> Option<impl Iterator<Item = &Track> + '_> {
        let ids = self.library.artist_tracks.get(&id)?;
        Some(self.library.resolve(ids))
    }

    /// Playlists ordered by name, case-insensitively, then id.
    pub fn playlists(&self) -> Vec<&PlaylistWithEntries> {
        let mut playlists: Vec<_> = self.playlists.values().collect();
        playlists.sort_by(|a, b| {
            a.playlist
                .name
                .to_lowercase()
                .cmp(&b.playlist.name.to_lowercase())
                .then(a.id.cmp(&b.id))
        });
        playlists
    }

    pub fn playlist(&self, id: PlaylistId) -> Option<&PlaylistWithEntries> {
        self.playlists.get(&id)
    }

    /// Member tracks in stored order. Entries whose track left the media
    /// index are skipped.
    pub fn playlist_tracks(&self, id: PlaylistId) -> Option<impl Iterator<Item = &Track> + '_> {
        let playlist = self.playlists.get(&id)?;
        Some(playlist.track_ids().filter_map(|track_id| self.track(track_id)))
    }

    /// Stored art of a playlist, falling back to its first resolvable track.
    pub fn playlist_art(&self, id: PlaylistId) -> Option<String> {
        let playlist = self.playlists.get(&id)?;
        playlist
            .playlist
            .art_ref
            .clone()
            .or_else(|| self.playlist_tracks(id)?.next().map(|t| t.art_ref.clone()))
    }
}

/// Lifecycle of the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// Nothing built yet.
    Empty,
    /// A load is in flight.
    Loading,
    /// Serving a current snapshot.
    Ready,
    /// Serving a snapshot that has been invalidated.
    Stale,
}

/// Taken before a load reads its collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    epoch: u64,
    playlist_seq: u64,
}

#[derive(Debug, Default)]
struct Slot {
    current: Option<Arc<Snapshot>>,
    stale: bool,
    epoch: u64,
    /// Sequence of the playlists in `current` (or `pending_playlists`).
    playlist_seq: u64,
    /// Playlists published before the first snapshot existed.
    pending_playlists: Option<Arc<PlaylistMap>>,
    generation: u64,
}

impl Slot {
    fn install(&mut self, mut snapshot: Snapshot) -> Arc<Snapshot> {
        self.generation += 1;
        snapshot.generation = self.generation;
        let snapshot = Arc::new(snapshot);
        self.current = Some(Arc::clone(&snapshot));
        snapshot
    }
}

/// Holder of the current [`Snapshot`].
#[derive(Debug, Default)]
pub struct CatalogCache {
    slot: RwLock<Slot>,
    playlist_tickets: AtomicU64,
}

impl CatalogCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_slot(&self) -> RwLockReadGuard<'_, Slot> {
        self.slot.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_slot(&self) -> RwLockWriteGuard<'_, Slot> {
        self.slot.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Last published snapshot, `None` before the first build.
    pub fn current_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.read_slot().current.clone()
    }

    /// Current snapshot together with its staleness, read atomically.
    pub fn read(&self) -> (Option<Arc<Snapshot>>, bool) {
        let slot = self.read_slot();
        (slot.current.clone(), slot.stale)
    }

    /// `Empty`, `Ready` or `Stale`; loads are tracked by the repository.
    pub fn state(&self) -> CacheState {
        match self.read() {
            (None, _) => CacheState::Empty,
            (Some(_), true) => CacheState::Stale,
            (Some(_), false) => CacheState::Ready,
        }
    }

    /// Replaces the snapshot wholesale and clears staleness.
    pub fn swap(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let seq = self.next_playlist_seq();
        let mut slot = self.write_slot();
        slot.stale = false;
        slot.playlist_seq = slot.playlist_seq.max(seq);
        slot.pending_playlists = None;
        slot.install(snapshot)
    }

    /// Marks the current snapshot stale. Never blocks on I/O.
    pub fn invalidate(&self) {
        let mut slot = self.write_slot();
        slot.epoch += 1;
        if slot.current.is_some() {
            slot.stale = true;
        }
        debug!("Catalog invalidated (epoch {})", slot.epoch);
    }

    /// Records where a load starts. Must be taken before reading the store.
    pub fn begin_load(&self) -> LoadTicket {
        let playlist_seq = self.next_playlist_seq();
        LoadTicket {
            epoch: self.read_slot().epoch,
            playlist_seq,
        }
    }

    /// Sequence number for a playlist projection about to be read.
    pub fn next_playlist_seq(&self) -> u64 {
        self.playlist_tickets.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Publishes the result of a full load.
    ///
    /// Playlists published by a mutation while the load was running win over
    /// the (older) ones the load read. If the cache was invalidated after
    /// `ticket` was taken, the snapshot is served but stays stale.
    pub fn swap_loaded(&self, snapshot: Snapshot, ticket: LoadTicket) -> Arc<Snapshot> {
        let mut slot = self.write_slot();

        let snapshot = if slot.playlist_seq > ticket.playlist_seq {
            let newer = slot
                .pending_playlists
                .clone()
                .or_else(|| slot.current.as_ref().map(|s| Arc::clone(&s.playlists)));
            match newer {
                Some(playlists) => snapshot.with_playlists(playlists),
                None => snapshot,
            }
        } else {
            slot.playlist_seq = ticket.playlist_seq;
            snapshot
        };
        slot.pending_playlists = None;
        slot.stale = slot.epoch != ticket.epoch;
        if slot.stale {
            debug!("Load finished after an invalidation; snapshot stays stale");
        }
        slot.install(snapshot)
    }

    /// Publishes a playlist projection read under sequence `seq`.
    ///
    /// Returns `false` when a projection read later is already visible.
    pub fn swap_playlists(&self, playlists: PlaylistMap, seq: u64) -> bool {
        let mut slot = self.write_slot();
        if seq <= slot.playlist_seq {
            trace!("Dropping playlist projection {seq}; {} is visible", slot.playlist_seq);
            return false;
        }
        slot.playlist_seq = seq;

        let playlists = Arc::new(playlists);
        match slot.current.clone() {
            Some(current) => {
                slot.install(current.with_playlists(playlists));
            }
            None => slot.pending_playlists = Some(playlists),
        }
        true
    }
}
