//! # Catalog Repository
//!
//! Public face of the catalog. Resolves browse identifiers against the
//! current [`Snapshot`], keeps the cache fresh and passes playlist edits
//! through to the [`PlaylistStore`].
//!
//! ## Lifecycle
//!
//! ```text
//! Empty -> Loading -> Ready -> (Stale -> Loading -> Ready)*
//! ```
//!
//! - Reads block only while no snapshot exists. A failing first load is
//!   reported to every caller waiting on it.
//! - Loads run on the repository's [`RefreshWorker`]. Callers asking for a
//!   refresh while one is running attach to it instead of starting another.
//! - A failed refresh keeps the previous snapshot and leaves it stale.
//! - Reads of a stale snapshot follow the configured [`StalePolicy`].
//!
//! ## Playlist edits
//!
//! Every edit is written to the store first. The repository then re-reads the
//! store's playlists and publishes them next to the current track library, so
//! the caller's next read sees the edit. If that re-read fails the cache is
//! invalidated instead.

use crate::browse::BrowseItem;
use crate::browse_id::{decode, BrowseId, Root};
use crate::cache::{self, CacheState, CatalogCache, Snapshot};
use crate::error::{CatalogError, Result};
use crate::playlist::{entries_from, next_position, Playlist, PlaylistId};
use crate::source::MetadataSource;
use crate::store::PlaylistStore;
use crate::track::{AlbumId, ArtistId, TrackId};
use crate::worker::RefreshWorker;
use chrono::Utc;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// What a read does when the snapshot has been invalidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StalePolicy {
    /// Serve the stale snapshot at once and refresh in the background.
    #[default]
    ServeStale,
    /// Wait for the refresh. If it fails, serve the stale snapshot.
    Block,
}

impl fmt::Display for StalePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StalePolicy::ServeStale => f.write_str("serve-stale"),
            StalePolicy::Block => f.write_str("block"),
        }
    }
}

impl FromStr for StalePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "serve-stale" => Ok(StalePolicy::ServeStale),
            "block" => Ok(StalePolicy::Block),
            other => Err(format!(
                "unknown stale policy `{other}` (expected `serve-stale` or `block`)"
            )),
        }
    }
}

type Outcome = Result<Arc<Snapshot>>;

/// One in-flight load, shared by every caller attached to it.
#[derive(Default)]
struct Flight {
    outcome: Mutex<Option<Outcome>>,
    done: Condvar,
}

impl Flight {
    fn lock(&self) -> MutexGuard<'_, Option<Outcome>> {
        self.outcome.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn complete(&self, outcome: Outcome) {
        *self.lock() = Some(outcome);
        self.done.notify_all();
    }

    fn wait(&self) -> Outcome {
        let mut outcome = self.lock();
        loop {
            if let Some(outcome) = outcome.as_ref() {
                return outcome.clone();
            }
            outcome = self
                .done
                .wait(outcome)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn wait_timeout(&self, timeout: Duration) -> Option<Outcome> {
        let deadline = Instant::now() + timeout;
        let mut outcome = self.lock();
        loop {
            if let Some(outcome) = outcome.as_ref() {
                return Some(outcome.clone());
            }
            let remaining = deadline.checked_duration_since(Instant::now())?;
            outcome = self
                .done
                .wait_timeout(outcome, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

/// A caller's view of a refresh.
///
/// Dropping the handle abandons the wait; the load itself keeps running for
/// everyone else attached to it.
pub struct RefreshHandle {
    flight: Arc<Flight>,
}

impl RefreshHandle {
    /// Blocks until the load finishes.
    pub fn wait(self) -> Result<()> {
        self.flight.wait().map(|_| ())
    }

    /// `None` if the load is still running after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<()>> {
        self.flight
            .wait_timeout(timeout)
            .map(|outcome| outcome.map(|_| ()))
    }

    pub fn is_finished(&self) -> bool {
        self.flight.lock().is_some()
    }

    fn snapshot(self) -> Outcome {
        self.flight.wait()
    }
}

impl fmt::Debug for RefreshHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshHandle")
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// State shared with jobs on the worker thread.
struct Shared {
    source: Arc<dyn MetadataSource>,
    store: Arc<dyn PlaylistStore>,
    cache: CatalogCache,
    in_flight: Mutex<Option<Arc<Flight>>>,
}

impl Shared {
    fn in_flight(&self) -> MutexGuard<'_, Option<Arc<Flight>>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load(&self) -> Result<Snapshot> {
        let tracks = self
            .source
            .load_all_tracks()
            .map_err(|err| CatalogError::io(&err))?;
        let playlists = self.store.list_with_entries()?;
        Ok(cache::build(tracks, playlists))
    }

    fn run_refresh(&self, flight: &Arc<Flight>) {
        let started = Instant::now();
        let ticket = self.cache.begin_load();

        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| self.load())) {
            Ok(Ok(snapshot)) => Ok(self.cache.swap_loaded(snapshot, ticket)),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(CatalogError::Io("catalog load panicked".to_string())),
        };

        match &outcome {
            Ok(snapshot) => info!(
                "Catalog generation {} ready: {} tracks in {:?}",
                snapshot.generation(),
                snapshot.library().len(),
                started.elapsed()
            ),
            Err(err) if self.cache.current_snapshot().is_some() => {
                warn!("Catalog refresh failed, keeping previous snapshot: {err}");
                self.cache.invalidate();
            }
            Err(err) => error!("Initial catalog load failed: {err}"),
        }

        self.finish(flight, outcome);
    }

    fn finish(&self, flight: &Arc<Flight>, outcome: Outcome) {
        {
            let mut in_flight = self.in_flight();
            if in_flight.as_ref().is_some_and(|f| Arc::ptr_eq(f, flight)) {
                *in_flight = None;
            }
        }
        flight.complete(outcome);
    }
}

/// Resolves browse requests and playlist edits against the catalog.
pub struct CatalogRepository {
    shared: Arc<Shared>,
    policy: StalePolicy,
    /// Serializes read-modify-write sequences against the store.
    edits: Mutex<()>,
    worker: RefreshWorker,
}

impl CatalogRepository {
    /// Builds an empty repository. Nothing is loaded until the first read or
    /// [`refresh`](Self::refresh).
    pub fn new(
        source: Arc<dyn MetadataSource>,
        store: Arc<dyn PlaylistStore>,
        policy: StalePolicy,
    ) -> anyhow::Result<Self> {
        use anyhow::Context;

        let worker =
            RefreshWorker::spawn("catalog-refresh").context("Failed to spawn refresh worker")?;
        Ok(Self {
            shared: Arc::new(Shared {
                source,
                store,
                cache: CatalogCache::new(),
                in_flight: Mutex::new(None),
            }),
            policy,
            edits: Mutex::new(()),
            worker,
        })
    }

    pub fn policy(&self) -> StalePolicy {
        self.policy
    }

    pub fn state(&self) -> CacheState {
        if self.shared.in_flight().is_some() {
            CacheState::Loading
        } else {
            self.shared.cache.state()
        }
    }

    /// Starts a load, or attaches to the one already running.
    pub fn begin_refresh(&self) -> RefreshHandle {
        let mut in_flight = self.shared.in_flight();
        if let Some(flight) = in_flight.as_ref() {
            debug!("Attaching to in-flight catalog load");
            return RefreshHandle {
                flight: Arc::clone(flight),
            };
        }

        let flight = Arc::new(Flight::default());
        *in_flight = Some(Arc::clone(&flight));
        drop(in_flight);

        let shared = Arc::clone(&self.shared);
        let job_flight = Arc::clone(&flight);
        debug!("Starting catalog load");
        if !self.worker.submit(move || shared.run_refresh(&job_flight)) {
            self.shared.finish(
                &flight,
                Err(CatalogError::Io("refresh worker is not running".to_string())),
            );
        }
        RefreshHandle { flight }
    }

    /// Rebuilds the catalog and waits for the result.
    pub fn refresh(&self) -> Result<()> {
        self.begin_refresh().wait()
    }

    /// Marks the catalog stale. The next read refreshes it.
    pub fn invalidate(&self) {
        self.shared.cache.invalidate();
    }

    /// Snapshot to serve a read from, loading or refreshing as needed.
    pub fn snapshot(&self) -> Result<Arc<Snapshot>> {
        let (current, stale) = self.shared.cache.read();
        match current {
            None => self.begin_refresh().snapshot(),
            Some(snapshot) if !stale => Ok(snapshot),
            Some(snapshot) => match self.policy {
                StalePolicy::ServeStale => {
                    drop(self.begin_refresh());
                    Ok(snapshot)
                }
                StalePolicy::Block => match self.begin_refresh().snapshot() {
                    Ok(fresh) => Ok(fresh),
                    Err(err) => {
                        debug!("Serving stale snapshot after failed refresh: {err}");
                        Ok(snapshot)
                    }
                },
            },
        }
    }

    /// The four top-level nodes.
    pub fn roots(&self) -> Vec<BrowseItem> {
        Root::ALL.into_iter().map(BrowseItem::root).collect()
    }

    /// Children of the node `id`, in browse order.
    pub fn get_children(&self, id: &str) -> Result<Vec<BrowseItem>> {
        let id = decode(id)?;
        self.children(id)
    }

    fn children(&self, id: BrowseId) -> Result<Vec<BrowseItem>> {
        if id.leaf.is_some() {
            return Err(CatalogError::NotFound(format!("{id} has no children")));
        }
        let snapshot = self.snapshot()?;
        let not_found = || CatalogError::NotFound(id.to_string());

        let items: Vec<BrowseItem> = match (id.root, id.category) {
            (Root::Music, _) => snapshot
                .tracks()
                .map(|track| BrowseItem::track(track, Root::Music, None))
                .collect(),
            (Root::Albums, None) => snapshot.albums().iter().map(BrowseItem::album).collect(),
            (Root::Artists, None) => snapshot.artists().iter().map(BrowseItem::artist).collect(),
            (Root::Playlists, None) => snapshot
                .playlists()
                .into_iter()
                .map(|playlist| BrowseItem::playlist(playlist, &snapshot))
                .collect(),
            (Root::Albums, Some(album)) => snapshot
                .album_tracks(AlbumId(album))
                .ok_or_else(not_found)?
                .map(|track| BrowseItem::track(track, Root::Albums, Some(album)))
                .collect(),
            (Root::Artists, Some(artist)) => snapshot
                .artist_tracks(ArtistId(artist))
                .ok_or_else(not_found)?
                .map(|track| BrowseItem::track(track, Root::Artists, Some(artist)))
                .collect(),
            (Root::Playlists, Some(playlist)) => snapshot
                .playlist_tracks(PlaylistId(playlist))
                .ok_or_else(not_found)?
                .map(|track| BrowseItem::track(track, Root::Playlists, Some(playlist)))
                .collect(),
        };
        Ok(items)
    }

    /// The node `id` itself: a track for leaf identifiers, a summary for
    /// category identifiers, the root node otherwise.
    pub fn get_item(&self, id: &str) -> Result<BrowseItem> {
        let id = decode(id)?;
        let snapshot = self.snapshot()?;
        let not_found = || CatalogError::NotFound(id.to_string());

        match (id.root, id.category, id.leaf) {
            (root, None, None) => Ok(BrowseItem::root(root)),
            (root, category, Some(leaf)) => {
                let track = snapshot.track(TrackId(leaf)).ok_or_else(not_found)?;
                let member = match (root, category) {
                    (Root::Music, _) => true,
                    (Root::Albums, Some(album)) => track.album_id == AlbumId(album),
                    (Root::Artists, Some(artist)) => track.artist_id == ArtistId(artist),
                    (Root::Playlists, Some(playlist)) => snapshot
                        .playlist(PlaylistId(playlist))
                        .is_some_and(|p| p.track_ids().any(|t| t == track.id)),
                    (_, None) => false,
                };
                if !member {
                    return Err(not_found());
                }
                Ok(BrowseItem::track(track, root, category))
            }
            (Root::Music, Some(_), None) => Err(not_found()),
            (Root::Albums, Some(album), None) => snapshot
                .album(AlbumId(album))
                .map(BrowseItem::album)
                .ok_or_else(not_found),
            (Root::Artists, Some(artist), None) => snapshot
                .artist(ArtistId(artist))
                .map(BrowseItem::artist)
                .ok_or_else(not_found),
            (Root::Playlists, Some(playlist), None) => snapshot
                .playlist(PlaylistId(playlist))
                .map(|p| BrowseItem::playlist(p, &snapshot))
                .ok_or_else(not_found),
        }
    }

    /// Playlist summaries, same as browsing `PLAYLISTS`.
    pub fn list_playlists(&self) -> Result<Vec<BrowseItem>> {
        self.children(BrowseId::root(Root::Playlists))
    }

    /// Creates a playlist holding `track_ids` in the given order.
    pub fn create_playlist(&self, name: &str, track_ids: &[TrackId]) -> Result<PlaylistId> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CatalogError::Validation("playlist name is empty".to_string()));
        }
        if track_ids.is_empty() {
            return Err(CatalogError::Validation(format!(
                "playlist `{name}` needs at least one track"
            )));
        }
        self.check_tracks(track_ids)?;

        let id = {
            let _edit = self.lock_edits();
            let id = self.shared.store.insert_playlist(&Playlist::new(name))?;
            if let Err(err) = self
                .shared
                .store
                .insert_entries(&entries_from(id, 0, track_ids))
            {
                // Do not leave an empty playlist behind.
                if let Err(cleanup) = self.shared.store.delete_playlist(id) {
                    warn!("Failed to remove half-created playlist {id}: {cleanup}");
                }
                return Err(err.into());
            }
            id
        };

        info!("Created playlist `{name}` ({id}) with {} tracks", track_ids.len());
        self.sync_playlists();
        Ok(id)
    }

    pub fn delete_playlist(&self, id: PlaylistId) -> Result<()> {
        {
            let _edit = self.lock_edits();
            self.shared.store.delete_playlist(id)?;
        }
        info!("Deleted playlist {id}");
        self.sync_playlists();
        Ok(())
    }

    /// Appends `track_ids` after the playlist's last entry.
    pub fn add_tracks(&self, id: PlaylistId, track_ids: &[TrackId]) -> Result<()> {
        self.check_tracks(track_ids)?;
        {
            let _edit = self.lock_edits();
            let entries = self.shared.store.list_entries(id)?;
            let next = next_position(&entries);
            if !track_ids.is_empty() {
                self.shared
                    .store
                    .insert_entries(&entries_from(id, next, track_ids))?;
            }
        }
        debug!("Added {} tracks to playlist {id}", track_ids.len());
        self.sync_playlists();
        Ok(())
    }

    /// Removes every entry of each listed track. Returns how many entries
    /// were removed. Remaining entries keep their positions.
    pub fn remove_tracks(&self, id: PlaylistId, track_ids: &[TrackId]) -> Result<usize> {
        let removed = {
            let _edit = self.lock_edits();
            let wanted: HashSet<TrackId> = track_ids.iter().copied().collect();
            let doomed: Vec<_> = self
                .shared
                .store
                .list_entries(id)?
                .into_iter()
                .filter(|entry| wanted.contains(&entry.track_id))
                .collect();
            if !doomed.is_empty() {
                self.shared.store.delete_entries(&doomed)?;
            }
            doomed.len()
        };
        debug!("Removed {removed} entries from playlist {id}");
        self.sync_playlists();
        Ok(removed)
    }

    /// Records that the playlist was just played.
    pub fn mark_playlist_played(&self, id: PlaylistId) -> Result<()> {
        self.shared.store.touch_played(id, Utc::now())?;
        self.sync_playlists();
        Ok(())
    }

    /// Tracks belong to the device's media index and cannot be deleted here.
    pub fn delete_tracks(&self, _track_ids: &[TrackId]) -> Result<()> {
        Err(CatalogError::UnsupportedOperation(
            "deleting tracks from the media index",
        ))
    }

    fn lock_edits(&self) -> MutexGuard<'_, ()> {
        self.edits.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_tracks(&self, track_ids: &[TrackId]) -> Result<()> {
        let snapshot = self.snapshot()?;
        match track_ids.iter().find(|id| snapshot.track(**id).is_none()) {
            Some(missing) => Err(CatalogError::NotFound(format!("track {missing}"))),
            None => Ok(()),
        }
    }

    /// Publishes the store's playlists next to the current library.
    fn sync_playlists(&self) {
        let cache = &self.shared.cache;
        let seq = cache.next_playlist_seq();
        match self.shared.store.list_with_entries() {
            Ok(playlists) => {
                cache.swap_playlists(cache::playlist_map(playlists), seq);
            }
            Err(err) => {
                warn!("Could not re-read playlists, invalidating catalog: {err:#}");
                cache.invalidate();
            }
        }
    }
}

impl fmt::Debug for CatalogRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogRepository")
            .field("policy", &self.policy)
            .field("state", &self.state())
            .finish()
    }
}
