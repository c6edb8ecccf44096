//! # Album Membership Service
//!
//! The only write path for album track positions. Every operation runs one
//! load-plan-apply cycle:
//!
//! 1. take the album's in-process lock ([`AlbumLocks`])
//! 2. read a versioned snapshot ([`OrderStore::load_positions`])
//! 3. compute the plan ([`crate::sequencer`])
//! 4. apply it in one transaction ([`OrderStore::apply_plan`])
//!
//! A [`LibraryError::ConcurrentOrderConflict`] from step 4 means another
//! writer (another process or service instance) committed first; the whole
//! cycle is retried up to [`MembershipOptions::max_conflict_retries`] times.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_library::membership::{MembershipOptions, MembershipService};
//! use core_library::models::{MembershipRequest, TrackRef};
//!
//! let service = MembershipService::sqlite(pool, MembershipOptions::default());
//! let row = service
//!     .insert(&album_id, MembershipRequest::at(TrackRef::existing(track_id), 2))
//!     .await?;
//! ```

use crate::error::{LibraryError, Result};
use crate::locks::AlbumLocks;
use crate::models::{Album, AlbumTrack, AlbumTrackEntry, MembershipRequest, Track, TrackRef};
use crate::repositories::{
    AlbumRepository, NewMembership, OrderStore, SqliteAlbumRepository, SqliteOrderStore,
    SqliteTrackRepository, TrackRepository,
};
use crate::sequencer;
use sqlx::SqlitePool;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Retry behaviour for conflicting writers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipOptions {
    /// Extra attempts after the first conflict before giving up
    pub max_conflict_retries: u32,
    /// Base backoff; attempt `n` sleeps `n * retry_backoff`
    pub retry_backoff: Duration,
}

impl Default for MembershipOptions {
    fn default() -> Self {
        Self {
            max_conflict_retries: 3,
            retry_backoff: Duration::from_millis(10),
        }
    }
}

/// Row resolved before the cycle starts, reused across retries
#[derive(Debug, Clone)]
struct PendingRow {
    track_id: String,
    new_track: Option<Track>,
    position: Option<i64>,
}

/// Insert, remove and reorder tracks of an album while keeping positions dense
pub struct MembershipService {
    albums: Arc<dyn AlbumRepository>,
    tracks: Arc<dyn TrackRepository>,
    store: Arc<dyn OrderStore>,
    locks: AlbumLocks,
    options: MembershipOptions,
}

impl MembershipService {
    pub fn new(
        albums: Arc<dyn AlbumRepository>,
        tracks: Arc<dyn TrackRepository>,
        store: Arc<dyn OrderStore>,
        options: MembershipOptions,
    ) -> Self {
        Self {
            albums,
            tracks,
            store,
            locks: AlbumLocks::new(),
            options,
        }
    }

    /// Service backed by the SQLite repositories of one pool
    pub fn sqlite(pool: SqlitePool, options: MembershipOptions) -> Self {
        Self::new(
            Arc::new(SqliteAlbumRepository::new(pool.clone())),
            Arc::new(SqliteTrackRepository::new(pool.clone())),
            Arc::new(SqliteOrderStore::new(pool)),
            options,
        )
    }

    pub fn options(&self) -> &MembershipOptions {
        &self.options
    }

    /// Insert one track, appending when the request has no position
    ///
    /// # Errors
    /// - `NotFound` if the album or the referenced track does not exist
    /// - `InvalidPosition` / `PositionOutOfRange` for a position outside
    ///   `1..=N+1`
    /// - `InvalidInput` for an empty inline track name
    pub async fn insert(&self, album_id: &str, request: MembershipRequest) -> Result<AlbumTrack> {
        let mut rows = self.bulk_insert(album_id, vec![request]).await?;
        rows.pop()
            .ok_or_else(|| LibraryError::not_found("AlbumTrack", album_id))
    }

    /// Insert several tracks in one transaction
    ///
    /// Either every request carries a position or none does. Returned rows
    /// follow request order and carry their final positions.
    #[instrument(skip(self, requests), fields(album_id = %album_id, items = requests.len()))]
    pub async fn bulk_insert(
        &self,
        album_id: &str,
        requests: Vec<MembershipRequest>,
    ) -> Result<Vec<AlbumTrack>> {
        let requested: Vec<Option<i64>> = requests.iter().map(|r| r.position).collect();
        sequencer::check_bulk_positions(&requested)?;

        let album = self.require_album(album_id).await?;
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        let mut pending = Vec::with_capacity(requests.len());
        for request in requests {
            pending.push(self.resolve(&album, request).await?);
        }

        let pending = &pending;
        let rows = self
            .with_retries(album_id, move || self.insert_attempt(album_id, pending))
            .await?;

        info!(
            album_id = %album_id,
            positions = ?rows.iter().map(|r| r.position).collect::<Vec<_>>(),
            "Inserted album tracks"
        );
        Ok(rows)
    }

    /// Remove the track at `position`, compacting the rows after it
    #[instrument(skip(self), fields(album_id = %album_id))]
    pub async fn remove(&self, album_id: &str, position: i64) -> Result<()> {
        self.with_retries(album_id, move || self.remove_attempt(album_id, position))
            .await?;

        info!(album_id = %album_id, position, "Removed album track");
        Ok(())
    }

    /// Move the track at `from` to `to` (both within `1..=N`)
    #[instrument(skip(self), fields(album_id = %album_id))]
    pub async fn move_track(&self, album_id: &str, from: i64, to: i64) -> Result<AlbumTrack> {
        let row = self
            .with_retries(album_id, move || self.move_attempt(album_id, from, to))
            .await?;

        info!(album_id = %album_id, from, to, "Moved album track");
        Ok(row)
    }

    /// Album tracks ascending by position
    pub async fn list(&self, album_id: &str) -> Result<Vec<AlbumTrackEntry>> {
        self.require_album(album_id).await?;
        self.store.list_entries(album_id).await
    }

    /// Album track at one position
    pub async fn get(&self, album_id: &str, position: i64) -> Result<AlbumTrackEntry> {
        self.list(album_id)
            .await?
            .into_iter()
            .find(|entry| entry.position == position)
            .ok_or_else(|| LibraryError::not_found("AlbumTrack", format!("position {}", position)))
    }

    /// Number of tracks on the album
    pub async fn count(&self, album_id: &str) -> Result<i64> {
        self.require_album(album_id).await?;
        self.store.count(album_id).await
    }

    /// Take a track off every album it is on, then delete it
    ///
    /// Each album is compacted in its own transaction. A writer can place the
    /// track on another album between the last compaction and the delete; the
    /// delete then fails with `TrackInUse` and the albums are read and
    /// compacted again, up to `max_conflict_retries` extra rounds.
    ///
    /// # Returns
    /// Ids of the albums that lost the track.
    #[instrument(skip(self), fields(track_id = %track_id))]
    pub async fn purge_track(&self, track_id: &str) -> Result<Vec<String>> {
        if !self.tracks.exists(track_id).await? {
            return Err(LibraryError::not_found("Track", track_id));
        }

        let mut affected: Vec<String> = Vec::new();
        let mut round: u32 = 0;
        loop {
            round += 1;
            for album_id in self.store.album_ids_for_track(track_id).await? {
                let album = album_id.as_str();
                let removed = self
                    .with_retries(album, move || self.purge_attempt(album, track_id))
                    .await?;
                if removed > 0 {
                    debug!(album_id = %album_id, removed, "Compacted album after purge");
                    if !affected.contains(&album_id) {
                        affected.push(album_id);
                    }
                }
            }

            match self.tracks.delete(track_id).await {
                Ok(_) => break,
                Err(LibraryError::TrackInUse { .. })
                    if round <= self.options.max_conflict_retries =>
                {
                    warn!(track_id = %track_id, round, "Track placed again during purge, compacting again");
                    tokio::time::sleep(self.options.retry_backoff * round).await;
                }
                Err(e) => return Err(e),
            }
        }

        info!(track_id = %track_id, albums = affected.len(), "Purged track");
        Ok(affected)
    }

    /// Ids of the albums a track is placed on
    pub async fn albums_for_track(&self, track_id: &str) -> Result<Vec<String>> {
        if !self.tracks.exists(track_id).await? {
            return Err(LibraryError::not_found("Track", track_id));
        }
        self.store.album_ids_for_track(track_id).await
    }

    async fn require_album(&self, album_id: &str) -> Result<Album> {
        self.albums
            .find_by_id(album_id)
            .await?
            .ok_or_else(|| LibraryError::not_found("Album", album_id))
    }

    async fn resolve(&self, album: &Album, request: MembershipRequest) -> Result<PendingRow> {
        match request.track {
            TrackRef::Existing(track_id) => {
                if !self.tracks.exists(&track_id).await? {
                    return Err(LibraryError::not_found("Track", track_id));
                }
                Ok(PendingRow {
                    track_id,
                    new_track: None,
                    position: request.position,
                })
            }
            TrackRef::New { name } => {
                let track = Track::new(name, album.artist_id.clone());
                track
                    .validate()
                    .map_err(|e| LibraryError::invalid_input("Track", e))?;
                Ok(PendingRow {
                    track_id: track.id.clone(),
                    new_track: Some(track),
                    position: request.position,
                })
            }
        }
    }

    /// Run one load-plan-apply cycle, retrying it while it conflicts
    async fn with_retries<T, F, Fut>(&self, album_id: &str, mut attempt_fn: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match attempt_fn().await {
                Err(e) if e.is_conflict() => {
                    if attempt > self.options.max_conflict_retries {
                        warn!(album_id = %album_id, attempts = attempt, "Giving up on conflicting order change");
                        return Err(LibraryError::ConcurrentOrderConflict {
                            album_id: album_id.to_string(),
                            attempts: attempt,
                        });
                    }
                    warn!(album_id = %album_id, attempt, "Order conflict, retrying");
                    tokio::time::sleep(self.options.retry_backoff * attempt).await;
                }
                result => return result,
            }
        }
    }

    async fn insert_attempt(&self, album_id: &str, pending: &[PendingRow]) -> Result<Vec<AlbumTrack>> {
        let _lock = self.locks.acquire(album_id).await;
        let snapshot = self.store.load_positions(album_id).await?;

        let requested: Vec<Option<i64>> = pending.iter().map(|p| p.position).collect();
        let plan = sequencer::plan_bulk_insert(&snapshot.members, &requested)?;
        debug!(
            album_id = %album_id,
            version = snapshot.version,
            shifts = plan.shifts.len(),
            "Planned insert"
        );

        let rows: Vec<NewMembership> = pending
            .iter()
            .zip(&plan.new_positions)
            .map(|(row, &position)| NewMembership {
                membership: AlbumTrack::new(album_id, &row.track_id, position),
                new_track: row.new_track.clone(),
            })
            .collect();

        self.store
            .apply_plan(album_id, snapshot.version, &plan, &rows)
            .await
    }

    async fn remove_attempt(&self, album_id: &str, position: i64) -> Result<()> {
        let _lock = self.locks.acquire(album_id).await;
        let snapshot = self.store.load_positions(album_id).await?;

        let plan = sequencer::plan_remove(&snapshot.members, position)?;
        debug!(album_id = %album_id, version = snapshot.version, shifts = plan.shifts.len(), "Planned remove");

        self.store
            .apply_plan(album_id, snapshot.version, &plan, &[])
            .await?;
        Ok(())
    }

    async fn move_attempt(&self, album_id: &str, from: i64, to: i64) -> Result<AlbumTrack> {
        let _lock = self.locks.acquire(album_id).await;
        let snapshot = self.store.load_positions(album_id).await?;

        let plan = sequencer::plan_move(&snapshot.members, from, to)?;
        if plan.is_noop() {
            debug!(album_id = %album_id, position = from, "Move onto same position");
            return self
                .store
                .find_by_position(album_id, from)
                .await?
                .ok_or_else(|| LibraryError::not_found("AlbumTrack", format!("position {}", from)));
        }
        debug!(album_id = %album_id, version = snapshot.version, shifts = plan.shifts.len(), "Planned move");

        self.store
            .apply_plan(album_id, snapshot.version, &plan, &[])
            .await?
            .pop()
            .ok_or_else(|| LibraryError::not_found("AlbumTrack", format!("position {}", to)))
    }

    async fn purge_attempt(&self, album_id: &str, track_id: &str) -> Result<usize> {
        let _lock = self.locks.acquire(album_id).await;
        let snapshot = match self.store.load_positions(album_id).await {
            Ok(snapshot) => snapshot,
            // Album deleted in the meantime: its memberships went with it
            Err(LibraryError::NotFound { .. }) => return Ok(0),
            Err(e) => return Err(e),
        };

        let positions: Vec<i64> = snapshot
            .members
            .iter()
            .filter(|m| m.track_id == track_id)
            .map(|m| m.position)
            .collect();
        if positions.is_empty() {
            return Ok(0);
        }

        let plan = sequencer::plan_remove_many(&snapshot.members, &positions)?;
        self.store
            .apply_plan(album_id, snapshot.version, &plan, &[])
            .await?;
        Ok(positions.len())
    }
}
