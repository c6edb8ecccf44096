//! Catalog service façade and bootstrap helpers.
//!
//! This crate wires the runtime configuration into the catalog library: it
//! opens the SQLite pool, builds the repositories and the membership service,
//! and announces every committed change to an album's track order on the
//! event bus.
//!
//! ```no_run
//! # async fn example() -> core_service::Result<()> {
//! use core_service::library::models::{MembershipRequest, TrackRef};
//! use core_service::runtime::config::CatalogConfig;
//!
//! let config = CatalogConfig::builder()
//!     .database_path("/path/to/catalog.db")
//!     .build()?;
//! let catalog = core_service::bootstrap(config).await?;
//!
//! let artist = catalog.create_artist("Nina Simone").await?;
//! let album = catalog.create_album("Pastel Blues", &artist.id, Some(1965)).await?;
//! catalog
//!     .insert(&album.id, MembershipRequest::append(TrackRef::new_track("Be My Husband")))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod error;

pub use core_library as library;
pub use core_runtime as runtime;
pub use error::{CoreError, Result};

use std::sync::Arc;

use core_library::db::{create_pool, DatabaseConfig};
use core_library::models::{
    Album, AlbumTrack, AlbumTrackEntry, Artist, MembershipRequest, Track,
};
use core_library::repositories::{
    AlbumRepository, ArtistRepository, SqliteAlbumRepository, SqliteArtistRepository,
    SqliteOrderStore, SqliteTrackRepository, TrackRepository,
};
use core_library::{LibraryError, MembershipOptions, MembershipService};
use core_runtime::config::{CatalogConfig, DatabaseLocation};
use core_runtime::events::{CoreEvent, EventBus, EventSeverity, EventStream, LibraryEvent, Receiver};
use sqlx::SqlitePool;
use tracing::{debug, info, instrument};

/// Primary façade exposed to host applications.
///
/// Cloning is cheap; clones share the repositories, the album locks and the
/// event bus.
#[derive(Clone)]
pub struct CatalogService {
    artists: Arc<dyn ArtistRepository>,
    albums: Arc<dyn AlbumRepository>,
    tracks: Arc<dyn TrackRepository>,
    membership: Arc<MembershipService>,
    events: EventBus,
}

impl CatalogService {
    /// Build the service over an already migrated pool.
    pub fn new(pool: SqlitePool, options: MembershipOptions, events: EventBus) -> Self {
        let albums: Arc<dyn AlbumRepository> = Arc::new(SqliteAlbumRepository::new(pool.clone()));
        let tracks: Arc<dyn TrackRepository> = Arc::new(SqliteTrackRepository::new(pool.clone()));
        let membership = MembershipService::new(
            Arc::clone(&albums),
            Arc::clone(&tracks),
            Arc::new(SqliteOrderStore::new(pool.clone())),
            options,
        );

        Self {
            artists: Arc::new(SqliteArtistRepository::new(pool)),
            albums,
            tracks,
            membership: Arc::new(membership),
            events,
        }
    }

    pub fn artists(&self) -> Arc<dyn ArtistRepository> {
        Arc::clone(&self.artists)
    }

    pub fn albums(&self) -> Arc<dyn AlbumRepository> {
        Arc::clone(&self.albums)
    }

    pub fn tracks(&self) -> Arc<dyn TrackRepository> {
        Arc::clone(&self.tracks)
    }

    /// Direct access to the ordering engine; bypasses event publication.
    pub fn membership(&self) -> Arc<MembershipService> {
        Arc::clone(&self.membership)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Subscribe to library events published after each committed change.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.events.subscribe()
    }

    /// Events that concern one album's track order.
    ///
    /// Purges span several albums and are delivered when the album is among
    /// the compacted ones.
    pub fn album_events(&self, album_id: &str) -> EventStream {
        let album_id = album_id.to_string();
        EventStream::new(self.events.subscribe()).filter(move |event| match event {
            CoreEvent::Library(LibraryEvent::TrackPurged { album_ids, .. }) => {
                album_ids.contains(&album_id)
            }
            _ => event.album_id() == Some(album_id.as_str()),
        })
    }

    // ------------------------------------------------------------------
    // Entities
    // ------------------------------------------------------------------

    pub async fn create_artist(&self, name: &str) -> Result<Artist> {
        let artist = Artist::new(name.to_string());
        self.artists.insert(&artist).await?;
        Ok(artist)
    }

    pub async fn create_album(
        &self,
        name: &str,
        artist_id: &str,
        year: Option<i32>,
    ) -> Result<Album> {
        self.require_artist(artist_id).await?;

        let mut album = Album::new(name.to_string(), artist_id.to_string());
        if let Some(year) = year {
            album = album.with_year(year);
        }
        self.albums.insert(&album).await?;
        Ok(album)
    }

    pub async fn create_track(&self, name: &str, artist_id: &str) -> Result<Track> {
        self.require_artist(artist_id).await?;

        let track = Track::new(name.to_string(), artist_id.to_string());
        self.tracks.insert(&track).await?;
        Ok(track)
    }

    async fn require_artist(&self, artist_id: &str) -> Result<()> {
        if self.artists.exists(artist_id).await? {
            Ok(())
        } else {
            Err(LibraryError::NotFound {
                entity_type: "Artist".to_string(),
                id: artist_id.to_string(),
            }
            .into())
        }
    }

    // ------------------------------------------------------------------
    // Album track order
    // ------------------------------------------------------------------

    #[instrument(skip(self, request), fields(album_id = %album_id))]
    pub async fn insert(&self, album_id: &str, request: MembershipRequest) -> Result<AlbumTrack> {
        let row = self.membership.insert(album_id, request).await?;
        self.publish(LibraryEvent::TracksAdded {
            album_id: album_id.to_string(),
            positions: vec![row.position],
        });
        Ok(row)
    }

    #[instrument(skip(self, requests), fields(album_id = %album_id))]
    pub async fn bulk_insert(
        &self,
        album_id: &str,
        requests: Vec<MembershipRequest>,
    ) -> Result<Vec<AlbumTrack>> {
        let rows = self.membership.bulk_insert(album_id, requests).await?;
        if !rows.is_empty() {
            self.publish(LibraryEvent::TracksAdded {
                album_id: album_id.to_string(),
                positions: rows.iter().map(|row| row.position).collect(),
            });
        }
        Ok(rows)
    }

    #[instrument(skip(self), fields(album_id = %album_id))]
    pub async fn remove(&self, album_id: &str, position: i64) -> Result<()> {
        self.membership.remove(album_id, position).await?;
        self.publish(LibraryEvent::TrackRemoved {
            album_id: album_id.to_string(),
            position,
        });
        Ok(())
    }

    #[instrument(skip(self), fields(album_id = %album_id))]
    pub async fn move_track(&self, album_id: &str, from: i64, to: i64) -> Result<AlbumTrack> {
        let row = self.membership.move_track(album_id, from, to).await?;
        if from != to {
            self.publish(LibraryEvent::TrackMoved {
                album_id: album_id.to_string(),
                from,
                to,
            });
        }
        Ok(row)
    }

    #[instrument(skip(self), fields(track_id = %track_id))]
    pub async fn purge_track(&self, track_id: &str) -> Result<Vec<String>> {
        let album_ids = self.membership.purge_track(track_id).await?;
        self.publish(LibraryEvent::TrackPurged {
            track_id: track_id.to_string(),
            album_ids: album_ids.clone(),
        });
        Ok(album_ids)
    }

    pub async fn list(&self, album_id: &str) -> Result<Vec<AlbumTrackEntry>> {
        Ok(self.membership.list(album_id).await?)
    }

    pub async fn get(&self, album_id: &str, position: i64) -> Result<AlbumTrackEntry> {
        Ok(self.membership.get(album_id, position).await?)
    }

    pub async fn count(&self, album_id: &str) -> Result<i64> {
        Ok(self.membership.count(album_id).await?)
    }

    /// Albums a track is placed on
    pub async fn albums_for_track(&self, track_id: &str) -> Result<Vec<String>> {
        Ok(self.membership.albums_for_track(track_id).await?)
    }

    fn publish(&self, event: LibraryEvent) {
        let event = CoreEvent::Library(event);
        match event.severity() {
            EventSeverity::Info => info!(event = event.description(), "Publishing library event"),
            EventSeverity::Debug => debug!(event = event.description(), "Publishing library event"),
        }
        // No subscribers is fine; the change is already committed.
        let _ = self.events.emit(event);
    }
}

/// Open the catalog described by `config`.
///
/// Creates the pool (running migrations) and wires the membership service
/// with the configured retry policy. Logging is not initialised here; hosts
/// call [`runtime::logging::init_logging`] with `config.logging` once per
/// process.
pub async fn bootstrap(config: CatalogConfig) -> Result<CatalogService> {
    config.validate()?;

    let database = match &config.database {
        DatabaseLocation::File(path) => DatabaseConfig::new(path.clone()),
        DatabaseLocation::InMemory => DatabaseConfig::in_memory(),
    }
    .max_connections(config.max_connections)
    .acquire_timeout(config.acquire_timeout)
    .busy_timeout(config.busy_timeout);

    let pool = create_pool(database)
        .await
        .map_err(|err| CoreError::InitializationFailed(err.to_string()))?;

    let options = MembershipOptions {
        max_conflict_retries: config.max_conflict_retries,
        retry_backoff: config.retry_backoff,
    };

    info!(
        in_memory = config.database.is_in_memory(),
        max_conflict_retries = options.max_conflict_retries,
        "Catalog service ready"
    );

    Ok(CatalogService::new(
        pool,
        options,
        EventBus::new(config.event_buffer_size),
    ))
}
