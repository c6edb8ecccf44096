//! Track repository trait and implementation

use crate::error::{LibraryError, Result};
use crate::models::Track;
use async_trait::async_trait;
use sqlx::{query, query_as, SqlitePool};

/// Track repository interface for data access operations
#[async_trait]
pub trait TrackRepository: Send + Sync {
    /// Find a track by its ID
    ///
    /// # Returns
    /// - `Ok(Some(track))` if found
    /// - `Ok(None)` if not found
    /// - `Err` if database error occurs
    async fn find_by_id(&self, id: &str) -> Result<Option<Track>>;

    /// Insert a new track
    async fn insert(&self, track: &Track) -> Result<()>;

    /// Rename an existing track
    async fn update(&self, track: &Track) -> Result<()>;

    /// Delete a track by ID
    ///
    /// Fails with `TrackInUse` while the track is still placed on an album;
    /// remove it through `MembershipService::purge_track` so album orders stay
    /// dense.
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Check whether a track exists
    async fn exists(&self, id: &str) -> Result<bool>;
}

/// SQLite implementation of TrackRepository
pub struct SqliteTrackRepository {
    pool: SqlitePool,
}

impl SqliteTrackRepository {
    /// Create a new SqliteTrackRepository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TrackRepository for SqliteTrackRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Track>> {
        let track = query_as::<_, Track>("SELECT * FROM tracks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(track)
    }

    async fn insert(&self, track: &Track) -> Result<()> {
        track
            .validate()
            .map_err(|e| LibraryError::invalid_input("Track", e))?;

        query(
            r#"
            INSERT INTO tracks (id, name, normalized_name, artist_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&track.id)
        .bind(track.name.trim())
        .bind(&track.normalized_name)
        .bind(&track.artist_id)
        .bind(track.created_at)
        .bind(track.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, track: &Track) -> Result<()> {
        track
            .validate()
            .map_err(|e| LibraryError::invalid_input("Track", e))?;

        let result = query(
            "UPDATE tracks SET name = ?, normalized_name = ?, updated_at = ? WHERE id = ?",
        )
        .bind(track.name.trim())
        .bind(&track.normalized_name)
        .bind(track.updated_at)
        .bind(&track.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LibraryError::not_found("Track", track.id.clone()));
        }

        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = query("DELETE FROM tracks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                    LibraryError::TrackInUse { id: id.to_string() }
                }
                _ => LibraryError::Database(e),
            })?;

        Ok(result.rows_affected() > 0)
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        let row: Option<(i64,)> = query_as("SELECT 1 FROM tracks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.is_some())
    }
}
