//! Album repository trait and implementation

use crate::error::{LibraryError, Result};
use crate::models::Album;
use crate::repositories::duplicate_as_invalid;
use async_trait::async_trait;
use sqlx::{query, query_as, SqlitePool};

const DUPLICATE_ALBUM: &str = "this artist already has an album with this name";

/// Album repository interface for data access operations
///
/// Album attributes only; the album's track order belongs to
/// [`OrderStore`](crate::repositories::OrderStore).
#[async_trait]
pub trait AlbumRepository: Send + Sync {
    /// Find an album by its ID
    ///
    /// # Returns
    /// - `Ok(Some(album))` if found
    /// - `Ok(None)` if not found
    /// - `Err` if database error occurs
    async fn find_by_id(&self, id: &str) -> Result<Option<Album>>;

    /// Insert a new album
    ///
    /// # Errors
    /// Returns error if:
    /// - Album validation fails (name, release year)
    /// - The artist already has an album with the same name
    /// - The artist does not exist
    async fn insert(&self, album: &Album) -> Result<()>;

    /// Update name and year of an existing album
    ///
    /// The order version is left untouched.
    async fn update(&self, album: &Album) -> Result<()>;

    /// Delete an album and its whole track sequence
    ///
    /// # Returns
    /// - `Ok(true)` if album was deleted
    /// - `Ok(false)` if album was not found
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Check whether an album exists
    async fn exists(&self, id: &str) -> Result<bool>;

    /// List the albums of one artist, newest first
    async fn find_by_artist(&self, artist_id: &str) -> Result<Vec<Album>>;
}

/// SQLite implementation of AlbumRepository
pub struct SqliteAlbumRepository {
    pool: SqlitePool,
}

impl SqliteAlbumRepository {
    /// Create a new SqliteAlbumRepository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AlbumRepository for SqliteAlbumRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Album>> {
        let album = query_as::<_, Album>("SELECT * FROM albums WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(album)
    }

    async fn insert(&self, album: &Album) -> Result<()> {
        album
            .validate()
            .map_err(|e| LibraryError::invalid_input("Album", e))?;

        query(
            r#"
            INSERT INTO albums (
                id, name, normalized_name, artist_id, year,
                order_version, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&album.id)
        .bind(album.name.trim())
        .bind(&album.normalized_name)
        .bind(&album.artist_id)
        .bind(album.year)
        .bind(album.order_version)
        .bind(album.created_at)
        .bind(album.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| duplicate_as_invalid(e, "Album", DUPLICATE_ALBUM))?;

        Ok(())
    }

    async fn update(&self, album: &Album) -> Result<()> {
        album
            .validate()
            .map_err(|e| LibraryError::invalid_input("Album", e))?;

        let result = query(
            r#"
            UPDATE albums
            SET name = ?, normalized_name = ?, year = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(album.name.trim())
        .bind(&album.normalized_name)
        .bind(album.year)
        .bind(album.updated_at)
        .bind(&album.id)
        .execute(&self.pool)
        .await
        .map_err(|e| duplicate_as_invalid(e, "Album", DUPLICATE_ALBUM))?;

        if result.rows_affected() == 0 {
            return Err(LibraryError::not_found("Album", album.id.clone()));
        }

        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = query("DELETE FROM albums WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        let row: Option<(i64,)> = query_as("SELECT 1 FROM albums WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.is_some())
    }

    async fn find_by_artist(&self, artist_id: &str) -> Result<Vec<Album>> {
        let albums = query_as::<_, Album>(
            "SELECT * FROM albums WHERE artist_id = ? ORDER BY created_at DESC, name ASC",
        )
        .bind(artist_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(albums)
    }
}
