//! Artist repository trait and implementation

use crate::error::{LibraryError, Result};
use crate::models::Artist;
use crate::repositories::duplicate_as_invalid;
use async_trait::async_trait;
use sqlx::{query, query_as, SqlitePool};

/// Artist repository interface for data access operations
#[async_trait]
pub trait ArtistRepository: Send + Sync {
    /// Find an artist by its ID
    ///
    /// # Returns
    /// - `Ok(Some(artist))` if found
    /// - `Ok(None)` if not found
    /// - `Err` if database error occurs
    async fn find_by_id(&self, id: &str) -> Result<Option<Artist>>;

    /// Insert a new artist
    ///
    /// # Errors
    /// Returns error if:
    /// - Artist validation fails
    /// - Another artist already has the same name
    /// - Database error occurs
    async fn insert(&self, artist: &Artist) -> Result<()>;

    /// Update an existing artist
    async fn update(&self, artist: &Artist) -> Result<()>;

    /// Delete an artist by ID, together with its albums and tracks
    ///
    /// # Returns
    /// - `Ok(true)` if artist was deleted
    /// - `Ok(false)` if artist was not found
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Check whether an artist exists
    async fn exists(&self, id: &str) -> Result<bool>;
}

/// SQLite implementation of ArtistRepository
pub struct SqliteArtistRepository {
    pool: SqlitePool,
}

impl SqliteArtistRepository {
    /// Create a new SqliteArtistRepository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ArtistRepository for SqliteArtistRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Artist>> {
        let artist = query_as::<_, Artist>("SELECT * FROM artists WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(artist)
    }

    async fn insert(&self, artist: &Artist) -> Result<()> {
        artist
            .validate()
            .map_err(|e| LibraryError::invalid_input("Artist", e))?;

        query(
            r#"
            INSERT INTO artists (id, name, normalized_name, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&artist.id)
        .bind(artist.name.trim())
        .bind(&artist.normalized_name)
        .bind(artist.created_at)
        .bind(artist.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| duplicate_as_invalid(e, "Artist", "an artist with this name already exists"))?;

        Ok(())
    }

    async fn update(&self, artist: &Artist) -> Result<()> {
        artist
            .validate()
            .map_err(|e| LibraryError::invalid_input("Artist", e))?;

        let result = query(
            r#"
            UPDATE artists
            SET name = ?, normalized_name = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(artist.name.trim())
        .bind(&artist.normalized_name)
        .bind(artist.updated_at)
        .bind(&artist.id)
        .execute(&self.pool)
        .await
        .map_err(|e| duplicate_as_invalid(e, "Artist", "an artist with this name already exists"))?;

        if result.rows_affected() == 0 {
            return Err(LibraryError::not_found("Artist", artist.id.clone()));
        }

        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = query("DELETE FROM artists WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        let row: Option<(i64,)> = query_as("SELECT 1 FROM artists WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    async fn setup_test_pool() -> SqlitePool {
        create_test_pool().await.unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_find_artist() {
        let pool = setup_test_pool().await;
        let repo = SqliteArtistRepository::new(pool);

        let artist = Artist::new("  Miles Davis ".to_string());
        repo.insert(&artist).await.unwrap();

        let found = repo.find_by_id(&artist.id).await.unwrap().unwrap();
        assert_eq!(found.name, "Miles Davis");
        assert!(repo.exists(&artist.id).await.unwrap());
        assert!(!repo.exists("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let pool = setup_test_pool().await;
        let repo = SqliteArtistRepository::new(pool);

        repo.insert(&Artist::new("Björk".to_string())).await.unwrap();
        let result = repo.insert(&Artist::new("björk ".to_string())).await;

        assert!(matches!(result, Err(LibraryError::InvalidInput { .. })));
    }

    #[tokio::test]
    async fn test_update_and_delete_artist() {
        let pool = setup_test_pool().await;
        let repo = SqliteArtistRepository::new(pool);

        let mut artist = Artist::new("Prince".to_string());
        repo.insert(&artist).await.unwrap();

        artist.name = "The Artist".to_string();
        artist.normalized_name = crate::models::normalize(&artist.name);
        repo.update(&artist).await.unwrap();
        assert_eq!(
            repo.find_by_id(&artist.id).await.unwrap().unwrap().name,
            "The Artist"
        );

        assert!(repo.delete(&artist.id).await.unwrap());
        assert!(!repo.delete(&artist.id).await.unwrap());

        let missing = repo.update(&artist).await;
        assert!(matches!(missing, Err(LibraryError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_artist_validation() {
        let pool = setup_test_pool().await;
        let repo = SqliteArtistRepository::new(pool);

        let mut artist = Artist::new("Test".to_string());
        artist.name = "   ".to_string();

        assert!(repo.insert(&artist).await.is_err());
    }
}
