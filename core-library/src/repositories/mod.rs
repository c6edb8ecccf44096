//! # Repository Pattern Implementation
//!
//! This module provides repository traits and their SQLite implementations.
//!
//! ## Architecture
//!
//! - Traits define the interface for each repository
//! - SQLite implementations use sqlx for async database access
//! - All operations return `Result<T>` for error handling
//!
//! ## Available Repositories
//!
//! - `ArtistRepository` - Artists (unique names)
//! - `AlbumRepository` - Albums with their owning artist
//! - `TrackRepository` - Tracks with their performing artist
//! - `OrderStore` - Transactional gateway for the ordered album tracks

pub mod album;
pub mod album_track;
pub mod artist;
pub mod track;

pub use album::{AlbumRepository, SqliteAlbumRepository};
pub use album_track::{NewMembership, OrderStore, SqliteOrderStore};
pub use artist::{ArtistRepository, SqliteArtistRepository};
pub use track::{SqliteTrackRepository, TrackRepository};

use crate::error::LibraryError;

/// Map a UNIQUE constraint failure to a caller-facing validation error
pub(crate) fn duplicate_as_invalid(err: sqlx::Error, field: &str, message: &str) -> LibraryError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            LibraryError::invalid_input(field, message)
        }
        _ => LibraryError::Database(err),
    }
}
