//! Domain models for the music catalog
//!
//! This module contains the catalog entities with validation and database
//! mapping, plus the request types accepted by the album track services.

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Maximum length of any catalog name, in characters
pub const MAX_NAME_LENGTH: usize = 255;

/// Earliest accepted album release year (first recorded human voice, 1860)
pub const MIN_RELEASE_YEAR: i32 = 1860;

fn validate_name(kind: &str, name: &str) -> Result<(), String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(format!("{} name cannot be empty", kind));
    }
    if trimmed.chars().count() > MAX_NAME_LENGTH {
        return Err(format!(
            "{} name exceeds {} characters",
            kind, MAX_NAME_LENGTH
        ));
    }
    Ok(())
}

/// Normalize a name for uniqueness checks (trimmed, lowercase)
pub fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

// =============================================================================
// Catalog Entities
// =============================================================================

/// Artist owning albums and tracks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Artist {
    /// Unique identifier
    pub id: String,
    /// Artist name (unique across the catalog)
    pub name: String,
    /// Normalized name for uniqueness checks
    pub normalized_name: String,
    /// Timestamps
    pub created_at: i64,
    pub updated_at: i64,
}

impl Artist {
    /// Create a new artist, trimming surrounding whitespace from the name
    pub fn new(name: String) -> Self {
        let name = name.trim().to_string();
        let now = chrono::Utc::now().timestamp();
        Self {
            id: Uuid::new_v4().to_string(),
            normalized_name: normalize(&name),
            name,
            created_at: now,
            updated_at: now,
        }
    }

    /// Validate artist data
    pub fn validate(&self) -> Result<(), String> {
        validate_name("Artist", &self.name)
    }
}

/// Album: the ordered collection of tracks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Album {
    /// Unique identifier
    pub id: String,
    /// Album name (unique per artist)
    pub name: String,
    /// Normalized name for uniqueness checks
    pub normalized_name: String,
    /// Owning artist
    pub artist_id: String,
    /// Release year
    pub year: Option<i32>,
    /// Bumped by every committed change to the album's track order
    pub order_version: i64,
    /// Timestamps
    pub created_at: i64,
    pub updated_at: i64,
}

impl Album {
    /// Create a new album for the given artist
    pub fn new(name: String, artist_id: String) -> Self {
        let name = name.trim().to_string();
        let now = chrono::Utc::now().timestamp();
        Self {
            id: Uuid::new_v4().to_string(),
            normalized_name: normalize(&name),
            name,
            artist_id,
            year: None,
            order_version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the release year
    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    /// Validate album data
    pub fn validate(&self) -> Result<(), String> {
        validate_name("Album", &self.name)?;

        if let Some(year) = self.year {
            let current_year = chrono::Utc::now().year();
            if !(MIN_RELEASE_YEAR..=current_year).contains(&year) {
                return Err(format!(
                    "Album year {} is out of valid range {}..={}",
                    year, MIN_RELEASE_YEAR, current_year
                ));
            }
        }

        if self.order_version < 0 {
            return Err("Order version cannot be negative".to_string());
        }

        Ok(())
    }
}

/// Track that can be placed on any number of albums
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Track {
    /// Unique identifier
    pub id: String,
    /// Track name
    pub name: String,
    /// Normalized name
    pub normalized_name: String,
    /// Performing artist
    pub artist_id: String,
    /// Timestamps
    pub created_at: i64,
    pub updated_at: i64,
}

impl Track {
    /// Create a new track for the given artist
    pub fn new(name: String, artist_id: String) -> Self {
        let name = name.trim().to_string();
        let now = chrono::Utc::now().timestamp();
        Self {
            id: Uuid::new_v4().to_string(),
            normalized_name: normalize(&name),
            name,
            artist_id,
            created_at: now,
            updated_at: now,
        }
    }

    /// Validate track data
    pub fn validate(&self) -> Result<(), String> {
        validate_name("Track", &self.name)
    }
}

/// Ordered membership of a track in an album
///
/// `position` is 1-based and, for every album, the committed positions form
/// the dense sequence `1..=N`. Only [`MembershipService`] writes it.
///
/// [`MembershipService`]: crate::membership::MembershipService
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct AlbumTrack {
    /// Unique identifier of the membership row
    pub id: String,
    /// Owning album
    pub album_id: String,
    /// Referenced track
    pub track_id: String,
    /// Position within the album
    pub position: i64,
    /// When the membership was created
    pub added_at: i64,
}

impl AlbumTrack {
    pub(crate) fn new(album_id: &str, track_id: &str, position: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            album_id: album_id.to_string(),
            track_id: track_id.to_string(),
            position,
            added_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// Album track listing row (membership joined with its track)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct AlbumTrackEntry {
    pub position: i64,
    pub track_id: String,
    pub name: String,
}

// =============================================================================
// Membership Requests
// =============================================================================

/// How a membership request refers to its track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackRef {
    /// A track that already exists in the catalog
    Existing(String),
    /// A track created together with the membership, credited to the album's artist
    New { name: String },
}

impl TrackRef {
    pub fn existing(id: impl Into<String>) -> Self {
        Self::Existing(id.into())
    }

    pub fn new_track(name: impl Into<String>) -> Self {
        Self::New { name: name.into() }
    }
}

/// One item of an insert or bulk insert request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipRequest {
    pub track: TrackRef,
    /// Requested position; `None` appends
    pub position: Option<i64>,
}

impl MembershipRequest {
    /// Append the track after the current last position
    pub fn append(track: TrackRef) -> Self {
        Self {
            track,
            position: None,
        }
    }

    /// Insert the track at an explicit position
    pub fn at(track: TrackRef, position: i64) -> Self {
        Self {
            track,
            position: Some(position),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_trimmed() {
        let artist = Artist::new("  Nina Simone \n".to_string());
        assert_eq!(artist.name, "Nina Simone");
        assert_eq!(artist.normalized_name, "nina simone");

        let album = Album::new(" Pastel Blues ".to_string(), artist.id.clone());
        assert_eq!(album.name, "Pastel Blues");

        let track = Track::new("\tSinnerman".to_string(), artist.id);
        assert_eq!(track.name, "Sinnerman");
    }

    #[test]
    fn test_empty_and_long_names_rejected() {
        let mut artist = Artist::new("x".to_string());
        artist.name = "   ".to_string();
        assert!(artist.validate().is_err());

        artist.name = "a".repeat(MAX_NAME_LENGTH + 1);
        assert!(artist.validate().is_err());

        artist.name = "a".repeat(MAX_NAME_LENGTH);
        assert!(artist.validate().is_ok());
    }

    #[test]
    fn test_album_year_range() {
        let album = Album::new("Album".to_string(), "artist".to_string());
        assert!(album.clone().with_year(MIN_RELEASE_YEAR).validate().is_ok());
        assert!(album.clone().with_year(1859).validate().is_err());

        let next_year = chrono::Utc::now().year() + 1;
        assert!(album.clone().with_year(next_year).validate().is_err());
        assert!(album.validate().is_ok());
    }

    #[test]
    fn test_membership_request_constructors() {
        let append = MembershipRequest::append(TrackRef::existing("t1"));
        assert_eq!(append.position, None);

        let at = MembershipRequest::at(TrackRef::new_track("Intro"), 2);
        assert_eq!(at.position, Some(2));
        assert_eq!(
            at.track,
            TrackRef::New {
                name: "Intro".to_string()
            }
        );
    }
}
