use thiserror::Error;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    #[error("Invalid position: {position} (positions start at 1)")]
    InvalidPosition { position: i64 },

    #[error("Position {position} is out of range: max position is {max}")]
    PositionOutOfRange { position: i64, max: i64 },

    #[error(
        "Inconsistent bulk order: {explicit} item(s) with a position and {implicit} without"
    )]
    InconsistentBulkOrder { explicit: usize, implicit: usize },

    #[error("Track {id} is still placed on an album")]
    TrackInUse { id: String },

    #[error("Concurrent order conflict on album {album_id} after {attempts} attempt(s)")]
    ConcurrentOrderConflict { album_id: String, attempts: u32 },

    #[error("Migration failed: {0}")]
    Migration(String),
}

impl LibraryError {
    pub(crate) fn not_found(entity_type: &str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.to_string(),
            id: id.into(),
        }
    }

    pub(crate) fn invalid_input(field: &str, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Whether the error means another writer got to the album first and the
    /// whole load-plan-apply cycle may be retried.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrentOrderConflict { .. })
    }
}

pub type Result<T> = std::result::Result<T, LibraryError>;
