//! Album track order store
//!
//! Transactional gateway for the `album_tracks` sequence. Reads hand out a
//! versioned snapshot; writes apply a complete [`OrderPlan`] in one
//! transaction guarded by the album's `order_version`.

use crate::error::{LibraryError, Result};
use crate::models::{AlbumTrack, AlbumTrackEntry, Track};
use crate::sequencer::{Member, OrderPlan, OrderSnapshot, PositionShift, PARKING_POSITION};
use async_trait::async_trait;
use sqlx::{query, query_as, Sqlite, SqlitePool, Transaction};
use tracing::{debug, warn};

/// SQLite primary result codes that mean another connection holds the lock
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// New row to write with a plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMembership {
    /// Membership row, already carrying its planned position
    pub membership: AlbumTrack,
    /// Track created in the same transaction, for inline track references
    pub new_track: Option<Track>,
}

/// Persistence gateway for album track order
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Read the album's version and memberships (ascending by position) as
    /// one consistent snapshot
    ///
    /// # Errors
    /// `NotFound` if the album does not exist.
    async fn load_positions(&self, album_id: &str) -> Result<OrderSnapshot>;

    /// Apply a plan atomically
    ///
    /// Fails with `ConcurrentOrderConflict` if the album's version is no
    /// longer `expected_version`. Nothing is written on any error.
    ///
    /// # Returns
    /// The inserted memberships in request order, followed by the moved
    /// membership (with its new position) when the plan moves a row.
    async fn apply_plan(
        &self,
        album_id: &str,
        expected_version: i64,
        plan: &OrderPlan,
        new_rows: &[NewMembership],
    ) -> Result<Vec<AlbumTrack>>;

    /// Track listing of an album, ascending by position
    async fn list_entries(&self, album_id: &str) -> Result<Vec<AlbumTrackEntry>>;

    /// Membership at a position, if any
    async fn find_by_position(&self, album_id: &str, position: i64) -> Result<Option<AlbumTrack>>;

    /// Number of memberships of an album
    async fn count(&self, album_id: &str) -> Result<i64>;

    /// Albums the track is placed on
    async fn album_ids_for_track(&self, track_id: &str) -> Result<Vec<String>>;
}

/// SQLite implementation of OrderStore
pub struct SqliteOrderStore {
    pool: SqlitePool,
}

impl SqliteOrderStore {
    /// Create a new SqliteOrderStore
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Claim the album for writing: bump its version if it still matches
    async fn bump_version(
        tx: &mut Transaction<'_, Sqlite>,
        album_id: &str,
        expected_version: i64,
    ) -> Result<()> {
        let result = query(
            r#"
            UPDATE albums
            SET order_version = order_version + 1, updated_at = ?
            WHERE id = ? AND order_version = ?
            "#,
        )
        .bind(chrono::Utc::now().timestamp())
        .bind(album_id)
        .bind(expected_version)
        .execute(&mut **tx)
        .await
        .map_err(|e| classify(e, album_id))?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        let current: Option<(i64,)> = query_as("SELECT order_version FROM albums WHERE id = ?")
            .bind(album_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| classify(e, album_id))?;

        match current {
            None => Err(LibraryError::not_found("Album", album_id)),
            Some((version,)) => {
                debug!(
                    album_id = %album_id,
                    expected_version,
                    current_version = version,
                    "Album order changed since snapshot"
                );
                Err(conflict(album_id))
            }
        }
    }

    async fn set_position(
        tx: &mut Transaction<'_, Sqlite>,
        album_id: &str,
        membership_id: &str,
        from: i64,
        to: i64,
    ) -> Result<()> {
        let result = query(
            "UPDATE album_tracks SET position = ? WHERE id = ? AND album_id = ? AND position = ?",
        )
        .bind(to)
        .bind(membership_id)
        .bind(album_id)
        .bind(from)
        .execute(&mut **tx)
        .await
        .map_err(|e| classify(e, album_id))?;

        if result.rows_affected() != 1 {
            return Err(conflict(album_id));
        }
        Ok(())
    }

    async fn insert_row(
        tx: &mut Transaction<'_, Sqlite>,
        album_id: &str,
        row: &NewMembership,
    ) -> Result<()> {
        if let Some(track) = &row.new_track {
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
            .execute(&mut **tx)
            .await?;
        }

        let membership = &row.membership;
        query(
            r#"
            INSERT INTO album_tracks (id, album_id, track_id, position, added_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&membership.id)
        .bind(album_id)
        .bind(&membership.track_id)
        .bind(membership.position)
        .bind(membership.added_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                LibraryError::not_found("Track", membership.track_id.clone())
            }
            _ => classify(e, album_id),
        })?;

        Ok(())
    }
}

#[async_trait]
impl OrderStore for SqliteOrderStore {
    async fn load_positions(&self, album_id: &str) -> Result<OrderSnapshot> {
        let mut tx = self.pool.begin().await.map_err(|e| classify(e, album_id))?;

        let version: Option<(i64,)> = query_as("SELECT order_version FROM albums WHERE id = ?")
            .bind(album_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| classify(e, album_id))?;

        let Some((version,)) = version else {
            return Err(LibraryError::not_found("Album", album_id));
        };

        let members = query_as::<_, Member>(
            r#"
            SELECT id AS membership_id, track_id, position
            FROM album_tracks
            WHERE album_id = ?
            ORDER BY position ASC
            "#,
        )
        .bind(album_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| classify(e, album_id))?;

        tx.commit().await.map_err(|e| classify(e, album_id))?;

        Ok(OrderSnapshot { version, members })
    }

    async fn apply_plan(
        &self,
        album_id: &str,
        expected_version: i64,
        plan: &OrderPlan,
        new_rows: &[NewMembership],
    ) -> Result<Vec<AlbumTrack>> {
        if plan.new_positions.len() != new_rows.len() {
            return Err(LibraryError::invalid_input(
                "new_rows",
                format!(
                    "plan places {} new row(s) but {} were supplied",
                    plan.new_positions.len(),
                    new_rows.len()
                ),
            ));
        }

        let mut tx = self.pool.begin().await.map_err(|e| classify(e, album_id))?;

        Self::bump_version(&mut tx, album_id, expected_version).await?;

        for membership_id in &plan.removed {
            let result = query("DELETE FROM album_tracks WHERE id = ? AND album_id = ?")
                .bind(membership_id)
                .bind(album_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| classify(e, album_id))?;

            if result.rows_affected() != 1 {
                return Err(conflict(album_id));
            }
        }

        if let Some(PositionShift {
            membership_id,
            from,
            ..
        }) = &plan.moved
        {
            Self::set_position(&mut tx, album_id, membership_id, *from, PARKING_POSITION).await?;
        }

        for shift in &plan.shifts {
            Self::set_position(&mut tx, album_id, &shift.membership_id, shift.from, shift.to)
                .await?;
        }

        if let Some(moved) = &plan.moved {
            Self::set_position(&mut tx, album_id, &moved.membership_id, PARKING_POSITION, moved.to)
                .await?;
        }

        let mut written = Vec::with_capacity(new_rows.len() + 1);
        for (row, &position) in new_rows.iter().zip(&plan.new_positions) {
            if row.membership.position != position {
                return Err(LibraryError::invalid_input(
                    "position",
                    format!(
                        "new row carries position {} but the plan assigns {}",
                        row.membership.position, position
                    ),
                ));
            }
            Self::insert_row(&mut tx, album_id, row).await?;
            written.push(row.membership.clone());
        }

        if let Some(moved) = &plan.moved {
            let row = query_as::<_, AlbumTrack>("SELECT * FROM album_tracks WHERE id = ?")
                .bind(&moved.membership_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| classify(e, album_id))?;
            written.push(row);
        }

        tx.commit().await.map_err(|e| classify(e, album_id))?;

        debug!(
            album_id = %album_id,
            version = expected_version + 1,
            shifted = plan.shifts.len(),
            removed = plan.removed.len(),
            inserted = new_rows.len(),
            "Applied order plan"
        );

        Ok(written)
    }

    async fn list_entries(&self, album_id: &str) -> Result<Vec<AlbumTrackEntry>> {
        let entries = query_as::<_, AlbumTrackEntry>(
            r#"
            SELECT at.position, at.track_id, t.name
            FROM album_tracks at
            INNER JOIN tracks t ON t.id = at.track_id
            WHERE at.album_id = ?
            ORDER BY at.position ASC
            "#,
        )
        .bind(album_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    async fn find_by_position(&self, album_id: &str, position: i64) -> Result<Option<AlbumTrack>> {
        let row = query_as::<_, AlbumTrack>(
            "SELECT * FROM album_tracks WHERE album_id = ? AND position = ?",
        )
        .bind(album_id)
        .bind(position)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn count(&self, album_id: &str) -> Result<i64> {
        let count: (i64,) = query_as("SELECT COUNT(*) FROM album_tracks WHERE album_id = ?")
            .bind(album_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count.0)
    }

    async fn album_ids_for_track(&self, track_id: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = query_as(
            "SELECT DISTINCT album_id FROM album_tracks WHERE track_id = ? ORDER BY album_id",
        )
        .bind(track_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

fn conflict(album_id: &str) -> LibraryError {
    LibraryError::ConcurrentOrderConflict {
        album_id: album_id.to_string(),
        attempts: 1,
    }
}

/// Map lock contention and position collisions to a retryable conflict
fn classify(err: sqlx::Error, album_id: &str) -> LibraryError {
    if let sqlx::Error::Database(db) = &err {
        let locked = db
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .map(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
            .unwrap_or(false);

        if locked || db.is_unique_violation() {
            warn!(album_id = %album_id, error = %db, "Order write collided with another writer");
            return conflict(album_id);
        }
    }
    LibraryError::Database(err)
}
