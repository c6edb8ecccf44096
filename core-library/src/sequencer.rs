//! # Album Track Sequencer
//!
//! Pure planning logic for the dense `1..=N` track order of an album.
//!
//! Every function takes the album's current memberships (ascending by
//! position, as returned by [`OrderStore::load_positions`]) and returns an
//! [`OrderPlan`]: the exact set of rows whose position changes, the positions
//! assigned to new rows, and the rows removed or moved. Nothing here touches
//! storage, so a plan can be recomputed freely when a conflicting writer
//! forces a retry.
//!
//! ## Application order
//!
//! A plan is logically one atomic batch, but stores that apply it row by row
//! under a `UNIQUE(album_id, position)` constraint must follow this order:
//!
//! 1. delete [`OrderPlan::removed`] rows
//! 2. park the [`OrderPlan::moved`] row in the scratch slot `0`
//! 3. apply [`OrderPlan::shifts`] in the given order
//! 4. place the moved row at its target position
//! 5. insert new rows at [`OrderPlan::new_positions`]
//!
//! Shifts are sorted so each target slot is already free when written:
//! decrements run lowest position first, increments highest position first.
//!
//! [`OrderStore::load_positions`]: crate::repositories::OrderStore::load_positions

use crate::error::{LibraryError, Result};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Scratch position a moved row occupies while its neighbours shift
pub const PARKING_POSITION: i64 = 0;

/// One membership as seen by the sequencer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Member {
    pub membership_id: String,
    pub track_id: String,
    pub position: i64,
}

/// Consistent view of one album's order, read in a single transaction
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OrderSnapshot {
    /// Optimistic concurrency token of the album
    pub version: i64,
    /// Memberships ascending by position
    pub members: Vec<Member>,
}

/// Position change of one existing row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionShift {
    pub membership_id: String,
    pub from: i64,
    pub to: i64,
}

/// Batch of position changes computed for one operation
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrderPlan {
    /// Existing rows changing position, in safe application order
    pub shifts: Vec<PositionShift>,
    /// Membership ids deleted by the operation
    pub removed: Vec<String>,
    /// Row moved by a reorder (applied through the parking slot)
    pub moved: Option<PositionShift>,
    /// Final positions of new rows, in request order
    pub new_positions: Vec<i64>,
}

impl OrderPlan {
    /// True when applying the plan would change nothing
    pub fn is_noop(&self) -> bool {
        self.shifts.is_empty()
            && self.removed.is_empty()
            && self.moved.is_none()
            && self.new_positions.is_empty()
    }
}

/// The append slot: `max position + 1`, or `1` for an empty album
pub fn next_position(current: &[Member]) -> i64 {
    current.iter().map(|m| m.position).max().unwrap_or(0) + 1
}

/// Plan a single insert; `None` appends
pub fn plan_insert(current: &[Member], requested: Option<i64>) -> Result<OrderPlan> {
    plan_bulk_insert(current, &[requested])
}

/// Plan the insertion of several new rows
///
/// Either every item carries a position or none does. Without positions the
/// rows are appended in request order. With positions, items are applied in
/// request order, each validated against the sequence left by the items
/// before it, so item `i` (0-based) may target `1..=N + i + 1`.
pub fn plan_bulk_insert(current: &[Member], requested: &[Option<i64>]) -> Result<OrderPlan> {
    check_bulk_positions(requested)?;

    let next = next_position(current);

    if requested.iter().all(Option::is_none) {
        return Ok(OrderPlan {
            new_positions: (next..).take(requested.len()).collect(),
            ..OrderPlan::default()
        });
    }

    let mut arrangement: Vec<Slot<'_>> = current.iter().map(Slot::Existing).collect();

    for (index, position) in requested.iter().flatten().copied().enumerate() {
        let max = next + index as i64;
        validate_target(position, max)?;
        let at = ((position - 1) as usize).min(arrangement.len());
        arrangement.insert(at, Slot::New(index));
    }

    Ok(diff(arrangement, requested.len(), None))
}

/// Reject batches where only some items carry a position
pub fn check_bulk_positions(requested: &[Option<i64>]) -> Result<()> {
    let explicit = requested.iter().filter(|p| p.is_some()).count();
    let implicit = requested.len() - explicit;

    if explicit > 0 && implicit > 0 {
        return Err(LibraryError::InconsistentBulkOrder { explicit, implicit });
    }
    Ok(())
}

/// Plan the removal of the row at `position`
pub fn plan_remove(current: &[Member], position: i64) -> Result<OrderPlan> {
    plan_remove_many(current, &[position])
}

/// Plan the removal of several rows at once, compacting the survivors
pub fn plan_remove_many(current: &[Member], positions: &[i64]) -> Result<OrderPlan> {
    for &position in positions {
        find_at(current, position)?;
    }

    let mut removed = Vec::new();
    let mut arrangement = Vec::with_capacity(current.len());
    for member in current {
        if positions.contains(&member.position) {
            removed.push(member.membership_id.clone());
        } else {
            arrangement.push(Slot::Existing(member));
        }
    }

    let mut plan = diff(arrangement, 0, None);
    plan.removed = removed;
    Ok(plan)
}

/// Plan moving the row at `from` to `to`
///
/// Valid targets are `1..=N`: a move never grows the album. Moving a row onto
/// its own position is a no-op plan.
pub fn plan_move(current: &[Member], from: i64, to: i64) -> Result<OrderPlan> {
    let moving = find_at(current, from)?;
    validate_target(to, current.len() as i64)?;

    if from == to {
        return Ok(OrderPlan::default());
    }

    let mut arrangement: Vec<Slot<'_>> = current
        .iter()
        .filter(|m| m.membership_id != moving.membership_id)
        .map(Slot::Existing)
        .collect();
    let at = ((to - 1) as usize).min(arrangement.len());
    arrangement.insert(at, Slot::Existing(moving));

    Ok(diff(arrangement, 0, Some(moving.membership_id.as_str())))
}

/// Find the membership currently holding `position`
pub fn find_at(current: &[Member], position: i64) -> Result<&Member> {
    current
        .iter()
        .find(|m| m.position == position)
        .ok_or_else(|| LibraryError::not_found("AlbumTrack", format!("position {}", position)))
}

/// Check that positions are exactly `1..=N`
pub fn is_dense(current: &[Member]) -> bool {
    let mut positions: Vec<i64> = current.iter().map(|m| m.position).collect();
    positions.sort_unstable();
    positions.iter().zip(1..).all(|(&p, expected)| p == expected)
}

fn validate_target(position: i64, max: i64) -> Result<()> {
    if position < 1 {
        return Err(LibraryError::InvalidPosition { position });
    }
    if position > max {
        return Err(LibraryError::PositionOutOfRange { position, max });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
enum Slot<'a> {
    Existing(&'a Member),
    New(usize),
}

/// Turn the desired arrangement into a plan by comparing each slot's index
/// with the position its row holds today.
fn diff(arrangement: Vec<Slot<'_>>, new_rows: usize, moved_id: Option<&str>) -> OrderPlan {
    let mut plan = OrderPlan {
        new_positions: vec![0; new_rows],
        ..OrderPlan::default()
    };

    for (target, slot) in (1_i64..).zip(arrangement) {
        match slot {
            Slot::New(index) => plan.new_positions[index] = target,
            Slot::Existing(member) if member.position != target => {
                let shift = PositionShift {
                    membership_id: member.membership_id.clone(),
                    from: member.position,
                    to: target,
                };
                if moved_id == Some(member.membership_id.as_str()) {
                    plan.moved = Some(shift);
                } else {
                    plan.shifts.push(shift);
                }
            }
            Slot::Existing(_) => {}
        }
    }

    plan.shifts.sort_by_key(|s| {
        if s.to < s.from {
            (0, s.from)
        } else {
            (1, -s.from)
        }
    });

    plan
}
