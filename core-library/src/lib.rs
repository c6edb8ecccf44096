//! # Catalog Library Module
//!
//! Owns the music catalog database and the ordered track lists of albums.
//!
//! ## Overview
//!
//! This module manages:
//! - SQLite database schema and migrations
//! - Repository patterns for artists, albums and tracks
//! - The album track sequencer (pure position planning)
//! - The membership service, the only writer of album track positions
//!
//! ## Ordering guarantees
//!
//! For every album the committed positions are exactly `1..=N`. Concurrent
//! changes to one album are serialized (per-album lock plus an optimistic
//! version check in storage); changes to different albums never wait on
//! each other.

pub mod db;
pub mod error;
pub mod locks;
pub mod membership;
pub mod models;
pub mod repositories;
pub mod sequencer;

pub use error::{LibraryError, Result};
pub use membership::{MembershipOptions, MembershipService};
