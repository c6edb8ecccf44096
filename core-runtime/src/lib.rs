//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the music catalog:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the library and service
//! crates depend on. It establishes the logging conventions, the validated
//! configuration, and the event broadcasting used to announce committed
//! changes to album track lists.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
