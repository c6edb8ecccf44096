//! # Catalog Configuration Module
//!
//! Provides configuration management for the music catalog.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CatalogConfig`
//! instance holding the storage, ordering and event settings of the catalog.
//! It enforces fail-fast validation so that a bad value is reported before any
//! database connection is opened.
//!
//! ## Usage
//!
//! ```
//! use core_runtime::config::CatalogConfig;
//! use std::time::Duration;
//!
//! let config = CatalogConfig::builder()
//!     .database_path("/path/to/catalog.db")
//!     .max_conflict_retries(5)
//!     .retry_backoff(Duration::from_millis(20))
//!     .build()
//!     .expect("Failed to build config");
//! ```
//!
//! In-memory catalogs (tests, scratch sessions) skip the path:
//!
//! ```
//! use core_runtime::config::CatalogConfig;
//!
//! let config = CatalogConfig::builder().in_memory().build().unwrap();
//! assert!(config.database.is_in_memory());
//! ```

use crate::error::{Error, Result};
use crate::logging::LoggingConfig;
use std::path::PathBuf;
use std::time::Duration;

const MAX_CONNECTIONS_LIMIT: u32 = 64;
const MAX_CONFLICT_RETRIES_LIMIT: u32 = 20;
const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(5);

/// Where the catalog database lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    /// SQLite database file, created on first use
    File(PathBuf),
    /// Private in-memory database, dropped with the pool
    InMemory,
}

impl DatabaseLocation {
    pub fn is_in_memory(&self) -> bool {
        matches!(self, DatabaseLocation::InMemory)
    }
}

/// Catalog configuration.
///
/// Use [`CatalogConfigBuilder`] to construct instances.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Database location
    pub database: DatabaseLocation,

    /// Maximum pooled connections
    pub max_connections: u32,

    /// How long to wait for a pooled connection
    pub acquire_timeout: Duration,

    /// How long SQLite waits on a locked database before failing
    pub busy_timeout: Duration,

    /// Extra attempts after an ordering conflict before giving up
    pub max_conflict_retries: u32,

    /// Base delay between conflict retries (multiplied by the attempt number)
    pub retry_backoff: Duration,

    /// Capacity of the event bus ring buffer
    pub event_buffer_size: usize,

    /// Logging settings, applied by the service bootstrap
    pub logging: LoggingConfig,
}

impl CatalogConfig {
    /// Creates a new builder for constructing a `CatalogConfig`.
    pub fn builder() -> CatalogConfigBuilder {
        CatalogConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Database path is not empty
    /// - Connection count is within `1..=64`
    /// - Retry count and backoff are bounded
    /// - Event buffer is not empty
    pub fn validate(&self) -> Result<()> {
        if let DatabaseLocation::File(path) = &self.database {
            if path.as_os_str().is_empty() {
                return Err(Error::Config("Database path cannot be empty".to_string()));
            }
        }

        if self.max_connections == 0 || self.max_connections > MAX_CONNECTIONS_LIMIT {
            return Err(Error::Config(format!(
                "max_connections must be between 1 and {}, got {}",
                MAX_CONNECTIONS_LIMIT, self.max_connections
            )));
        }

        if self.max_conflict_retries > MAX_CONFLICT_RETRIES_LIMIT {
            return Err(Error::Config(format!(
                "max_conflict_retries exceeds maximum of {}, got {}",
                MAX_CONFLICT_RETRIES_LIMIT, self.max_conflict_retries
            )));
        }

        if self.retry_backoff > MAX_RETRY_BACKOFF {
            return Err(Error::Config(format!(
                "retry_backoff exceeds maximum of {:?}, got {:?}",
                MAX_RETRY_BACKOFF, self.retry_backoff
            )));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "event_buffer_size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for [`CatalogConfig`].
#[derive(Debug, Default)]
pub struct CatalogConfigBuilder {
    database: Option<DatabaseLocation>,
    max_connections: Option<u32>,
    acquire_timeout: Option<Duration>,
    busy_timeout: Option<Duration>,
    max_conflict_retries: Option<u32>,
    retry_backoff: Option<Duration>,
    event_buffer_size: Option<usize>,
    logging: Option<LoggingConfig>,
}

impl CatalogConfigBuilder {
    /// Sets the database file path.
    ///
    /// # Examples
    ///
    /// ```
    /// use core_runtime::config::CatalogConfig;
    ///
    /// let builder = CatalogConfig::builder()
    ///     .database_path("/path/to/catalog.db");
    /// ```
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database = Some(DatabaseLocation::File(path.into()));
        self
    }

    /// Uses a private in-memory database instead of a file.
    pub fn in_memory(mut self) -> Self {
        self.database = Some(DatabaseLocation::InMemory);
        self
    }

    /// Default: 5
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = Some(max);
        self
    }

    /// Default: 30 seconds
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    /// Default: 5 seconds
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = Some(timeout);
        self
    }

    /// Default: 3
    pub fn max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = Some(retries);
        self
    }

    /// Default: 10 milliseconds
    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = Some(backoff);
        self
    }

    /// Default: 100 events
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when no database location was chosen or when
    /// any value is out of range.
    pub fn build(self) -> Result<CatalogConfig> {
        let database = self.database.ok_or_else(|| {
            Error::Config(
                "Database path is required. Use .database_path() or .in_memory() to set it."
                    .to_string(),
            )
        })?;

        let config = CatalogConfig {
            database,
            max_connections: self.max_connections.unwrap_or(5),
            acquire_timeout: self.acquire_timeout.unwrap_or(Duration::from_secs(30)),
            busy_timeout: self.busy_timeout.unwrap_or(Duration::from_secs(5)),
            max_conflict_retries: self.max_conflict_retries.unwrap_or(3),
            retry_backoff: self.retry_backoff.unwrap_or(Duration::from_millis(10)),
            event_buffer_size: self.event_buffer_size.unwrap_or(100),
            logging: self.logging.unwrap_or_default(),
        };

        config.validate()?;

        Ok(config)
    }
}
