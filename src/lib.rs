//! Workspace placeholder crate.
//!
//! Host applications depend on `music-catalog` to get the catalog façade
//! (`core-service`) together with the library and runtime crates it is built
//! from, without wiring each workspace crate individually.

pub use core_service::{
    bootstrap, CatalogService, CoreError, Result,
};

pub use core_service::library;
pub use core_service::runtime;
