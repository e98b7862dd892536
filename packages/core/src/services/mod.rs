//! Business Services
//!
//! This module contains the services callers work with:
//!
//! - `FileService` - Create and list study files
//! - `TreeEngine` - Create, reorder, delete and materialize variation trees
//! - `AnnotationService` - Notes and arrows attached to positions
//!
//! Services coordinate between the database layer and the pure tree
//! operations, enforcing tree invariants and publishing events.

pub mod annotation_service;
pub mod error;
pub mod file_service;
mod file_locks;
pub mod tree_engine;

pub use annotation_service::AnnotationService;
pub use error::TreeError;
pub use file_locks::{FileGuard, FileLocks};
pub use file_service::FileService;
pub use tree_engine::TreeEngine;
