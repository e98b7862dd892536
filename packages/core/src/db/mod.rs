//! Database Layer
//!
//! This module handles persistence of study files, their position trees and
//! annotations:
//!
//! - `NodeStore` / `FileStore` / `AnnotationStore` traits and the `UnitOfWork` value
//! - `TursoStore` over a libsql database opened by `DatabaseService`
//! - `MemoryStore`, an in-process backend with the same constraints
//! - `TreeEvent`, the change notifications published after commits
//!
//! # Architecture
//!
//! Backends know nothing about tree rules. They store rows, apply units of
//! work atomically and enforce the schema-level constraints (one root per
//! file, parents exist). Ordering, descendant collection and validation live
//! in `operations` and `services`.

mod database;
mod error;
pub mod events;
mod memory_store;
mod node_store;
mod turso_store;

pub use database::DatabaseService;
pub use error::DatabaseError;
pub use events::TreeEvent;
pub use memory_store::MemoryStore;
pub use node_store::{
    AnnotationStore, FileStore, NodeStore, StoreOperation, UnitOfWork, UnitOutcome,
};
pub use turso_store::TursoStore;
