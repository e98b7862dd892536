//! Movetree Core
//!
//! This crate provides the variation-tree engine behind a chess study: a
//! root position per study file, followed by branching move sequences.
//!
//! # Architecture
//!
//! - **Parent pointers only**: nodes store `parent_id`; child lists are derived
//! - **Dense sibling order**: children of a parent are ranked `0..k-1`
//! - **Atomic units of work**: every multi-node change commits all-or-nothing
//! - **libsql/Turso**: Embedded SQLite-compatible storage, with an in-memory
//!   backend for tests and embedding
//!
//! # Modules
//!
//! - [`models`] - Data structures (ChessFile, PositionNode, PositionTree, Note, Arrow)
//! - [`operations`] - Pure ordering, subtree and materialization algorithms
//! - [`db`] - Store traits and the libsql / in-memory backends
//! - [`services`] - TreeEngine, FileService and AnnotationService
//! - [`config`] - Runtime configuration
//! - [`logging`] - Tracing subscriber setup

pub mod config;
pub mod db;
pub mod logging;
pub mod models;
pub mod operations;
pub mod services;

// Re-export commonly used types
pub use config::{ConfigError, EngineConfig};
pub use models::*;
pub use services::*;
