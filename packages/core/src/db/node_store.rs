//! NodeStore Trait - Persistence Abstraction
//!
//! This module defines the `NodeStore`, `FileStore` and `AnnotationStore`
//! traits the engine persists through, plus `UnitOfWork`, the explicit value describing one
//! all-or-nothing batch of writes.
//!
//! # Architecture
//!
//! - **Abstraction Point**: Between `TreeEngine` (tree logic) and a backend
//! - **Multiple Backends**: `TursoStore` (libsql) and `MemoryStore` (in-process)
//! - **Atomic Units**: Every multi-node change is handed over as one `UnitOfWork`;
//!   a backend either applies all of its operations or none of them
//! - **No Ordering Guarantees**: Loads return nodes in any order; the engine sorts
//!
//! # Examples
//!
//! ```rust,no_run
//! use movetree_core::db::{FileStore, MemoryStore, NodeStore, UnitOfWork};
//! use movetree_core::models::{ChessFile, ChessMove, NodeUpdate, PositionNode};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = MemoryStore::new();
//!     let file = store.insert_file(ChessFile::new("Italian Game", None)?).await?;
//!
//!     let root = PositionNode::new_root(file.id.clone(), "start".to_string());
//!     let child = PositionNode::new_child(&root, "after e4".to_string(), ChessMove::new("e2e4"), 0);
//!
//!     let mut unit = UnitOfWork::new();
//!     unit.insert(root.clone())
//!         .insert(child.clone())
//!         .update(child.id.clone(), NodeUpdate::new().with_position("after 1.e4".to_string()));
//!     store.run_atomically(unit).await?;
//!
//!     assert_eq!(store.load_all_for_file(&file.id).await?.len(), 2);
//!     Ok(())
//! }
//! ```

use crate::db::error::DatabaseError;
use crate::models::{Arrow, ChessFile, NodeId, NodeUpdate, Note, PositionNode};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// One write inside a unit of work
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOperation {
    /// Insert a new node; fails if the id already exists
    Insert(PositionNode),

    /// Apply a partial update; fails if the node does not exist
    Update { id: NodeId, update: NodeUpdate },

    /// Delete nodes (and their annotations); ids that do not exist are skipped
    DeleteMany(Vec<NodeId>),
}

/// An ordered batch of store operations applied all-or-nothing
///
/// Operations run in insertion order. Structural constraints (single root per
/// file, parent references) are checked when the unit commits, so a unit may
/// pass through intermediate states that would be invalid on their own.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitOfWork {
    operations: Vec<StoreOperation>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node: PositionNode) -> &mut Self {
        self.operations.push(StoreOperation::Insert(node));
        self
    }

    /// Queue a partial update; empty updates are dropped
    pub fn update(&mut self, id: NodeId, update: NodeUpdate) -> &mut Self {
        if !update.is_empty() {
            self.operations.push(StoreOperation::Update { id, update });
        }
        self
    }

    /// Queue a bulk delete; an empty id list is dropped
    pub fn delete_many(&mut self, ids: Vec<NodeId>) -> &mut Self {
        if !ids.is_empty() {
            self.operations.push(StoreOperation::DeleteMany(ids));
        }
        self
    }

    pub fn operations(&self) -> &[StoreOperation] {
        &self.operations
    }

    pub fn into_operations(self) -> Vec<StoreOperation> {
        self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// What a committed unit of work changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitOutcome {
    pub inserted: Vec<NodeId>,
    pub updated: Vec<NodeId>,
    pub deleted: Vec<NodeId>,
}

/// Abstraction layer for position node persistence
///
/// Implementations must be `Send + Sync` so a store can be shared behind an
/// `Arc` across tasks.
///
/// Only `load_all_for_file`, `get_node` and `run_atomically` are required; the
/// single-operation methods are conveniences expressed as one-operation units.
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Load every node belonging to `file_id`, in no particular order
    async fn load_all_for_file(&self, file_id: &str) -> Result<Vec<PositionNode>, DatabaseError>;

    /// Get a node by id
    ///
    /// # Returns
    ///
    /// * `Ok(Some(node))` - Node found
    /// * `Ok(None)` - No node with that id
    async fn get_node(&self, id: &str) -> Result<Option<PositionNode>, DatabaseError>;

    /// Execute every operation of `unit` as one all-or-nothing unit
    ///
    /// # Errors
    ///
    /// Any failing operation, or a constraint violated at commit, rolls the
    /// whole unit back and returns the error. `DatabaseError::Busy` means
    /// nothing was applied and the unit may be retried.
    async fn run_atomically(&self, unit: UnitOfWork) -> Result<UnitOutcome, DatabaseError>;

    /// Insert a single node
    async fn insert(&self, node: PositionNode) -> Result<PositionNode, DatabaseError> {
        let mut unit = UnitOfWork::new();
        unit.insert(node.clone());
        self.run_atomically(unit).await?;
        Ok(node)
    }

    /// Apply a partial update to a single node
    async fn update_fields(&self, id: &str, update: NodeUpdate) -> Result<(), DatabaseError> {
        let mut unit = UnitOfWork::new();
        unit.update(id.to_string(), update);
        self.run_atomically(unit).await?;
        Ok(())
    }

    /// Delete the given nodes, returning the ids that actually existed
    async fn delete_many(&self, ids: Vec<NodeId>) -> Result<Vec<NodeId>, DatabaseError> {
        let mut unit = UnitOfWork::new();
        unit.delete_many(ids);
        Ok(self.run_atomically(unit).await?.deleted)
    }
}

/// Persistence for study files
///
/// Positions reference a file by id; backends reject positions whose file
/// does not exist.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Insert a file; fails with `DuplicateId` if the id is taken
    async fn insert_file(&self, file: ChessFile) -> Result<ChessFile, DatabaseError>;

    async fn get_file(&self, id: &str) -> Result<Option<ChessFile>, DatabaseError>;

    /// Every file, newest first
    async fn list_files(&self) -> Result<Vec<ChessFile>, DatabaseError>;
}

/// Persistence for notes and arrows attached to position nodes
///
/// Listing methods return newest first.
#[async_trait]
pub trait AnnotationStore: Send + Sync {
    /// Insert a note; fails with `ConstraintViolation` if its node does not exist
    async fn insert_note(&self, note: Note) -> Result<Note, DatabaseError>;

    async fn get_note(&self, id: &str) -> Result<Option<Note>, DatabaseError>;

    async fn list_notes(&self, node_id: &str) -> Result<Vec<Note>, DatabaseError>;

    /// Replace a note's text, returning the updated note or `None` if it is missing
    async fn update_note_text(
        &self,
        id: &str,
        text: String,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<Note>, DatabaseError>;

    /// Delete a note, returning whether it existed
    async fn delete_note(&self, id: &str) -> Result<bool, DatabaseError>;

    /// Insert an arrow; fails with `ConstraintViolation` if its node does not exist
    async fn insert_arrow(&self, arrow: Arrow) -> Result<Arrow, DatabaseError>;

    async fn list_arrows(&self, node_id: &str) -> Result<Vec<Arrow>, DatabaseError>;

    /// Delete an arrow, returning whether it existed
    async fn delete_arrow(&self, id: &str) -> Result<bool, DatabaseError>;
}
