//! TreeEngine - Variation Tree Operations
//!
//! `TreeEngine` is the façade callers use to build and edit a study file's
//! move tree. Every operation keeps these properties true for each file:
//!
//! - exactly one root (no parent, ply 0, order 0) once the file is non-empty
//! - children of every parent ranked `0..k-1`
//! - `ply` equals the parent's ply plus one
//! - deleting a node deletes its whole subtree
//!
//! # Write Path
//!
//! Structural operations follow one pattern: take the file's lock, load the
//! file's nodes, compute a `UnitOfWork` with the pure helpers in
//! `operations`, commit it through the store, then publish a `TreeEvent`. A
//! failed commit leaves the stored tree exactly as it was.
//!
//! Reads (`get_flat_list`, `get_tree`) take no lock.
//!
//! # Examples
//!
//! ```rust,no_run
//! use movetree_core::db::MemoryStore;
//! use movetree_core::models::ChessMove;
//! use movetree_core::services::{FileService, TreeEngine};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(MemoryStore::new());
//!     let files = FileService::new(store.clone());
//!     let engine = TreeEngine::new(store);
//!
//!     let file = files.create_file("Open games", None).await?;
//!     let root = engine.create_root(&file.id, "start".to_string()).await?;
//!     let e4 = engine
//!         .create_child(&root.id, "after e4".to_string(), ChessMove::new("e2e4"), None)
//!         .await?;
//!     let d4 = engine
//!         .create_child(&root.id, "after d4".to_string(), ChessMove::new("d2d4"), Some(0))
//!         .await?;
//!
//!     let tree = engine.get_tree(&file.id).await?;
//!     assert_eq!(tree.children[0].node.id, d4.id);
//!     assert_eq!(tree.children[1].node.id, e4.id);
//!     Ok(())
//! }
//! ```

use crate::config::{EngineConfig, DEFAULT_EVENT_CAPACITY};
use crate::db::{FileStore, NodeStore, TreeEvent, UnitOfWork};
use crate::models::{
    validate_position, ChessMove, NodeId, NodeUpdate, PositionNode, PositionTree, PositionUpdate,
};
use crate::operations::{children_of, OrderIndexer, SubtreeCollector, TreeMaterializer};
use crate::services::error::TreeError;
use crate::services::file_locks::FileLocks;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Move-tree engine over a `NodeStore` and the `FileStore` it checks roots against
#[derive(Clone)]
pub struct TreeEngine {
    store: Arc<dyn NodeStore>,
    files: Arc<dyn FileStore>,
    locks: Arc<FileLocks>,
    event_tx: broadcast::Sender<TreeEvent>,
}

impl TreeEngine {
    /// Create an engine with the default event channel capacity
    pub fn new<S>(store: Arc<S>) -> Self
    where
        S: NodeStore + FileStore + 'static,
    {
        Self::with_event_capacity(store, DEFAULT_EVENT_CAPACITY)
    }

    /// Create an engine sized by `config`
    pub fn with_config<S>(store: Arc<S>, config: &EngineConfig) -> Self
    where
        S: NodeStore + FileStore + 'static,
    {
        Self::with_event_capacity(store, config.event_capacity)
    }

    fn with_event_capacity<S>(store: Arc<S>, capacity: usize) -> Self
    where
        S: NodeStore + FileStore + 'static,
    {
        let (event_tx, _) = broadcast::channel(capacity.max(1));
        Self {
            store: store.clone(),
            files: store,
            locks: Arc::new(FileLocks::new()),
            event_tx,
        }
    }

    /// Subscribe to events published after each committed change
    pub fn subscribe(&self) -> broadcast::Receiver<TreeEvent> {
        self.event_tx.subscribe()
    }

    /// Ignores the error returned when nobody is subscribed
    fn emit_event(&self, event: TreeEvent) {
        let _ = self.event_tx.send(event);
    }

    async fn require_node(&self, id: &str) -> Result<PositionNode, TreeError> {
        self.store
            .get_node(id)
            .await?
            .ok_or_else(|| TreeError::node_not_found(id))
    }

    /// Find `id` in a freshly loaded node set
    ///
    /// The node was seen before the file lock was taken; another writer may
    /// have removed it since.
    fn find_loaded<'a>(nodes: &'a [PositionNode], id: &str) -> Result<&'a PositionNode, TreeError> {
        nodes
            .iter()
            .find(|n| n.id == id)
            .ok_or_else(|| TreeError::node_not_found(id))
    }

    /// Create the root of a file's tree
    ///
    /// # Errors
    ///
    /// - `Validation` if `position` is blank
    /// - `NotFound` if the file does not exist
    /// - `Conflict` if the file already has a root
    pub async fn create_root(
        &self,
        file_id: &str,
        position: String,
    ) -> Result<PositionNode, TreeError> {
        validate_position(&position)?;
        if file_id.trim().is_empty() {
            return Err(TreeError::validation("file id must not be empty"));
        }
        if self.files.get_file(file_id).await?.is_none() {
            return Err(TreeError::not_found(format!("file '{}'", file_id)));
        }

        let _guard = self.locks.acquire(file_id).await;

        let nodes = self.store.load_all_for_file(file_id).await?;
        if let Some(existing) = nodes.iter().find(|n| n.is_root()) {
            return Err(TreeError::conflict(format!(
                "file '{}' already has root '{}'",
                file_id, existing.id
            )));
        }

        let root = PositionNode::new_root(file_id.to_string(), position);
        let mut unit = UnitOfWork::new();
        unit.insert(root.clone());
        self.store.run_atomically(unit).await?;

        tracing::debug!("Created root '{}' for file '{}'", root.id, file_id);
        self.emit_event(TreeEvent::NodeCreated {
            node: root.clone(),
            shifted: Vec::new(),
        });
        Ok(root)
    }

    /// Create a child of `parent_id`
    ///
    /// `insert_at` of `None` appends. Any other index is clamped to
    /// `[0, child_count]`; siblings at or after it move down by one.
    ///
    /// # Errors
    ///
    /// - `Validation` for a blank position or malformed move
    /// - `NotFound` if the parent does not exist
    pub async fn create_child(
        &self,
        parent_id: &str,
        position: String,
        chess_move: ChessMove,
        insert_at: Option<i64>,
    ) -> Result<PositionNode, TreeError> {
        validate_position(&position)?;
        chess_move.validate()?;

        let file_id = self.require_node(parent_id).await?.file_id;
        let _guard = self.locks.acquire(&file_id).await;

        let nodes = self.store.load_all_for_file(&file_id).await?;
        let parent = Self::find_loaded(&nodes, parent_id)?;
        let siblings = children_of(&nodes, parent_id);

        let index = OrderIndexer::clamp_index(insert_at, siblings.len());
        let shifts = OrderIndexer::make_room_at(&siblings, index);
        let child = PositionNode::new_child(parent, position, chess_move, index);

        let mut unit = UnitOfWork::new();
        for change in &shifts {
            unit.update(change.node_id.clone(), change.to_update());
        }
        unit.insert(child.clone());
        self.store.run_atomically(unit).await?;

        tracing::debug!(
            "Created child '{}' under '{}' at index {} ({} sibling(s) shifted)",
            child.id,
            parent_id,
            index,
            shifts.len()
        );
        self.emit_event(TreeEvent::NodeCreated {
            node: child.clone(),
            shifted: shifts.into_iter().map(|c| c.node_id).collect(),
        });
        Ok(child)
    }

    /// Update a node's position and/or move
    ///
    /// Parent, ply and sibling order are never touched. An empty update
    /// returns the node unchanged without writing.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the node does not exist
    /// - `Validation` for a blank position, a malformed move, or a move on the root
    pub async fn update_node(
        &self,
        id: &str,
        update: PositionUpdate,
    ) -> Result<PositionNode, TreeError> {
        if let Some(position) = &update.position {
            validate_position(position)?;
        }
        if let Some(chess_move) = &update.chess_move {
            chess_move.validate()?;
        }

        let file_id = self.require_node(id).await?.file_id;
        let _guard = self.locks.acquire(&file_id).await;

        // Re-read under the lock: an ancestor insert may have moved the node
        let mut node = self.require_node(id).await?;
        if update.chess_move.is_some() && node.is_root() {
            return Err(TreeError::validation("a root position cannot carry a move"));
        }
        if update.is_empty() {
            return Ok(node);
        }

        let node_update = update.into_node_update();
        self.store.update_fields(id, node_update.clone()).await?;
        node_update.apply_to(&mut node);

        tracing::debug!("Updated node '{}'", id);
        self.emit_event(TreeEvent::NodeUpdated { node: node.clone() });
        Ok(node)
    }

    /// Delete `id` and all of its descendants
    ///
    /// The former parent's remaining children are re-ranked `0..k-1` in the
    /// same unit of work. Returns the deleted ids, `id` first.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the node does not exist
    /// - `Forbidden` if the node is the root
    pub async fn delete_subtree(&self, id: &str) -> Result<Vec<NodeId>, TreeError> {
        let node = self.require_node(id).await?;
        if node.is_root() {
            return Err(TreeError::forbidden("the root position cannot be deleted"));
        }

        let _guard = self.locks.acquire(&node.file_id).await;

        let nodes = self.store.load_all_for_file(&node.file_id).await?;
        let node = Self::find_loaded(&nodes, id)?;
        let ids = SubtreeCollector::collect_subtree_ids(&nodes, id)?;

        let mut unit = UnitOfWork::new();
        unit.delete_many(ids.clone());
        if let Some(parent_id) = &node.parent_id {
            let remaining: Vec<PositionNode> = children_of(&nodes, parent_id)
                .into_iter()
                .filter(|n| n.id != id)
                .collect();
            for change in OrderIndexer::compact(&remaining) {
                unit.update(change.node_id.clone(), change.to_update());
            }
        }
        self.store.run_atomically(unit).await?;

        tracing::debug!("Deleted subtree '{}' ({} node(s))", id, ids.len());
        self.emit_event(TreeEvent::SubtreeDeleted {
            file_id: node.file_id.clone(),
            root_id: id.to_string(),
            deleted: ids.clone(),
        });
        Ok(ids)
    }

    /// Give the children of `parent_id` the order of `ordered_ids`
    ///
    /// Returns the children in their new order.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the parent does not exist or has no children
    /// - `Validation` unless `ordered_ids` is exactly a permutation of the
    ///   current child ids; nothing is written in that case
    pub async fn reorder_siblings(
        &self,
        parent_id: &str,
        ordered_ids: &[NodeId],
    ) -> Result<Vec<PositionNode>, TreeError> {
        let file_id = self.require_node(parent_id).await?.file_id;
        let _guard = self.locks.acquire(&file_id).await;

        let nodes = self.store.load_all_for_file(&file_id).await?;
        let children = children_of(&nodes, parent_id);
        if children.is_empty() {
            return Err(TreeError::not_found(format!(
                "node '{}' has no children to reorder",
                parent_id
            )));
        }

        let changes = OrderIndexer::apply_permutation(&children, ordered_ids)?;

        let mut unit = UnitOfWork::new();
        for change in &changes {
            unit.update(change.node_id.clone(), change.to_update());
        }
        self.store.run_atomically(unit).await?;

        let mut reordered = children;
        for node in reordered.iter_mut() {
            if let Some(index) = ordered_ids.iter().position(|id| id == &node.id) {
                node.sibling_order = index as u32;
            }
        }
        reordered.sort_by_key(|n| n.sibling_order);

        tracing::debug!(
            "Reordered {} child(ren) of '{}' ({} changed)",
            reordered.len(),
            parent_id,
            changes.len()
        );
        self.emit_event(TreeEvent::SiblingsReordered {
            file_id,
            parent_id: parent_id.to_string(),
            ordered_ids: ordered_ids.to_vec(),
        });
        Ok(reordered)
    }

    /// All nodes of a file ordered by `(ply, sibling_order)`
    ///
    /// An empty file yields an empty list.
    pub async fn get_flat_list(&self, file_id: &str) -> Result<Vec<PositionNode>, TreeError> {
        let mut nodes = self.store.load_all_for_file(file_id).await?;
        nodes.sort_by(|a, b| {
            a.ply
                .cmp(&b.ply)
                .then_with(|| OrderIndexer::rank_cmp(a, b))
        });
        Ok(nodes)
    }

    /// The file's nodes as one nested tree
    ///
    /// # Errors
    ///
    /// - `NotFound` if the file has no root, or (integrity violation) several
    pub async fn get_tree(&self, file_id: &str) -> Result<PositionTree, TreeError> {
        let nodes = self.store.load_all_for_file(file_id).await?;
        TreeMaterializer::materialize(&nodes).map_err(|e| {
            if nodes.is_empty() {
                TreeError::not_found(format!("file '{}' has no positions", file_id))
            } else {
                tracing::warn!("Cannot materialize tree for file '{}': {}", file_id, e);
                e.into()
            }
        })
    }

    /// Insert a new root above the current root `root_id`
    ///
    /// `chess_move` leads from the new root to the former root, so it is
    /// stored on the former root. The former root becomes the new root's only
    /// child and every pre-existing node of the file moves one ply deeper.
    ///
    /// # Errors
    ///
    /// - `Validation` for a blank position or malformed move
    /// - `NotFound` if `root_id` does not exist
    /// - `Conflict` if `root_id` is not the file's root
    pub async fn insert_ancestor_above_root(
        &self,
        root_id: &str,
        position: String,
        chess_move: ChessMove,
    ) -> Result<PositionNode, TreeError> {
        validate_position(&position)?;
        chess_move.validate()?;

        let file_id = self.require_node(root_id).await?.file_id;
        let _guard = self.locks.acquire(&file_id).await;

        let nodes = self.store.load_all_for_file(&file_id).await?;
        let former_root = Self::find_loaded(&nodes, root_id)?;
        if !former_root.is_root() {
            return Err(TreeError::conflict(format!(
                "node '{}' is not the root of file '{}'",
                root_id, file_id
            )));
        }

        let new_root = PositionNode::new_root(file_id.clone(), position);

        // Reparent before inserting: the file never has two roots mid-unit
        let mut unit = UnitOfWork::new();
        unit.update(
            former_root.id.clone(),
            NodeUpdate::new()
                .with_parent(Some(new_root.id.clone()))
                .with_move(Some(chess_move))
                .with_ply(former_root.ply + 1)
                .with_sibling_order(0),
        );
        for node in nodes.iter().filter(|n| n.id != root_id) {
            unit.update(node.id.clone(), NodeUpdate::new().with_ply(node.ply + 1));
        }
        unit.insert(new_root.clone());
        self.store.run_atomically(unit).await?;

        tracing::debug!(
            "Inserted root '{}' above '{}' in file '{}' ({} node(s) deepened)",
            new_root.id,
            root_id,
            file_id,
            nodes.len()
        );
        self.emit_event(TreeEvent::RootReplaced {
            new_root: new_root.clone(),
            former_root_id: root_id.to_string(),
        });
        Ok(new_root)
    }
}
