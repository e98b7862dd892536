//! Position Node Data Structures
//!
//! This module defines `PositionNode`, one position in a study file's variation
//! tree, together with the move that produced it and the partial-update types
//! used by the engine and the storage layer.
//!
//! # Architecture
//!
//! - **Parent pointer only**: a node stores its `parent_id`; child lists are
//!   always derived by grouping nodes on that field
//! - **Opaque positions**: the board state string is never parsed
//! - **Dense ordering**: `sibling_order` ranks children of one parent as `0..k-1`
//!
//! # Examples
//!
//! ```rust
//! use movetree_core::models::{ChessMove, PositionNode};
//!
//! let root = PositionNode::new_root(
//!     "file-1".to_string(),
//!     "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1".to_string(),
//! );
//! let child = PositionNode::new_child(
//!     &root,
//!     "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1".to_string(),
//!     ChessMove::new("e2e4").with_san("e4"),
//!     0,
//! );
//! assert_eq!(child.ply, 1);
//! assert_eq!(child.parent_id.as_deref(), Some(root.id.as_str()));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Identifier of a position node (UUID v4 string)
pub type NodeId = String;

/// Identifier of the study file owning a tree
pub type FileId = String;

/// Maximum length of a move code (long algebraic / UCI form)
pub const MAX_MOVE_UCI_LEN: usize = 12;

/// Maximum length of a human-readable move notation
pub const MAX_MOVE_SAN_LEN: usize = 32;

/// Validation errors for model fields
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Field '{field}' exceeds maximum length of {max} characters")]
    FieldTooLong { field: String, max: usize },

    #[error("Invalid move: {0}")]
    InvalidMove(String),

    #[error("Invalid square '{0}': must be a file a-h followed by a rank 1-8")]
    InvalidSquare(String),

    #[error("Invalid arrow color '{0}': must be red, green or blue")]
    InvalidColor(String),

    #[error("Invalid arrow: {0}")]
    InvalidArrow(String),
}

/// The move leading from a parent position to a child position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChessMove {
    /// Move code, e.g. `e2e4` or `e7e8q`
    pub uci: String,

    /// Optional notation shown to the user, e.g. `e4` or `exd5+`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub san: Option<String>,
}

impl ChessMove {
    pub fn new(uci: impl Into<String>) -> Self {
        Self {
            uci: uci.into(),
            san: None,
        }
    }

    pub fn with_san(mut self, san: impl Into<String>) -> Self {
        self.san = Some(san.into());
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.uci.trim().is_empty() {
            return Err(ValidationError::MissingField("move.uci".to_string()));
        }
        if self.uci.chars().count() > MAX_MOVE_UCI_LEN {
            return Err(ValidationError::FieldTooLong {
                field: "move.uci".to_string(),
                max: MAX_MOVE_UCI_LEN,
            });
        }
        if let Some(san) = &self.san {
            if san.chars().count() > MAX_MOVE_SAN_LEN {
                return Err(ValidationError::FieldTooLong {
                    field: "move.san".to_string(),
                    max: MAX_MOVE_SAN_LEN,
                });
            }
        }
        Ok(())
    }
}

/// Check that an opaque position string is usable
pub fn validate_position(position: &str) -> Result<(), ValidationError> {
    if position.trim().is_empty() {
        return Err(ValidationError::MissingField("position".to_string()));
    }
    Ok(())
}

/// One position in one file's variation tree.
///
/// # Fields
///
/// - `id`: Unique identifier assigned on creation
/// - `file_id`: Owning file; all nodes sharing it form one tree
/// - `parent_id`: Parent node in the same file (`None` marks the root)
/// - `position`: Opaque board state
/// - `chess_move`: Move from the parent to this node (absent on the root)
/// - `ply`: Depth in half-moves (root is 0)
/// - `sibling_order`: Dense rank among nodes sharing `parent_id`
/// - `created_at`: Creation timestamp, never modified
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionNode {
    pub id: NodeId,

    pub file_id: FileId,

    pub parent_id: Option<NodeId>,

    pub position: String,

    #[serde(rename = "move", default, skip_serializing_if = "Option::is_none")]
    pub chess_move: Option<ChessMove>,

    pub ply: u32,

    pub sibling_order: u32,

    pub created_at: DateTime<Utc>,
}

impl PositionNode {
    /// Create a root node (no parent, ply 0, order 0) with a fresh UUID
    pub fn new_root(file_id: FileId, position: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            file_id,
            parent_id: None,
            position,
            chess_move: None,
            ply: 0,
            sibling_order: 0,
            created_at: Utc::now(),
        }
    }

    /// Create a child of `parent` at the given sibling rank
    ///
    /// The file, parent reference and ply are derived from `parent`.
    pub fn new_child(
        parent: &PositionNode,
        position: String,
        chess_move: ChessMove,
        sibling_order: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            file_id: parent.file_id.clone(),
            parent_id: Some(parent.id.clone()),
            position,
            chess_move: Some(chess_move),
            ply: parent.ply + 1,
            sibling_order,
            created_at: Utc::now(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Validate the user-supplied fields of this node
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_position(&self.position)?;
        match (&self.parent_id, &self.chess_move) {
            (None, Some(_)) => Err(ValidationError::InvalidMove(
                "a root position cannot carry a move".to_string(),
            )),
            (Some(_), None) => Err(ValidationError::MissingField("move".to_string())),
            (_, Some(mv)) => mv.validate(),
            (None, None) => Ok(()),
        }
    }
}

/// Storage-level partial update of a node.
///
/// Only provided fields are written. Nullable fields use the double-Option
/// pattern:
///
/// - `None`: Don't change this field
/// - `Some(None)`: Set the field to NULL
/// - `Some(Some(value))`: Set the field to `value`
///
/// The engine is the only producer of structural updates (`parent_id`, `ply`,
/// `sibling_order`); callers go through [`PositionUpdate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeUpdate {
    pub position: Option<String>,
    pub chess_move: Option<Option<ChessMove>>,
    pub parent_id: Option<Option<NodeId>>,
    pub ply: Option<u32>,
    pub sibling_order: Option<u32>,
}

impl NodeUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_position(mut self, position: String) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_move(mut self, chess_move: Option<ChessMove>) -> Self {
        self.chess_move = Some(chess_move);
        self
    }

    pub fn with_parent(mut self, parent_id: Option<NodeId>) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_ply(mut self, ply: u32) -> Self {
        self.ply = Some(ply);
        self
    }

    pub fn with_sibling_order(mut self, sibling_order: u32) -> Self {
        self.sibling_order = Some(sibling_order);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_none()
            && self.chess_move.is_none()
            && self.parent_id.is_none()
            && self.ply.is_none()
            && self.sibling_order.is_none()
    }

    /// Apply the provided fields to `node` in place
    pub fn apply_to(&self, node: &mut PositionNode) {
        if let Some(position) = &self.position {
            node.position = position.clone();
        }
        if let Some(chess_move) = &self.chess_move {
            node.chess_move = chess_move.clone();
        }
        if let Some(parent_id) = &self.parent_id {
            node.parent_id = parent_id.clone();
        }
        if let Some(ply) = self.ply {
            node.ply = ply;
        }
        if let Some(sibling_order) = self.sibling_order {
            node.sibling_order = sibling_order;
        }
    }
}

/// Caller-facing update of a node's content fields.
///
/// Structural fields are deliberately absent: parent, ply and sibling order
/// only change through the engine's structural operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,

    #[serde(rename = "move", default, skip_serializing_if = "Option::is_none")]
    pub chess_move: Option<ChessMove>,
}

impl PositionUpdate {
    pub fn is_empty(&self) -> bool {
        self.position.is_none() && self.chess_move.is_none()
    }

    pub(crate) fn into_node_update(self) -> NodeUpdate {
        NodeUpdate {
            position: self.position,
            chess_move: self.chess_move.map(Some),
            ..Default::default()
        }
    }
}

/// A node together with its ordered children
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionTree {
    #[serde(flatten)]
    pub node: PositionNode,
    pub children: Vec<PositionTree>,
}

impl PositionTree {
    pub fn leaf(node: PositionNode) -> Self {
        Self {
            node,
            children: Vec::new(),
        }
    }

    /// Total number of nodes in this tree
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(tree) = stack.pop() {
            count += 1;
            stack.extend(tree.children.iter());
        }
        count
    }

    /// Flatten the tree back into nodes in pre-order (parent before its children)
    pub fn flatten(&self) -> Vec<PositionNode> {
        let mut nodes = Vec::with_capacity(self.node_count());
        let mut stack = vec![self];
        while let Some(tree) = stack.pop() {
            nodes.push(tree.node.clone());
            stack.extend(tree.children.iter().rev());
        }
        nodes
    }
}

impl Drop for PositionTree {
    // Unlink children onto a heap stack so deep lines don't recurse on drop
    fn drop(&mut self) {
        let mut stack = std::mem::take(&mut self.children);
        while let Some(mut tree) = stack.pop() {
            stack.append(&mut tree.children);
        }
    }
}
