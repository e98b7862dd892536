//! Error types for the pure tree operations
//!
//! These errors describe structural problems detected while ordering,
//! collecting or materializing nodes. They carry no storage context; the
//! engine maps them onto its own taxonomy (`NotFound`, `Validation`).

use crate::models::NodeId;
use thiserror::Error;

/// Errors raised by `OrderIndexer`, `SubtreeCollector` and `TreeMaterializer`
///
/// # Examples
///
/// ```rust
/// use movetree_core::operations::OperationError;
///
/// let err = OperationError::SiblingCountMismatch { expected: 3, actual: 2 };
/// assert_eq!(
///     err.to_string(),
///     "Reorder list has 2 ids but the parent has 3 children"
/// );
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OperationError {
    /// The node set contains no node without a parent
    #[error("No root position found")]
    NoRoot,

    /// More than one parentless node exists in a single file.
    ///
    /// This is a data-integrity violation upstream; it is reported rather
    /// than resolved by picking one of the candidates.
    #[error("Multiple root positions found: {}", root_ids.join(", "))]
    MultipleRoots { root_ids: Vec<NodeId> },

    /// The starting node of a traversal is not part of the node set
    #[error("Node '{node_id}' does not exist")]
    NodeNotFound { node_id: NodeId },

    /// A reorder list does not have one entry per current child
    #[error("Reorder list has {actual} ids but the parent has {expected} children")]
    SiblingCountMismatch { expected: usize, actual: usize },

    /// A reorder list names the same child twice
    #[error("Node '{node_id}' appears more than once in the reorder list")]
    DuplicateSibling { node_id: NodeId },

    /// A reorder list names a node that is not a current child
    #[error("Node '{node_id}' is not a child of this parent")]
    UnknownSibling { node_id: NodeId },
}

impl OperationError {
    pub fn node_not_found(node_id: impl Into<NodeId>) -> Self {
        Self::NodeNotFound {
            node_id: node_id.into(),
        }
    }

    /// Whether the error reports a missing node or root
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NoRoot | Self::MultipleRoots { .. } | Self::NodeNotFound { .. }
        )
    }
}
