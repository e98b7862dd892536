//! Tree Events
//!
//! Events published by `TreeEngine` after a structural change has committed.
//! They follow the observer pattern: any number of subscribers receive them
//! through a `tokio::sync::broadcast` channel, and publishing with no
//! subscribers is not an error.
//!
//! # Event Flow
//!
//! 1. `TreeEngine` commits a unit of work through its `NodeStore`
//! 2. One `TreeEvent` describing the change is sent on the broadcast channel
//! 3. Subscribers (UI bridges, caches, tests) receive it asynchronously

use crate::models::{FileId, NodeId, PositionNode};
use serde::{Deserialize, Serialize};

/// Domain events describing committed tree changes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum TreeEvent {
    /// A root or child node was created
    #[serde(rename = "node:created")]
    NodeCreated {
        node: PositionNode,
        /// Siblings whose order was shifted to make room
        shifted: Vec<NodeId>,
    },

    /// Position or move fields of a node changed
    #[serde(rename = "node:updated")]
    NodeUpdated { node: PositionNode },

    /// A node and all of its descendants were removed
    #[serde(rename = "subtree:deleted")]
    SubtreeDeleted {
        file_id: FileId,
        root_id: NodeId,
        deleted: Vec<NodeId>,
    },

    /// Children of a parent received new orders
    #[serde(rename = "siblings:reordered")]
    SiblingsReordered {
        file_id: FileId,
        parent_id: NodeId,
        ordered_ids: Vec<NodeId>,
    },

    /// A new root was inserted above the former root
    #[serde(rename = "root:replaced")]
    RootReplaced {
        new_root: PositionNode,
        former_root_id: NodeId,
    },
}

impl TreeEvent {
    /// Get a string representation of the event type
    pub fn event_type(&self) -> &'static str {
        match self {
            TreeEvent::NodeCreated { .. } => "node:created",
            TreeEvent::NodeUpdated { .. } => "node:updated",
            TreeEvent::SubtreeDeleted { .. } => "subtree:deleted",
            TreeEvent::SiblingsReordered { .. } => "siblings:reordered",
            TreeEvent::RootReplaced { .. } => "root:replaced",
        }
    }

    /// The file whose tree changed
    pub fn file_id(&self) -> &str {
        match self {
            TreeEvent::NodeCreated { node, .. } | TreeEvent::NodeUpdated { node } => &node.file_id,
            TreeEvent::SubtreeDeleted { file_id, .. }
            | TreeEvent::SiblingsReordered { file_id, .. } => file_id,
            TreeEvent::RootReplaced { new_root, .. } => &new_root.file_id,
        }
    }
}
