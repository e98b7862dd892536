//! Dense sibling ordering
//!
//! Children of one parent are ranked `0..k-1` with no gaps or duplicates.
//! `OrderIndexer` computes the rank changes needed to keep that true across
//! insertion, removal and explicit reordering. It never writes anything: the
//! returned `OrderChange`s are turned into store updates by the caller and
//! committed in the same unit of work as the structural change they support.

use crate::models::{NodeId, NodeUpdate, PositionNode};
use crate::operations::error::OperationError;
use std::cmp::Ordering;
use std::collections::HashSet;

/// A single sibling rank change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderChange {
    pub node_id: NodeId,
    pub from: u32,
    pub to: u32,
}

impl OrderChange {
    pub fn to_update(&self) -> NodeUpdate {
        NodeUpdate::new().with_sibling_order(self.to)
    }
}

/// Computes sibling rank changes
pub struct OrderIndexer;

impl OrderIndexer {
    /// Sort siblings by their current rank
    ///
    /// Ties (only possible with corrupted data) are broken by creation time,
    /// then id, so the result is deterministic.
    pub fn sorted(siblings: &[PositionNode]) -> Vec<&PositionNode> {
        let mut sorted: Vec<&PositionNode> = siblings.iter().collect();
        sorted.sort_by(|a, b| Self::rank_cmp(a, b));
        sorted
    }

    /// Total order on siblings: rank, then creation time, then id
    pub fn rank_cmp(a: &PositionNode, b: &PositionNode) -> Ordering {
        a.sibling_order
            .cmp(&b.sibling_order)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    }

    /// Clamp a requested insertion index to `[0, sibling_count]`
    ///
    /// `None` means append.
    pub fn clamp_index(requested: Option<i64>, sibling_count: usize) -> u32 {
        let count = sibling_count as i64;
        let index = requested.map_or(count, |i| i.clamp(0, count));
        index as u32
    }

    /// Shift every sibling at sorted position `index` or later up by one,
    /// leaving rank `index` free for a new node.
    pub fn make_room_at(siblings: &[PositionNode], index: u32) -> Vec<OrderChange> {
        Self::sorted(siblings)
            .into_iter()
            .enumerate()
            .filter_map(|(position, node)| {
                let position = position as u32;
                let to = if position >= index {
                    position + 1
                } else {
                    position
                };
                Self::change(node, to)
            })
            .collect()
    }

    /// Reassign `0..k-1` to the remaining siblings, preserving relative order
    pub fn compact(siblings: &[PositionNode]) -> Vec<OrderChange> {
        Self::sorted(siblings)
            .into_iter()
            .enumerate()
            .filter_map(|(position, node)| Self::change(node, position as u32))
            .collect()
    }

    /// Rank each sibling by its index in `ordered_ids`
    ///
    /// `ordered_ids` must be a bijection onto the sibling id set; it is
    /// validated in full before any change is produced.
    pub fn apply_permutation(
        siblings: &[PositionNode],
        ordered_ids: &[NodeId],
    ) -> Result<Vec<OrderChange>, OperationError> {
        if ordered_ids.len() != siblings.len() {
            return Err(OperationError::SiblingCountMismatch {
                expected: siblings.len(),
                actual: ordered_ids.len(),
            });
        }

        let known: HashSet<&str> = siblings.iter().map(|n| n.id.as_str()).collect();
        let mut seen: HashSet<&str> = HashSet::with_capacity(ordered_ids.len());
        for id in ordered_ids {
            if !known.contains(id.as_str()) {
                return Err(OperationError::UnknownSibling {
                    node_id: id.clone(),
                });
            }
            if !seen.insert(id.as_str()) {
                return Err(OperationError::DuplicateSibling {
                    node_id: id.clone(),
                });
            }
        }

        Ok(ordered_ids
            .iter()
            .enumerate()
            .filter_map(|(position, id)| {
                siblings
                    .iter()
                    .find(|n| &n.id == id)
                    .and_then(|node| Self::change(node, position as u32))
            })
            .collect())
    }

    fn change(node: &PositionNode, to: u32) -> Option<OrderChange> {
        (node.sibling_order != to).then(|| OrderChange {
            node_id: node.id.clone(),
            from: node.sibling_order,
            to,
        })
    }
}
