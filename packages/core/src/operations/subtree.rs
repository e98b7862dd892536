//! Descendant collection over a flat node set
//!
//! Tree shape is never stored on the nodes themselves. `ChildIndex` derives
//! the parent → children mapping from `parent_id`, and `SubtreeCollector`
//! walks it with an explicit work-list so a long variation line cannot
//! exhaust the call stack.

use crate::models::{NodeId, PositionNode};
use crate::operations::error::OperationError;
use crate::operations::sibling_order::OrderIndexer;
use std::collections::{HashMap, HashSet, VecDeque};

/// Parent id → children (sorted by sibling rank) for one node set
pub struct ChildIndex<'a> {
    children: HashMap<&'a str, Vec<&'a PositionNode>>,
    roots: Vec<&'a PositionNode>,
}

impl<'a> ChildIndex<'a> {
    pub fn build(nodes: &'a [PositionNode]) -> Self {
        let mut refs: HashMap<&'a str, Vec<&'a PositionNode>> = HashMap::new();
        let mut roots = Vec::new();

        for node in nodes {
            match node.parent_id.as_deref() {
                Some(parent_id) => refs.entry(parent_id).or_default().push(node),
                None => roots.push(node),
            }
        }

        for children in refs.values_mut() {
            children.sort_by(|a, b| OrderIndexer::rank_cmp(a, b));
        }

        Self {
            children: refs,
            roots,
        }
    }

    /// Children of `parent_id` in rank order (empty if it has none)
    pub fn children_of(&self, parent_id: &str) -> &[&'a PositionNode] {
        self.children
            .get(parent_id)
            .map(|c| c.as_slice())
            .unwrap_or(&[])
    }

    /// Parentless nodes in the set
    pub fn roots(&self) -> &[&'a PositionNode] {
        &self.roots
    }
}

/// Children of `parent_id` in rank order, cloned out of `nodes`
pub fn children_of(nodes: &[PositionNode], parent_id: &str) -> Vec<PositionNode> {
    let children: Vec<PositionNode> = nodes
        .iter()
        .filter(|n| n.parent_id.as_deref() == Some(parent_id))
        .cloned()
        .collect();
    OrderIndexer::sorted(&children)
        .into_iter()
        .cloned()
        .collect()
}

/// Finds every node below a starting node
pub struct SubtreeCollector;

impl SubtreeCollector {
    /// All descendants of `root_id` in breadth-first order, `root_id` excluded
    ///
    /// Nodes are visited at most once, so a corrupted parent cycle terminates.
    pub fn collect_descendants<'a>(
        nodes: &'a [PositionNode],
        root_id: &str,
    ) -> Result<Vec<&'a PositionNode>, OperationError> {
        if !nodes.iter().any(|n| n.id == root_id) {
            return Err(OperationError::node_not_found(root_id));
        }

        let index = ChildIndex::build(nodes);
        let mut visited: HashSet<&str> = HashSet::new();
        visited.insert(root_id);

        let mut descendants = Vec::new();
        let mut queue: VecDeque<&str> = VecDeque::from([root_id]);

        while let Some(current) = queue.pop_front() {
            for child in index.children_of(current) {
                if visited.insert(child.id.as_str()) {
                    descendants.push(*child);
                    queue.push_back(child.id.as_str());
                }
            }
        }

        Ok(descendants)
    }

    /// Ids of `root_id` and all of its descendants, `root_id` first
    pub fn collect_subtree_ids(
        nodes: &[PositionNode],
        root_id: &str,
    ) -> Result<Vec<NodeId>, OperationError> {
        let descendants = Self::collect_descendants(nodes, root_id)?;
        let mut ids = Vec::with_capacity(descendants.len() + 1);
        ids.push(root_id.to_string());
        ids.extend(descendants.into_iter().map(|n| n.id.clone()));
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChessMove;

    fn child(parent: &PositionNode, order: u32) -> PositionNode {
        PositionNode::new_child(
            parent,
            format!("{}-{}", parent.position, order),
            ChessMove::new("a2a3"),
            order,
        )
    }

    #[test]
    fn test_collects_all_descendants_excluding_start() {
        let root = PositionNode::new_root("f".to_string(), "r".to_string());
        let a = child(&root, 0);
        let b = child(&root, 1);
        let a1 = child(&a, 0);
        let a2 = child(&a, 1);
        let a1x = child(&a1, 0);
        let nodes = vec![root.clone(), a.clone(), b.clone(), a1.clone(), a2.clone(), a1x.clone()];

        let found: HashSet<String> = SubtreeCollector::collect_descendants(&nodes, &a.id)
            .unwrap()
            .into_iter()
            .map(|n| n.id.clone())
            .collect();

        let expected: HashSet<String> = [a1.id, a2.id, a1x.id].into_iter().collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_leaf_has_no_descendants() {
        let root = PositionNode::new_root("f".to_string(), "r".to_string());
        let a = child(&root, 0);
        let nodes = vec![root, a.clone()];

        assert!(SubtreeCollector::collect_descendants(&nodes, &a.id)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_unknown_start_is_not_found() {
        let root = PositionNode::new_root("f".to_string(), "r".to_string());
        assert_eq!(
            SubtreeCollector::collect_descendants(&[root], "missing").unwrap_err(),
            OperationError::node_not_found("missing")
        );
    }

    #[test]
    fn test_deep_line_does_not_overflow() {
        let mut nodes = vec![PositionNode::new_root("f".to_string(), "r".to_string())];
        for _ in 0..50_000 {
            let parent = nodes.last().unwrap();
            let next = PositionNode::new_child(parent, "p".to_string(), ChessMove::new("g1f3"), 0);
            nodes.push(next);
        }

        let root_id = nodes[0].id.clone();
        let ids = SubtreeCollector::collect_subtree_ids(&nodes, &root_id).unwrap();
        assert_eq!(ids.len(), nodes.len());
        assert_eq!(ids[0], root_id);
    }

    #[test]
    fn test_parent_cycle_terminates() {
        let root = PositionNode::new_root("f".to_string(), "r".to_string());
        let mut a = child(&root, 0);
        let b = child(&a, 0);
        // Corrupt: a claims b as its parent
        a.parent_id = Some(b.id.clone());
        let nodes = vec![root, a.clone(), b.clone()];

        let found = SubtreeCollector::collect_descendants(&nodes, &a.id).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, b.id);
    }

    #[test]
    fn test_children_of_is_sorted_by_rank() {
        let root = PositionNode::new_root("f".to_string(), "r".to_string());
        let second = child(&root, 1);
        let first = child(&root, 0);
        let nodes = vec![root.clone(), second.clone(), first.clone()];

        let ids: Vec<_> = children_of(&nodes, &root.id).into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }
}
