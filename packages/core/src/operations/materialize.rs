//! Tree materialization
//!
//! Converts the flat node list of one file into a nested `PositionTree`.
//! Construction runs in two iterative passes: a breadth-first walk from the
//! root fixes the visit order, then trees are assembled bottom-up by walking
//! that order in reverse, so every child tree is complete before its parent
//! claims it.

use crate::models::{PositionNode, PositionTree};
use crate::operations::error::OperationError;
use crate::operations::subtree::ChildIndex;
use std::collections::{HashMap, HashSet, VecDeque};

/// Builds nested trees from flat node sets
pub struct TreeMaterializer;

impl TreeMaterializer {
    /// Materialize `nodes` into a single root-rooted tree
    ///
    /// # Errors
    ///
    /// - `OperationError::NoRoot` if no node is parentless
    /// - `OperationError::MultipleRoots` if more than one node is parentless
    ///
    /// Nodes unreachable from the root (orphans whose parent is missing) are
    /// left out of the result and logged.
    pub fn materialize(nodes: &[PositionNode]) -> Result<PositionTree, OperationError> {
        let index = ChildIndex::build(nodes);

        let root = match index.roots() {
            [] => return Err(OperationError::NoRoot),
            [root] => *root,
            roots => {
                return Err(OperationError::MultipleRoots {
                    root_ids: roots.iter().map(|n| n.id.clone()).collect(),
                })
            }
        };

        // Pass 1: breadth-first visit order
        let mut order: Vec<&PositionNode> = Vec::with_capacity(nodes.len());
        let mut visited: HashSet<&str> = HashSet::with_capacity(nodes.len());
        let mut queue: VecDeque<&PositionNode> = VecDeque::from([root]);
        visited.insert(root.id.as_str());

        while let Some(node) = queue.pop_front() {
            order.push(node);
            for child in index.children_of(&node.id) {
                if visited.insert(child.id.as_str()) {
                    queue.push_back(child);
                }
            }
        }

        if order.len() < nodes.len() {
            tracing::warn!(
                "Materialized tree for root '{}' skipped {} unreachable node(s)",
                root.id,
                nodes.len() - order.len()
            );
        }

        // Pass 2: assemble bottom-up
        let mut built: HashMap<&str, PositionTree> = HashMap::with_capacity(order.len());
        for node in order.iter().rev() {
            let children = index
                .children_of(&node.id)
                .iter()
                .filter_map(|child| built.remove(child.id.as_str()))
                .collect();
            built.insert(
                node.id.as_str(),
                PositionTree {
                    node: (*node).clone(),
                    children,
                },
            );
        }

        built
            .remove(root.id.as_str())
            .ok_or_else(|| OperationError::node_not_found(root.id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChessMove;

    fn child(parent: &PositionNode, order: u32) -> PositionNode {
        PositionNode::new_child(parent, "p".to_string(), ChessMove::new("e2e4"), order)
    }

    fn ids(trees: &[PositionTree]) -> Vec<String> {
        trees.iter().map(|t| t.node.id.clone()).collect()
    }

    #[test]
    fn test_children_are_nested_in_rank_order() {
        let root = PositionNode::new_root("f".to_string(), "r".to_string());
        let c = child(&root, 1);
        let b = child(&root, 0);
        let b1 = child(&b, 0);
        // Deliberately shuffled input
        let nodes = vec![b1.clone(), c.clone(), root.clone(), b.clone()];

        let tree = TreeMaterializer::materialize(&nodes).unwrap();

        assert_eq!(tree.node.id, root.id);
        assert_eq!(ids(&tree.children), vec![b.id.clone(), c.id.clone()]);
        assert_eq!(ids(&tree.children[0].children), vec![b1.id]);
        assert!(tree.children[1].children.is_empty());
    }

    #[test]
    fn test_single_root_only() {
        let root = PositionNode::new_root("f".to_string(), "r".to_string());
        let tree = TreeMaterializer::materialize(&[root.clone()]).unwrap();
        assert_eq!(tree, PositionTree::leaf(root));
    }

    #[test]
    fn test_no_root_is_an_error() {
        assert_eq!(
            TreeMaterializer::materialize(&[]).unwrap_err(),
            OperationError::NoRoot
        );
    }

    #[test]
    fn test_multiple_roots_are_surfaced() {
        let a = PositionNode::new_root("f".to_string(), "a".to_string());
        let b = PositionNode::new_root("f".to_string(), "b".to_string());

        match TreeMaterializer::materialize(&[a.clone(), b.clone()]) {
            Err(OperationError::MultipleRoots { root_ids }) => {
                assert_eq!(root_ids.len(), 2);
                assert!(root_ids.contains(&a.id));
                assert!(root_ids.contains(&b.id));
            }
            other => panic!("expected MultipleRoots, got {:?}", other),
        }
    }

    #[test]
    fn test_round_trip_through_flatten() {
        let root = PositionNode::new_root("f".to_string(), "r".to_string());
        let a = child(&root, 0);
        let b = child(&root, 1);
        let c = child(&root, 2);
        let a1 = child(&a, 0);
        let a2 = child(&a, 1);
        let c1 = child(&c, 0);
        let c11 = child(&c1, 0);
        let nodes = vec![root, a, b, c, a1, a2, c1, c11];

        let tree = TreeMaterializer::materialize(&nodes).unwrap();
        let again = TreeMaterializer::materialize(&tree.flatten()).unwrap();

        assert_eq!(tree, again);
        assert_eq!(tree.node_count(), nodes.len());
    }

    #[test]
    fn test_orphans_are_skipped() {
        let root = PositionNode::new_root("f".to_string(), "r".to_string());
        let a = child(&root, 0);
        let mut orphan = child(&a, 0);
        orphan.parent_id = Some("gone".to_string());

        let tree = TreeMaterializer::materialize(&[root, a, orphan]).unwrap();
        assert_eq!(tree.node_count(), 2);
    }

    #[test]
    fn test_deep_line_materializes_iteratively() {
        let mut nodes = vec![PositionNode::new_root("f".to_string(), "r".to_string())];
        for _ in 0..20_000 {
            let next = child(nodes.last().unwrap(), 0);
            nodes.push(next);
        }

        let tree = TreeMaterializer::materialize(&nodes).unwrap();
        assert_eq!(tree.node_count(), nodes.len());
        assert_eq!(tree.flatten().len(), nodes.len());
    }
}
