//! Sibling operation queue with retry on transient store conflicts
//!
//! This module wraps `TreeEngine`'s sibling-changing operations with automatic
//! retry and exponential backoff.
//!
//! # Why This Is Needed
//!
//! Inserting, reordering and deleting siblings rewrite the orders of every
//! child of a parent in one transaction. When another process holds the
//! database's write lock longer than the busy timeout, the engine reports a
//! transient `Conflict` and nothing is applied. Each engine call reloads the
//! file, so simply calling again recomputes the unit against fresh state.
//!
//! # Example
//!
//! ```rust,no_run
//! use movetree_core::db::MemoryStore;
//! use movetree_core::operations::SiblingOperationQueue;
//! use movetree_core::services::TreeEngine;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Arc::new(TreeEngine::new(Arc::new(MemoryStore::new())));
//! let queue = SiblingOperationQueue::new(engine, 3);
//!
//! // Up to 3 retries with backoff of 10ms, 20ms, 40ms
//! queue.reorder_with_retry("parent-id", &["b".to_string(), "a".to_string()]).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::EngineConfig;
use crate::models::{ChessMove, NodeId, PositionNode};
use crate::services::{TreeEngine, TreeError};
use std::future::Future;
use std::sync::Arc;
use tokio::time::Duration;

/// Base delay of the first retry; each further retry doubles it
const BASE_BACKOFF_MS: u64 = 10;

/// Queue for sibling operations with automatic retry on transient conflicts
pub struct SiblingOperationQueue {
    engine: Arc<TreeEngine>,
    max_retries: u32,
}

impl SiblingOperationQueue {
    /// Wrap `engine`; `max_retries` of 0 means a single attempt
    pub fn new(engine: Arc<TreeEngine>, max_retries: u32) -> Self {
        Self {
            engine,
            max_retries,
        }
    }

    /// Wrap `engine` with the retry budget from `config`
    pub fn from_config(engine: Arc<TreeEngine>, config: &EngineConfig) -> Self {
        Self::new(engine, config.max_retries)
    }

    pub fn engine(&self) -> &Arc<TreeEngine> {
        &self.engine
    }

    fn backoff(attempt: u32) -> Duration {
        Duration::from_millis(BASE_BACKOFF_MS.saturating_mul(1u64 << attempt.min(16)))
    }

    /// Run `op` until it succeeds, fails permanently, or retries run out
    ///
    /// # Retry Behavior
    ///
    /// - **Retry on**: `TreeError::is_transient()` only
    /// - **Backoff**: Exponential (10ms, 20ms, 40ms, 80ms, ...)
    /// - **Other errors**: Fail immediately without retry
    async fn with_retry<T, F, Fut>(&self, operation: &str, target: &str, op: F) -> Result<T, TreeError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, TreeError>>,
    {
        let mut attempt = 0;

        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::debug!(
                            "{} succeeded after {} retry(ies) for '{}'",
                            operation,
                            attempt,
                            target
                        );
                    }
                    return Ok(value);
                }

                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    tracing::debug!(
                        "Transient conflict on attempt {}/{} of {} for '{}': {}. Retrying...",
                        attempt + 1,
                        self.max_retries + 1,
                        operation,
                        target,
                        e
                    );
                    tokio::time::sleep(Self::backoff(attempt)).await;
                    attempt += 1;
                }

                Err(e) => {
                    if e.is_transient() {
                        tracing::warn!(
                            "Max retries ({}) exceeded for {} on '{}'",
                            self.max_retries,
                            operation,
                            target
                        );
                    }
                    return Err(e);
                }
            }
        }
    }

    /// `TreeEngine::create_child` with retry
    pub async fn create_child_with_retry(
        &self,
        parent_id: &str,
        position: String,
        chess_move: ChessMove,
        insert_at: Option<i64>,
    ) -> Result<PositionNode, TreeError> {
        let engine = &self.engine;
        self.with_retry("create_child", parent_id, move || {
            engine.create_child(parent_id, position.clone(), chess_move.clone(), insert_at)
        })
        .await
    }

    /// `TreeEngine::reorder_siblings` with retry
    pub async fn reorder_with_retry(
        &self,
        parent_id: &str,
        ordered_ids: &[NodeId],
    ) -> Result<Vec<PositionNode>, TreeError> {
        let engine = &self.engine;
        self.with_retry("reorder_siblings", parent_id, move || {
            engine.reorder_siblings(parent_id, ordered_ids)
        })
        .await
    }

    /// `TreeEngine::delete_subtree` with retry
    pub async fn delete_subtree_with_retry(&self, node_id: &str) -> Result<Vec<NodeId>, TreeError> {
        let engine = &self.engine;
        self.with_retry("delete_subtree", node_id, move || engine.delete_subtree(node_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    async fn setup(max_retries: u32) -> (Arc<MemoryStore>, SiblingOperationQueue, PositionNode) {
        let store = Arc::new(MemoryStore::new());
        let file = crate::services::FileService::new(store.clone())
            .create_file("Queue", None)
            .await
            .unwrap();
        let engine = Arc::new(TreeEngine::new(store.clone()));
        let root = engine.create_root(&file.id, "start".to_string()).await.unwrap();
        (store, SiblingOperationQueue::new(engine, max_retries), root)
    }

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(SiblingOperationQueue::backoff(0), Duration::from_millis(10));
        assert_eq!(SiblingOperationQueue::backoff(1), Duration::from_millis(20));
        assert_eq!(SiblingOperationQueue::backoff(3), Duration::from_millis(80));
    }

    #[tokio::test]
    async fn test_create_child_succeeds_after_transient_conflicts() {
        let (store, queue, root) = setup(3).await;
        store.fail_next_units_busy(2);

        let child = queue
            .create_child_with_retry(&root.id, "e4".to_string(), ChessMove::new("e2e4"), None)
            .await
            .unwrap();

        assert_eq!(child.sibling_order, 0);
        assert_eq!(store.node_count().await, 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let (store, queue, root) = setup(1).await;
        store.fail_next_units_busy(5);

        let err = queue
            .create_child_with_retry(&root.id, "e4".to_string(), ChessMove::new("e2e4"), None)
            .await
            .unwrap_err();

        assert!(err.is_transient());
        assert_eq!(store.node_count().await, 1);
    }

    #[tokio::test]
    async fn test_non_transient_errors_fail_immediately() {
        let (store, queue, root) = setup(3).await;
        store.fail_next_units_busy(1);

        // Forbidden is raised before any unit reaches the store
        let err = queue.delete_subtree_with_retry(&root.id).await.unwrap_err();
        assert!(matches!(err, TreeError::Forbidden(_)));

        // The injected busy slot is still unused
        let update = crate::models::NodeUpdate::new().with_position("x".to_string());
        assert!(crate::db::NodeStore::update_fields(store.as_ref(), &root.id, update)
            .await
            .is_err());
    }

    #[test]
    fn test_from_config_uses_retry_budget() {
        let engine = Arc::new(TreeEngine::new(Arc::new(MemoryStore::new())));
        let config = EngineConfig {
            max_retries: 7,
            ..EngineConfig::default()
        };
        assert_eq!(SiblingOperationQueue::from_config(engine, &config).max_retries, 7);
    }

    #[tokio::test]
    async fn test_reorder_with_retry() {
        let (store, queue, root) = setup(2).await;
        let engine = queue.engine().clone();
        let a = engine
            .create_child(&root.id, "a".to_string(), ChessMove::new("e2e4"), None)
            .await
            .unwrap();
        let b = engine
            .create_child(&root.id, "b".to_string(), ChessMove::new("d2d4"), None)
            .await
            .unwrap();

        store.fail_next_units_busy(1);
        let reordered = queue
            .reorder_with_retry(&root.id, &[b.id.clone(), a.id.clone()])
            .await
            .unwrap();

        let ids: Vec<_> = reordered.into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![b.id, a.id]);
    }
}
