//! Per-file write serialization
//!
//! Structural operations read a file's nodes, compute a unit of work and
//! commit it. Holding the file's lock across all three steps keeps two such
//! operations on one file from interleaving inside this process.

use crate::models::FileId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Guard held for the duration of one structural operation
pub type FileGuard = OwnedMutexGuard<()>;

#[derive(Debug, Default)]
pub struct FileLocks {
    locks: Mutex<HashMap<FileId, Arc<Mutex<()>>>>,
}

impl FileLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `file_id`
    pub async fn acquire(&self, file_id: &str) -> FileGuard {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Drop entries nobody holds or waits on
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(file_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Number of files currently locked or awaited
    pub async fn active(&self) -> usize {
        self.locks
            .lock()
            .await
            .values()
            .filter(|lock| Arc::strong_count(lock) > 1)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_file_is_exclusive() {
        let locks = Arc::new(FileLocks::new());
        let guard = locks.acquire("f").await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire("f").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_different_files_do_not_block() {
        let locks = FileLocks::new();
        let _a = locks.acquire("a").await;
        let _b = tokio::time::timeout(Duration::from_millis(100), locks.acquire("b"))
            .await
            .unwrap();
        assert_eq!(locks.active().await, 2);
    }

    #[tokio::test]
    async fn test_released_locks_are_pruned() {
        let locks = FileLocks::new();
        drop(locks.acquire("a").await);
        drop(locks.acquire("b").await);
        assert_eq!(locks.active().await, 0);
    }
}
