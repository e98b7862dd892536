//! MemoryStore - In-Process NodeStore Implementation
//!
//! Keeps every record in hash maps behind a `tokio::sync::RwLock`. A unit of
//! work is applied to a copy of the state, checked against the same
//! constraints the SQL schema enforces (existing file, existing parent, one
//! root per file, no dangling children), and swapped in only when all of that
//! succeeds.
//!
//! Used by tests, benchmarks and embedders that don't need durability.

use crate::db::error::DatabaseError;
use crate::db::node_store::{
    AnnotationStore, FileStore, NodeStore, StoreOperation, UnitOfWork, UnitOutcome,
};
use crate::models::{Arrow, ChessFile, FileId, NodeId, Note, PositionNode};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    files: HashMap<FileId, ChessFile>,
    nodes: HashMap<NodeId, PositionNode>,
    notes: HashMap<String, Note>,
    arrows: HashMap<String, Arrow>,
}

/// Ids and files a unit touched, for commit-time checks
#[derive(Default)]
struct Touched {
    written: HashSet<NodeId>,
    deleted: HashSet<NodeId>,
    files: HashSet<FileId>,
}

impl MemoryState {
    fn apply(
        &mut self,
        operation: StoreOperation,
        outcome: &mut UnitOutcome,
        touched: &mut Touched,
    ) -> Result<(), DatabaseError> {
        match operation {
            StoreOperation::Insert(node) => {
                if self.nodes.contains_key(&node.id) {
                    return Err(DatabaseError::DuplicateId { id: node.id });
                }
                touched.files.insert(node.file_id.clone());
                touched.written.insert(node.id.clone());
                outcome.inserted.push(node.id.clone());
                self.nodes.insert(node.id.clone(), node);
            }
            StoreOperation::Update { id, update } => {
                let node = self
                    .nodes
                    .get_mut(&id)
                    .ok_or_else(|| DatabaseError::record_not_found(id.clone()))?;
                update.apply_to(node);
                touched.files.insert(node.file_id.clone());
                touched.written.insert(id.clone());
                outcome.updated.push(id);
            }
            StoreOperation::DeleteMany(ids) => {
                for id in ids {
                    if let Some(node) = self.nodes.remove(&id) {
                        touched.files.insert(node.file_id);
                        touched.deleted.insert(id.clone());
                        outcome.deleted.push(id);
                    }
                }
                let deleted = &touched.deleted;
                self.notes.retain(|_, note| !deleted.contains(&note.node_id));
                self.arrows.retain(|_, arrow| !deleted.contains(&arrow.node_id));
            }
        }
        Ok(())
    }

    fn check_constraints(&self, touched: &Touched) -> Result<(), DatabaseError> {
        for id in &touched.written {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            if !self.files.contains_key(&node.file_id) {
                return Err(DatabaseError::ConstraintViolation {
                    context: format!(
                        "FOREIGN KEY constraint failed: node '{}' references missing file '{}'",
                        id, node.file_id
                    ),
                });
            }
            if let Some(parent_id) = &node.parent_id {
                if !self.nodes.contains_key(parent_id) {
                    return Err(DatabaseError::ConstraintViolation {
                        context: format!(
                            "FOREIGN KEY constraint failed: node '{}' references missing parent '{}'",
                            id, parent_id
                        ),
                    });
                }
            }
        }

        if !touched.deleted.is_empty() {
            if let Some(orphan) = self.nodes.values().find(|n| {
                n.parent_id
                    .as_ref()
                    .is_some_and(|p| touched.deleted.contains(p))
            }) {
                return Err(DatabaseError::ConstraintViolation {
                    context: format!(
                        "FOREIGN KEY constraint failed: node '{}' references deleted parent",
                        orphan.id
                    ),
                });
            }
        }

        for file_id in &touched.files {
            let roots = self
                .nodes
                .values()
                .filter(|n| &n.file_id == file_id && n.is_root())
                .count();
            if roots > 1 {
                return Err(DatabaseError::ConstraintViolation {
                    context: format!("UNIQUE constraint failed: file '{}' has {} roots", file_id, roots),
                });
            }
        }

        Ok(())
    }
}

/// In-memory `NodeStore` + `FileStore` + `AnnotationStore`
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    /// Number of upcoming units to reject with `DatabaseError::Busy`
    busy_units: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `files` and `nodes`
    ///
    /// No constraints are checked, so tests can seed states the engine itself
    /// would never produce.
    pub fn with_nodes(files: Vec<ChessFile>, nodes: Vec<PositionNode>) -> Self {
        let state = MemoryState {
            files: files.into_iter().map(|f| (f.id.clone(), f)).collect(),
            nodes: nodes.into_iter().map(|n| (n.id.clone(), n)).collect(),
            ..Default::default()
        };
        Self {
            state: RwLock::new(state),
            busy_units: AtomicUsize::new(0),
        }
    }

    /// Make the next `count` units of work fail as if the store were locked
    pub fn fail_next_units_busy(&self, count: usize) {
        self.busy_units.store(count, Ordering::SeqCst);
    }

    /// Total number of stored nodes across all files
    pub async fn node_count(&self) -> usize {
        self.state.read().await.nodes.len()
    }

    fn take_busy_slot(&self) -> bool {
        self.busy_units
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl NodeStore for MemoryStore {
    async fn load_all_for_file(&self, file_id: &str) -> Result<Vec<PositionNode>, DatabaseError> {
        let state = self.state.read().await;
        Ok(state
            .nodes
            .values()
            .filter(|n| n.file_id == file_id)
            .cloned()
            .collect())
    }

    async fn get_node(&self, id: &str) -> Result<Option<PositionNode>, DatabaseError> {
        Ok(self.state.read().await.nodes.get(id).cloned())
    }

    async fn run_atomically(&self, unit: UnitOfWork) -> Result<UnitOutcome, DatabaseError> {
        if self.take_busy_slot() {
            return Err(DatabaseError::Busy {
                context: "memory store: simulated lock contention".to_string(),
            });
        }

        let mut state = self.state.write().await;
        let mut working = state.clone();
        let mut outcome = UnitOutcome::default();
        let mut touched = Touched::default();

        for operation in unit.into_operations() {
            working.apply(operation, &mut outcome, &mut touched)?;
        }
        working.check_constraints(&touched)?;

        *state = working;
        Ok(outcome)
    }
}

#[async_trait]
impl FileStore for MemoryStore {
    async fn insert_file(&self, file: ChessFile) -> Result<ChessFile, DatabaseError> {
        let mut state = self.state.write().await;
        if state.files.contains_key(&file.id) {
            return Err(DatabaseError::DuplicateId { id: file.id });
        }
        state.files.insert(file.id.clone(), file.clone());
        Ok(file)
    }

    async fn get_file(&self, id: &str) -> Result<Option<ChessFile>, DatabaseError> {
        Ok(self.state.read().await.files.get(id).cloned())
    }

    async fn list_files(&self) -> Result<Vec<ChessFile>, DatabaseError> {
        let state = self.state.read().await;
        let mut files: Vec<ChessFile> = state.files.values().cloned().collect();
        files.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(files)
    }
}

#[async_trait]
impl AnnotationStore for MemoryStore {
    async fn insert_note(&self, note: Note) -> Result<Note, DatabaseError> {
        let mut state = self.state.write().await;
        if !state.nodes.contains_key(&note.node_id) {
            return Err(DatabaseError::ConstraintViolation {
                context: format!("FOREIGN KEY constraint failed: note for missing node '{}'", note.node_id),
            });
        }
        if state.notes.contains_key(&note.id) {
            return Err(DatabaseError::DuplicateId { id: note.id });
        }
        state.notes.insert(note.id.clone(), note.clone());
        Ok(note)
    }

    async fn get_note(&self, id: &str) -> Result<Option<Note>, DatabaseError> {
        Ok(self.state.read().await.notes.get(id).cloned())
    }

    async fn list_notes(&self, node_id: &str) -> Result<Vec<Note>, DatabaseError> {
        let state = self.state.read().await;
        let mut notes: Vec<Note> = state
            .notes
            .values()
            .filter(|n| n.node_id == node_id)
            .cloned()
            .collect();
        notes.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(notes)
    }

    async fn update_note_text(
        &self,
        id: &str,
        text: String,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<Note>, DatabaseError> {
        let mut state = self.state.write().await;
        Ok(state.notes.get_mut(id).map(|note| {
            note.text = text;
            note.updated_at = Some(updated_at);
            note.clone()
        }))
    }

    async fn delete_note(&self, id: &str) -> Result<bool, DatabaseError> {
        Ok(self.state.write().await.notes.remove(id).is_some())
    }

    async fn insert_arrow(&self, arrow: Arrow) -> Result<Arrow, DatabaseError> {
        let mut state = self.state.write().await;
        if !state.nodes.contains_key(&arrow.node_id) {
            return Err(DatabaseError::ConstraintViolation {
                context: format!("FOREIGN KEY constraint failed: arrow for missing node '{}'", arrow.node_id),
            });
        }
        if state.arrows.contains_key(&arrow.id) {
            return Err(DatabaseError::DuplicateId { id: arrow.id });
        }
        state.arrows.insert(arrow.id.clone(), arrow.clone());
        Ok(arrow)
    }

    async fn list_arrows(&self, node_id: &str) -> Result<Vec<Arrow>, DatabaseError> {
        let state = self.state.read().await;
        let mut arrows: Vec<Arrow> = state
            .arrows
            .values()
            .filter(|a| a.node_id == node_id)
            .cloned()
            .collect();
        arrows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(arrows)
    }

    async fn delete_arrow(&self, id: &str) -> Result<bool, DatabaseError> {
        Ok(self.state.write().await.arrows.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArrowColor, ChessMove, NodeUpdate};

    fn study(id: &str) -> ChessFile {
        ChessFile {
            id: id.to_string(),
            ..ChessFile::new("Study", None).unwrap()
        }
    }

    fn line() -> (PositionNode, PositionNode, PositionNode) {
        let root = PositionNode::new_root("f".to_string(), "start".to_string());
        let a = PositionNode::new_child(&root, "a".to_string(), ChessMove::new("e2e4"), 0);
        let b = PositionNode::new_child(&a, "b".to_string(), ChessMove::new("e7e5"), 0);
        (root, a, b)
    }

    async fn seeded() -> (MemoryStore, PositionNode, PositionNode, PositionNode) {
        let (root, a, b) = line();
        let store = MemoryStore::new();
        store.insert_file(study("f")).await.unwrap();
        let mut unit = UnitOfWork::new();
        unit.insert(root.clone()).insert(a.clone()).insert(b.clone());
        store.run_atomically(unit).await.unwrap();
        (store, root, a, b)
    }

    #[tokio::test]
    async fn test_failed_unit_leaves_state_untouched() {
        let (store, root, a, _) = seeded().await;

        let mut unit = UnitOfWork::new();
        unit.update(a.id.clone(), NodeUpdate::new().with_position("changed".to_string()))
            .update("missing".to_string(), NodeUpdate::new().with_ply(3));

        let err = store.run_atomically(unit).await.unwrap_err();
        assert!(matches!(err, DatabaseError::RecordNotFound { .. }));

        let stored = store.get_node(&a.id).await.unwrap().unwrap();
        assert_eq!(stored.position, "a");
        assert_eq!(store.load_all_for_file(&root.file_id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_second_root_is_rejected_at_commit() {
        let (store, _, _, _) = seeded().await;
        let second = PositionNode::new_root("f".to_string(), "other".to_string());

        let err = store.insert(second).await.unwrap_err();
        assert!(matches!(err, DatabaseError::ConstraintViolation { .. }));
        assert_eq!(store.node_count().await, 3);
    }

    #[tokio::test]
    async fn test_intermediate_states_may_violate_constraints() {
        let (store, root, _, _) = seeded().await;
        let new_root = PositionNode::new_root("f".to_string(), "before start".to_string());

        // Insert first: two roots until the old root is reparented
        let mut unit = UnitOfWork::new();
        unit.insert(new_root.clone())
            .update(root.id.clone(), NodeUpdate::new().with_parent(Some(new_root.id.clone())));

        assert!(store.run_atomically(unit).await.is_ok());
    }

    #[tokio::test]
    async fn test_deleting_a_parent_without_children_is_rejected() {
        let (store, _, a, b) = seeded().await;

        let err = store.delete_many(vec![a.id.clone()]).await.unwrap_err();
        assert!(matches!(err, DatabaseError::ConstraintViolation { .. }));

        let deleted = store.delete_many(vec![b.id.clone(), a.id.clone()]).await.unwrap();
        assert_eq!(deleted, vec![b.id, a.id]);
    }

    #[tokio::test]
    async fn test_delete_removes_annotations() {
        let (store, _, _, b) = seeded().await;
        store
            .insert_note(Note::new(b.id.clone(), "critical").unwrap())
            .await
            .unwrap();
        store
            .insert_arrow(Arrow::new(b.id.clone(), "e2", "e4", ArrowColor::Green).unwrap())
            .await
            .unwrap();

        store.delete_many(vec![b.id.clone()]).await.unwrap();

        assert!(store.list_notes(&b.id).await.unwrap().is_empty());
        assert!(store.list_arrows(&b.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_node_of_unknown_file_is_rejected() {
        let (store, _, _, _) = seeded().await;
        let stray = PositionNode::new_root("no-such-file".to_string(), "start".to_string());

        let err = store.insert(stray).await.unwrap_err();
        assert!(matches!(err, DatabaseError::ConstraintViolation { .. }));
        assert_eq!(store.node_count().await, 3);
    }

    #[tokio::test]
    async fn test_files_list_newest_first() {
        let store = MemoryStore::new();
        let mut older = study("older");
        older.created_at = older.created_at - chrono::Duration::seconds(60);
        store.insert_file(older.clone()).await.unwrap();
        let newer = store.insert_file(study("newer")).await.unwrap();

        let ids: Vec<String> = store
            .list_files()
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.id)
            .collect();
        assert_eq!(ids, vec![newer.id, older.id.clone()]);

        let err = store.insert_file(older).await.unwrap_err();
        assert!(matches!(err, DatabaseError::DuplicateId { .. }));
    }

    #[tokio::test]
    async fn test_busy_injection_consumes_slots() {
        let (store, _, a, _) = seeded().await;
        store.fail_next_units_busy(1);

        let update = NodeUpdate::new().with_position("x".to_string());
        let first = store.update_fields(&a.id, update.clone()).await;
        assert!(matches!(first, Err(DatabaseError::Busy { .. })));
        assert!(store.update_fields(&a.id, update).await.is_ok());
    }
}
