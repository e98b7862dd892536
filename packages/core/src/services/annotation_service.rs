//! AnnotationService - Notes and Arrows on Positions
//!
//! Validates annotation input, checks that the annotated node exists and
//! delegates persistence to an `AnnotationStore`. Removal of annotations
//! together with their node happens in the store's unit of work, not here.

use crate::db::{AnnotationStore, NodeStore};
use crate::models::{normalize_note_text, Arrow, ArrowColor, Note};
use crate::services::error::TreeError;
use chrono::Utc;
use std::sync::Arc;

#[derive(Clone)]
pub struct AnnotationService {
    nodes: Arc<dyn NodeStore>,
    annotations: Arc<dyn AnnotationStore>,
}

impl AnnotationService {
    pub fn new(nodes: Arc<dyn NodeStore>, annotations: Arc<dyn AnnotationStore>) -> Self {
        Self { nodes, annotations }
    }

    /// Build the service over one backend implementing both store traits
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: NodeStore + AnnotationStore + 'static,
    {
        Self {
            nodes: store.clone(),
            annotations: store,
        }
    }

    async fn require_node(&self, node_id: &str) -> Result<(), TreeError> {
        match self.nodes.get_node(node_id).await? {
            Some(_) => Ok(()),
            None => Err(TreeError::node_not_found(node_id)),
        }
    }

    /// Attach a note to a node
    ///
    /// Text is trimmed; it must be non-empty and at most 2000 characters.
    pub async fn create_note(&self, node_id: &str, text: &str) -> Result<Note, TreeError> {
        let note = Note::new(node_id.to_string(), text)?;
        self.require_node(node_id).await?;
        // A concurrent delete of the node surfaces as a constraint conflict
        Ok(self.annotations.insert_note(note).await?)
    }

    /// Notes on a node, newest first
    pub async fn list_notes(&self, node_id: &str) -> Result<Vec<Note>, TreeError> {
        self.require_node(node_id).await?;
        Ok(self.annotations.list_notes(node_id).await?)
    }

    pub async fn update_note(&self, note_id: &str, text: &str) -> Result<Note, TreeError> {
        let text = normalize_note_text(text)?;
        self.annotations
            .update_note_text(note_id, text, Utc::now())
            .await?
            .ok_or_else(|| TreeError::not_found(format!("note '{}'", note_id)))
    }

    pub async fn delete_note(&self, note_id: &str) -> Result<(), TreeError> {
        if self.annotations.delete_note(note_id).await? {
            Ok(())
        } else {
            Err(TreeError::not_found(format!("note '{}'", note_id)))
        }
    }

    /// Draw an arrow on a node's board
    ///
    /// Squares are normalized to lowercase (`E2` -> `e2`); `color` must be
    /// red, green or blue.
    pub async fn create_arrow(
        &self,
        node_id: &str,
        from_square: &str,
        to_square: &str,
        color: &str,
    ) -> Result<Arrow, TreeError> {
        let color: ArrowColor = color.parse()?;
        let arrow = Arrow::new(node_id.to_string(), from_square, to_square, color)?;
        self.require_node(node_id).await?;
        Ok(self.annotations.insert_arrow(arrow).await?)
    }

    /// Arrows on a node, newest first
    pub async fn list_arrows(&self, node_id: &str) -> Result<Vec<Arrow>, TreeError> {
        self.require_node(node_id).await?;
        Ok(self.annotations.list_arrows(node_id).await?)
    }

    pub async fn delete_arrow(&self, arrow_id: &str) -> Result<(), TreeError> {
        if self.annotations.delete_arrow(arrow_id).await? {
            Ok(())
        } else {
            Err(TreeError::not_found(format!("arrow '{}'", arrow_id)))
        }
    }
}
