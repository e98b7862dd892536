//! TursoStore - NodeStore Implementation for the libsql Backend
//!
//! This module implements `NodeStore`, `FileStore` and `AnnotationStore` on
//! top of `DatabaseService`.
//!
//! # Transactions
//!
//! `run_atomically` opens its own connection and wraps the whole unit in
//! `BEGIN IMMEDIATE` ... `COMMIT`. Taking the write lock up front means a
//! competing writer is detected before any statement runs; if the lock is not
//! granted within the busy timeout the unit fails with `DatabaseError::Busy`
//! and nothing was applied. Any statement error, or a deferred foreign key
//! failing at `COMMIT`, rolls the transaction back.
//!
//! # Examples
//!
//! ```rust,no_run
//! use movetree_core::db::{DatabaseService, NodeStore, TursoStore};
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let db = Arc::new(DatabaseService::new(PathBuf::from("./data/movetree.db")).await?);
//!     let store = TursoStore::new(db);
//!
//!     let nodes = store.load_all_for_file("file-1").await?;
//!     println!("{} positions", nodes.len());
//!     Ok(())
//! }
//! ```

use crate::db::error::DatabaseError;
use crate::db::node_store::{
    AnnotationStore, FileStore, NodeStore, StoreOperation, UnitOfWork, UnitOutcome,
};
use crate::db::DatabaseService;
use crate::models::{Arrow, ArrowColor, ChessFile, ChessMove, NodeUpdate, Note, PositionNode};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use libsql::{Connection, Row};
use std::sync::Arc;

const POSITION_COLUMNS: &str =
    "id, file_id, parent_id, position, move_uci, move_san, ply, sibling_order, created_at";

/// TursoStore implements the store traits for the libsql backend
pub struct TursoStore {
    db: Arc<DatabaseService>,
}

impl TursoStore {
    pub fn new(db: Arc<DatabaseService>) -> Self {
        Self { db }
    }

    /// Format a timestamp for storage
    ///
    /// Nanosecond RFC3339 in UTC: lossless, and sorts lexicographically.
    fn format_timestamp(ts: &DateTime<Utc>) -> String {
        ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
    }

    /// Parse a stored timestamp - RFC3339, or SQLite's "YYYY-MM-DD HH:MM:SS"
    fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(dt.with_timezone(&Utc));
        }

        if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
            return Ok(naive.and_utc());
        }

        Err(anyhow::anyhow!(
            "Unable to parse timestamp '{}' as RFC3339 or SQLite format",
            s
        ))
    }

    /// Convert a `positions` row (selected with `POSITION_COLUMNS`) to a node
    fn row_to_node(row: &Row) -> Result<PositionNode> {
        let id: String = row.get(0).context("Failed to get id")?;
        let file_id: String = row.get(1).context("Failed to get file_id")?;
        let parent_id: Option<String> = row.get(2).context("Failed to get parent_id")?;
        let position: String = row.get(3).context("Failed to get position")?;
        let move_uci: Option<String> = row.get(4).context("Failed to get move_uci")?;
        let move_san: Option<String> = row.get(5).context("Failed to get move_san")?;
        let ply: i64 = row.get(6).context("Failed to get ply")?;
        let sibling_order: i64 = row.get(7).context("Failed to get sibling_order")?;
        let created_at_str: String = row.get(8).context("Failed to get created_at")?;

        Ok(PositionNode {
            id,
            file_id,
            parent_id,
            position,
            chess_move: move_uci.map(|uci| ChessMove { uci, san: move_san }),
            ply: u32::try_from(ply).context("ply out of range")?,
            sibling_order: u32::try_from(sibling_order).context("sibling_order out of range")?,
            created_at: Self::parse_timestamp(&created_at_str)
                .context("Failed to parse created_at")?,
        })
    }

    fn row_to_file(row: &Row) -> Result<ChessFile> {
        let id: String = row.get(0).context("Failed to get id")?;
        let name: String = row.get(1).context("Failed to get name")?;
        let description: Option<String> = row.get(2).context("Failed to get description")?;
        let created_at_str: String = row.get(3).context("Failed to get created_at")?;

        Ok(ChessFile {
            id,
            name,
            description,
            created_at: Self::parse_timestamp(&created_at_str)
                .context("Failed to parse created_at")?,
        })
    }

    fn row_to_note(row: &Row) -> Result<Note> {
        let id: String = row.get(0).context("Failed to get id")?;
        let node_id: String = row.get(1).context("Failed to get node_id")?;
        let text: String = row.get(2).context("Failed to get text")?;
        let created_at_str: String = row.get(3).context("Failed to get created_at")?;
        let updated_at_str: Option<String> = row.get(4).context("Failed to get updated_at")?;

        Ok(Note {
            id,
            node_id,
            text,
            created_at: Self::parse_timestamp(&created_at_str)
                .context("Failed to parse created_at")?,
            updated_at: updated_at_str
                .as_deref()
                .map(Self::parse_timestamp)
                .transpose()
                .context("Failed to parse updated_at")?,
        })
    }

    fn row_to_arrow(row: &Row) -> Result<Arrow> {
        let id: String = row.get(0).context("Failed to get id")?;
        let node_id: String = row.get(1).context("Failed to get node_id")?;
        let from_square: String = row.get(2).context("Failed to get from_square")?;
        let to_square: String = row.get(3).context("Failed to get to_square")?;
        let color_str: String = row.get(4).context("Failed to get color")?;
        let created_at_str: String = row.get(5).context("Failed to get created_at")?;

        Ok(Arrow {
            id,
            node_id,
            from_square,
            to_square,
            color: color_str
                .parse::<ArrowColor>()
                .context("Failed to parse color")?,
            created_at: Self::parse_timestamp(&created_at_str)
                .context("Failed to parse created_at")?,
        })
    }

    async fn fetch_node(conn: &Connection, id: &str) -> Result<Option<PositionNode>, DatabaseError> {
        let mut stmt = conn
            .prepare(&format!("SELECT {} FROM positions WHERE id = ?", POSITION_COLUMNS))
            .await
            .map_err(|e| DatabaseError::from_statement("prepare get_node", e))?;
        let mut rows = stmt
            .query([id])
            .await
            .map_err(|e| DatabaseError::from_statement("get_node", e))?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::from_statement("read get_node row", e))?
        {
            Some(row) => Ok(Some(Self::row_to_node(&row)?)),
            None => Ok(None),
        }
    }

    async fn insert_node(conn: &Connection, node: &PositionNode) -> Result<(), DatabaseError> {
        conn.execute(
            "INSERT INTO positions (id, file_id, parent_id, position, move_uci, move_san, ply, sibling_order, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                node.id.as_str(),
                node.file_id.as_str(),
                node.parent_id.as_deref(),
                node.position.as_str(),
                node.chess_move.as_ref().map(|m| m.uci.as_str()),
                node.chess_move.as_ref().and_then(|m| m.san.as_deref()),
                node.ply as i64,
                node.sibling_order as i64,
                Self::format_timestamp(&node.created_at),
            ),
        )
        .await
        .map_err(|e| DatabaseError::from_statement(&format!("insert position {}", node.id), e))?;
        Ok(())
    }

    /// Read-modify-write inside the caller's transaction
    async fn update_node(
        conn: &Connection,
        id: &str,
        update: &NodeUpdate,
    ) -> Result<(), DatabaseError> {
        let mut node = Self::fetch_node(conn, id)
            .await?
            .ok_or_else(|| DatabaseError::record_not_found(id))?;
        update.apply_to(&mut node);

        conn.execute(
            "UPDATE positions SET parent_id = ?, position = ?, move_uci = ?, move_san = ?, ply = ?, sibling_order = ?
             WHERE id = ?",
            (
                node.parent_id.as_deref(),
                node.position.as_str(),
                node.chess_move.as_ref().map(|m| m.uci.as_str()),
                node.chess_move.as_ref().and_then(|m| m.san.as_deref()),
                node.ply as i64,
                node.sibling_order as i64,
                id,
            ),
        )
        .await
        .map_err(|e| DatabaseError::from_statement(&format!("update position {}", id), e))?;
        Ok(())
    }

    /// Delete one node and its annotations; returns whether the node existed
    async fn delete_node(conn: &Connection, id: &str) -> Result<bool, DatabaseError> {
        conn.execute("DELETE FROM notes WHERE node_id = ?", [id])
            .await
            .map_err(|e| DatabaseError::from_statement("delete notes", e))?;
        conn.execute("DELETE FROM arrows WHERE node_id = ?", [id])
            .await
            .map_err(|e| DatabaseError::from_statement("delete arrows", e))?;
        let affected = conn
            .execute("DELETE FROM positions WHERE id = ?", [id])
            .await
            .map_err(|e| DatabaseError::from_statement(&format!("delete position {}", id), e))?;
        Ok(affected > 0)
    }

    async fn apply_unit(conn: &Connection, unit: UnitOfWork) -> Result<UnitOutcome, DatabaseError> {
        let mut outcome = UnitOutcome::default();

        for operation in unit.into_operations() {
            match operation {
                StoreOperation::Insert(node) => {
                    Self::insert_node(conn, &node).await?;
                    outcome.inserted.push(node.id);
                }
                StoreOperation::Update { id, update } => {
                    Self::update_node(conn, &id, &update).await?;
                    outcome.updated.push(id);
                }
                StoreOperation::DeleteMany(ids) => {
                    for id in ids {
                        if Self::delete_node(conn, &id).await? {
                            outcome.deleted.push(id);
                        }
                    }
                }
            }
        }

        Ok(outcome)
    }

    async fn query_files(&self, sql: &str, params: Vec<String>) -> Result<Vec<ChessFile>, DatabaseError> {
        let conn = self.db.connect_with_timeout().await?;
        let mut stmt = conn
            .prepare(sql)
            .await
            .map_err(|e| DatabaseError::from_statement("prepare files query", e))?;
        let mut rows = stmt
            .query(params)
            .await
            .map_err(|e| DatabaseError::from_statement("files query", e))?;

        let mut files = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::from_statement("read file row", e))?
        {
            files.push(Self::row_to_file(&row)?);
        }
        Ok(files)
    }

    async fn query_notes(&self, sql: &str, key: &str) -> Result<Vec<Note>, DatabaseError> {
        let conn = self.db.connect_with_timeout().await?;
        let mut stmt = conn
            .prepare(sql)
            .await
            .map_err(|e| DatabaseError::from_statement("prepare notes query", e))?;
        let mut rows = stmt
            .query([key])
            .await
            .map_err(|e| DatabaseError::from_statement("notes query", e))?;

        let mut notes = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::from_statement("read note row", e))?
        {
            notes.push(Self::row_to_note(&row)?);
        }
        Ok(notes)
    }
}

#[async_trait]
impl NodeStore for TursoStore {
    async fn load_all_for_file(&self, file_id: &str) -> Result<Vec<PositionNode>, DatabaseError> {
        let conn = self.db.connect_with_timeout().await?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM positions WHERE file_id = ?",
                POSITION_COLUMNS
            ))
            .await
            .map_err(|e| DatabaseError::from_statement("prepare load_all_for_file", e))?;
        let mut rows = stmt
            .query([file_id])
            .await
            .map_err(|e| DatabaseError::from_statement("load_all_for_file", e))?;

        let mut nodes = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::from_statement("read position row", e))?
        {
            nodes.push(Self::row_to_node(&row)?);
        }
        Ok(nodes)
    }

    async fn get_node(&self, id: &str) -> Result<Option<PositionNode>, DatabaseError> {
        let conn = self.db.connect_with_timeout().await?;
        Self::fetch_node(&conn, id).await
    }

    async fn run_atomically(&self, unit: UnitOfWork) -> Result<UnitOutcome, DatabaseError> {
        if unit.is_empty() {
            return Ok(UnitOutcome::default());
        }

        let conn = self.db.connect_with_timeout().await?;
        let operations = unit.len();

        conn.execute("BEGIN IMMEDIATE", ())
            .await
            .map_err(|e| DatabaseError::from_statement("begin transaction", e))?;

        let outcome = match Self::apply_unit(&conn, unit).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let _rollback = conn.execute("ROLLBACK", ()).await;
                tracing::debug!("Rolled back unit of {} operation(s): {}", operations, e);
                return Err(e);
            }
        };

        if let Err(e) = conn.execute("COMMIT", ()).await {
            let _rollback = conn.execute("ROLLBACK", ()).await;
            return Err(DatabaseError::from_statement("commit transaction", e));
        }

        Ok(outcome)
    }
}

#[async_trait]
impl FileStore for TursoStore {
    async fn insert_file(&self, file: ChessFile) -> Result<ChessFile, DatabaseError> {
        let conn = self.db.connect_with_timeout().await?;
        conn.execute(
            "INSERT INTO files (id, name, description, created_at) VALUES (?, ?, ?, ?)",
            (
                file.id.as_str(),
                file.name.as_str(),
                file.description.as_deref(),
                Self::format_timestamp(&file.created_at),
            ),
        )
        .await
        .map_err(|e| DatabaseError::from_statement(&format!("insert file {}", file.id), e))?;
        Ok(file)
    }

    async fn get_file(&self, id: &str) -> Result<Option<ChessFile>, DatabaseError> {
        Ok(self
            .query_files(
                "SELECT id, name, description, created_at FROM files WHERE id = ?",
                vec![id.to_string()],
            )
            .await?
            .pop())
    }

    async fn list_files(&self) -> Result<Vec<ChessFile>, DatabaseError> {
        self.query_files(
            "SELECT id, name, description, created_at FROM files ORDER BY created_at DESC, id DESC",
            Vec::new(),
        )
        .await
    }
}

#[async_trait]
impl AnnotationStore for TursoStore {
    async fn insert_note(&self, note: Note) -> Result<Note, DatabaseError> {
        let conn = self.db.connect_with_timeout().await?;
        conn.execute(
            "INSERT INTO notes (id, node_id, text, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
            (
                note.id.as_str(),
                note.node_id.as_str(),
                note.text.as_str(),
                Self::format_timestamp(&note.created_at),
                note.updated_at.as_ref().map(Self::format_timestamp),
            ),
        )
        .await
        .map_err(|e| DatabaseError::from_statement("insert note", e))?;
        Ok(note)
    }

    async fn get_note(&self, id: &str) -> Result<Option<Note>, DatabaseError> {
        Ok(self
            .query_notes(
                "SELECT id, node_id, text, created_at, updated_at FROM notes WHERE id = ?",
                id,
            )
            .await?
            .pop())
    }

    async fn list_notes(&self, node_id: &str) -> Result<Vec<Note>, DatabaseError> {
        self.query_notes(
            "SELECT id, node_id, text, created_at, updated_at FROM notes
             WHERE node_id = ? ORDER BY created_at DESC, id DESC",
            node_id,
        )
        .await
    }

    async fn update_note_text(
        &self,
        id: &str,
        text: String,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<Note>, DatabaseError> {
        let conn = self.db.connect_with_timeout().await?;
        let affected = conn
            .execute(
                "UPDATE notes SET text = ?, updated_at = ? WHERE id = ?",
                (text, Self::format_timestamp(&updated_at), id),
            )
            .await
            .map_err(|e| DatabaseError::from_statement("update note", e))?;

        if affected == 0 {
            return Ok(None);
        }
        self.get_note(id).await
    }

    async fn delete_note(&self, id: &str) -> Result<bool, DatabaseError> {
        let conn = self.db.connect_with_timeout().await?;
        let affected = conn
            .execute("DELETE FROM notes WHERE id = ?", [id])
            .await
            .map_err(|e| DatabaseError::from_statement("delete note", e))?;
        Ok(affected > 0)
    }

    async fn insert_arrow(&self, arrow: Arrow) -> Result<Arrow, DatabaseError> {
        let conn = self.db.connect_with_timeout().await?;
        conn.execute(
            "INSERT INTO arrows (id, node_id, from_square, to_square, color, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            (
                arrow.id.as_str(),
                arrow.node_id.as_str(),
                arrow.from_square.as_str(),
                arrow.to_square.as_str(),
                arrow.color.as_str(),
                Self::format_timestamp(&arrow.created_at),
            ),
        )
        .await
        .map_err(|e| DatabaseError::from_statement("insert arrow", e))?;
        Ok(arrow)
    }

    async fn list_arrows(&self, node_id: &str) -> Result<Vec<Arrow>, DatabaseError> {
        let conn = self.db.connect_with_timeout().await?;
        let mut stmt = conn
            .prepare(
                "SELECT id, node_id, from_square, to_square, color, created_at FROM arrows
                 WHERE node_id = ? ORDER BY created_at DESC, id DESC",
            )
            .await
            .map_err(|e| DatabaseError::from_statement("prepare list_arrows", e))?;
        let mut rows = stmt
            .query([node_id])
            .await
            .map_err(|e| DatabaseError::from_statement("list_arrows", e))?;

        let mut arrows = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::from_statement("read arrow row", e))?
        {
            arrows.push(Self::row_to_arrow(&row)?);
        }
        Ok(arrows)
    }

    async fn delete_arrow(&self, id: &str) -> Result<bool, DatabaseError> {
        let conn = self.db.connect_with_timeout().await?;
        let affected = conn
            .execute("DELETE FROM arrows WHERE id = ?", [id])
            .await
            .map_err(|e| DatabaseError::from_statement("delete arrow", e))?;
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike};

    #[test]
    fn test_parse_timestamp_sqlite_format() {
        let dt = TursoStore::parse_timestamp("2025-01-15 10:30:45").unwrap();
        assert_eq!(dt.year(), 2025);
        assert_eq!(dt.month(), 1);
        assert_eq!(dt.hour(), 10);
        assert_eq!(dt.second(), 45);
    }

    #[test]
    fn test_timestamp_storage_is_lossless() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 8, 7, 6).unwrap()
            + chrono::Duration::nanoseconds(123_456_789);
        let stored = TursoStore::format_timestamp(&ts);
        assert_eq!(stored, "2024-03-09T08:07:06.123456789Z");
        assert_eq!(TursoStore::parse_timestamp(&stored).unwrap(), ts);
    }

    #[test]
    fn test_parse_timestamp_invalid() {
        assert!(TursoStore::parse_timestamp("not a timestamp").is_err());
    }
}
