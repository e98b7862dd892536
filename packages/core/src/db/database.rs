//! Database Connection Management
//!
//! This module opens the libsql database that backs `TursoStore` and owns its
//! schema.
//!
//! # Architecture
//!
//! - **Path-agnostic**: Accepts any valid PathBuf; missing parent directories are created
//! - **WAL mode**: Write-Ahead Logging so readers don't block the single writer
//! - **Foreign keys**: Enabled on every connection (the pragma is per-connection)
//! - **Busy timeout**: Configurable; a writer that cannot get the lock in time
//!   surfaces as `DatabaseError::Busy`
//!
//! # Schema
//!
//! - `files`: study files; every position belongs to one.
//! - `positions`: one row per tree node. The parent reference is a deferred
//!   foreign key so a unit of work may reference a node inserted later in the
//!   same transaction. A partial unique index allows one parentless row per file.
//! - `notes`, `arrows`: annotations keyed by position id, cascading on delete.
//!
//! # Database Connection Patterns
//!
//! Use `connect_with_timeout()` in async code. It applies the busy timeout and
//! enables foreign keys before the connection is handed out.
//!
//! ```no_run
//! # use movetree_core::db::DatabaseService;
//! # use std::path::PathBuf;
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let db_service = DatabaseService::new(PathBuf::from("./data/movetree.db")).await?;
//! let conn = db_service.connect_with_timeout().await?;
//! # Ok(())
//! # }
//! ```

use crate::config::{EngineConfig, DEFAULT_BUSY_TIMEOUT_MS};
use crate::db::error::DatabaseError;
use libsql::{Builder, Database};
use std::path::PathBuf;
use std::sync::Arc;

/// Database service for managing the libsql connection and schema
#[derive(Debug, Clone)]
pub struct DatabaseService {
    /// libsql database handle (wrapped in Arc for sharing)
    pub db: Arc<Database>,

    /// Path to the database file
    pub db_path: PathBuf,

    /// Busy timeout applied to every connection
    pub busy_timeout_ms: u64,
}

impl DatabaseService {
    /// Open (or create) the database at `db_path` with the default busy timeout
    ///
    /// This will:
    /// 1. Ensure the parent directory exists (create if needed)
    /// 2. Open/create the database file
    /// 3. Initialize the schema (CREATE TABLE IF NOT EXISTS)
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if:
    /// - Parent directory cannot be created
    /// - Database connection fails
    /// - Schema initialization fails
    pub async fn new(db_path: PathBuf) -> Result<Self, DatabaseError> {
        Self::with_busy_timeout(db_path, DEFAULT_BUSY_TIMEOUT_MS).await
    }

    /// Open the database described by `config`
    pub async fn from_config(config: &EngineConfig) -> Result<Self, DatabaseError> {
        Self::with_busy_timeout(config.database_path.clone(), config.busy_timeout_ms).await
    }

    pub async fn with_busy_timeout(
        db_path: PathBuf,
        busy_timeout_ms: u64,
    ) -> Result<Self, DatabaseError> {
        let is_new_database = !db_path.exists();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::PermissionDenied {
                        DatabaseError::permission_denied(db_path.clone())
                    } else {
                        DatabaseError::DirectoryCreationFailed(e)
                    }
                })?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        let service = Self {
            db: Arc::new(db),
            db_path,
            busy_timeout_ms,
        };

        service.initialize_schema(is_new_database).await?;

        tracing::info!(
            "Opened movetree database at {} (busy timeout {}ms)",
            service.db_path.display(),
            service.busy_timeout_ms
        );

        Ok(service)
    }

    /// Execute a PRAGMA statement
    ///
    /// PRAGMA statements return rows, so they go through query() rather than execute().
    async fn execute_pragma(
        &self,
        conn: &libsql::Connection,
        pragma: &str,
    ) -> Result<(), DatabaseError> {
        let mut stmt = conn.prepare(pragma).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        let _ = stmt.query(()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        Ok(())
    }

    /// Initialize database schema and configuration
    ///
    /// Idempotent: safe to run against an existing database.
    async fn initialize_schema(&self, is_new_database: bool) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        self.execute_pragma(&conn, "PRAGMA journal_mode = WAL")
            .await?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS files (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT,
                created_at TEXT NOT NULL
            )",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::initialization_failed(format!("Failed to create files table: {}", e))
        })?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS positions (
                id TEXT PRIMARY KEY,
                file_id TEXT NOT NULL,
                parent_id TEXT,
                position TEXT NOT NULL,
                move_uci TEXT,
                move_san TEXT,
                ply INTEGER NOT NULL CHECK (ply >= 0),
                sibling_order INTEGER NOT NULL CHECK (sibling_order >= 0),
                created_at TEXT NOT NULL,
                FOREIGN KEY (file_id) REFERENCES files(id),
                -- Checked at COMMIT so a unit may reparent onto a node it inserts later
                FOREIGN KEY (parent_id) REFERENCES positions(id) DEFERRABLE INITIALLY DEFERRED
            )",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::initialization_failed(format!("Failed to create positions table: {}", e))
        })?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS notes (
                id TEXT PRIMARY KEY,
                node_id TEXT NOT NULL,
                text TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT,
                FOREIGN KEY (node_id) REFERENCES positions(id) ON DELETE CASCADE
            )",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::initialization_failed(format!("Failed to create notes table: {}", e))
        })?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS arrows (
                id TEXT PRIMARY KEY,
                node_id TEXT NOT NULL,
                from_square TEXT NOT NULL,
                to_square TEXT NOT NULL,
                color TEXT NOT NULL CHECK (color IN ('red', 'green', 'blue')),
                created_at TEXT NOT NULL,
                FOREIGN KEY (node_id) REFERENCES positions(id) ON DELETE CASCADE
            )",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::initialization_failed(format!("Failed to create arrows table: {}", e))
        })?;

        self.create_indexes(&conn).await?;

        // Flush the fresh schema out of the WAL so other connections see it
        if is_new_database {
            self.execute_pragma(&conn, "PRAGMA wal_checkpoint(TRUNCATE)")
                .await?;
        }

        Ok(())
    }

    async fn create_indexes(&self, conn: &libsql::Connection) -> Result<(), DatabaseError> {
        let indexes = [
            (
                "idx_files_created",
                "CREATE INDEX IF NOT EXISTS idx_files_created ON files(created_at)",
            ),
            (
                "idx_positions_file",
                "CREATE INDEX IF NOT EXISTS idx_positions_file ON positions(file_id)",
            ),
            (
                "idx_positions_parent",
                "CREATE INDEX IF NOT EXISTS idx_positions_parent ON positions(parent_id)",
            ),
            (
                "idx_positions_one_root",
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_positions_one_root
                 ON positions(file_id) WHERE parent_id IS NULL",
            ),
            (
                "idx_notes_node",
                "CREATE INDEX IF NOT EXISTS idx_notes_node ON notes(node_id)",
            ),
            (
                "idx_arrows_node",
                "CREATE INDEX IF NOT EXISTS idx_arrows_node ON arrows(node_id)",
            ),
        ];

        for (name, sql) in indexes {
            conn.execute(sql, ()).await.map_err(|e| {
                DatabaseError::initialization_failed(format!("Failed to create index {}: {}", name, e))
            })?;
        }

        Ok(())
    }

    /// Get a raw connection without per-connection pragmas applied
    ///
    /// Only for synchronous, single-use contexts; prefer `connect_with_timeout()`.
    pub fn connect(&self) -> Result<libsql::Connection, DatabaseError> {
        self.db.connect().map_err(DatabaseError::LibsqlError)
    }

    /// Get a connection with the busy timeout set and foreign keys enabled
    pub async fn connect_with_timeout(&self) -> Result<libsql::Connection, DatabaseError> {
        let conn = self.connect()?;

        self.execute_pragma(&conn, &format!("PRAGMA busy_timeout = {}", self.busy_timeout_ms))
            .await?;
        self.execute_pragma(&conn, "PRAGMA foreign_keys = ON")
            .await?;

        Ok(conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn names(conn: &libsql::Connection, sql: &str) -> Vec<String> {
        let mut stmt = conn.prepare(sql).await.unwrap();
        let mut rows = stmt.query(()).await.unwrap();
        let mut names = Vec::new();
        while let Some(row) = rows.next().await.unwrap() {
            names.push(row.get::<String>(0).unwrap());
        }
        names
    }

    #[tokio::test]
    async fn test_database_creation() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let db_service = DatabaseService::new(db_path.clone()).await.unwrap();

        assert_eq!(db_service.db_path, db_path);
        assert_eq!(db_service.busy_timeout_ms, DEFAULT_BUSY_TIMEOUT_MS);
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_schema_initialization() {
        let temp_dir = TempDir::new().unwrap();
        let db_service = DatabaseService::new(temp_dir.path().join("test.db"))
            .await
            .unwrap();
        let conn = db_service.connect().unwrap();

        let tables = names(
            &conn,
            "SELECT name FROM sqlite_master WHERE type='table' ORDER BY name",
        )
        .await;
        assert!(tables.contains(&"files".to_string()));
        assert!(tables.contains(&"positions".to_string()));
        assert!(tables.contains(&"notes".to_string()));
        assert!(tables.contains(&"arrows".to_string()));

        let indexes = names(
            &conn,
            "SELECT name FROM sqlite_master WHERE type='index' AND name LIKE 'idx_%'",
        )
        .await;
        for expected in [
            "idx_files_created",
            "idx_positions_file",
            "idx_positions_parent",
            "idx_positions_one_root",
            "idx_notes_node",
            "idx_arrows_node",
        ] {
            assert!(indexes.contains(&expected.to_string()), "missing {}", expected);
        }
    }

    #[tokio::test]
    async fn test_connection_pragmas() {
        let temp_dir = TempDir::new().unwrap();
        let db_service = DatabaseService::with_busy_timeout(temp_dir.path().join("test.db"), 1234)
            .await
            .unwrap();
        let conn = db_service.connect_with_timeout().await.unwrap();

        let mut stmt = conn.prepare("PRAGMA foreign_keys").await.unwrap();
        let mut rows = stmt.query(()).await.unwrap();
        let enabled: i64 = rows.next().await.unwrap().unwrap().get(0).unwrap();
        assert_eq!(enabled, 1);

        let mut stmt = conn.prepare("PRAGMA journal_mode").await.unwrap();
        let mut rows = stmt.query(()).await.unwrap();
        let mode: String = rows.next().await.unwrap().unwrap().get(0).unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[tokio::test]
    async fn test_parent_directory_creation() {
        let temp_dir = TempDir::new().unwrap();
        let nested_path = temp_dir.path().join("nested").join("dirs").join("test.db");

        let _db_service = DatabaseService::new(nested_path.clone()).await.unwrap();

        assert!(nested_path.exists());
    }

    #[tokio::test]
    async fn test_idempotent_initialization() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let _first = DatabaseService::new(db_path.clone()).await.unwrap();
        let second = DatabaseService::new(db_path).await.unwrap();

        let conn = second.connect().unwrap();
        let tables = names(&conn, "SELECT name FROM sqlite_master WHERE type='table'").await;
        assert_eq!(tables.len(), 4);
    }

    #[tokio::test]
    async fn test_one_root_per_file_index() {
        let temp_dir = TempDir::new().unwrap();
        let db_service = DatabaseService::new(temp_dir.path().join("test.db"))
            .await
            .unwrap();
        let conn = db_service.connect_with_timeout().await.unwrap();
        for file_id in ["f1", "f2"] {
            conn.execute(
                "INSERT INTO files (id, name, created_at) VALUES (?, 'Study', '2024-01-01T00:00:00Z')",
                [file_id],
            )
            .await
            .unwrap();
        }

        let insert = "INSERT INTO positions (id, file_id, parent_id, position, ply, sibling_order, created_at)
                      VALUES (?, ?, NULL, 'start', 0, 0, '2024-01-01T00:00:00Z')";
        conn.execute(insert, ("r1", "f1")).await.unwrap();
        conn.execute(insert, ("r2", "f2")).await.unwrap();

        let err = conn.execute(insert, ("r3", "f1")).await.unwrap_err();
        assert!(err.to_string().contains("UNIQUE constraint failed"));
    }

    #[tokio::test]
    async fn test_positions_require_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let db_service = DatabaseService::new(temp_dir.path().join("test.db"))
            .await
            .unwrap();
        let conn = db_service.connect_with_timeout().await.unwrap();

        let err = conn
            .execute(
                "INSERT INTO positions (id, file_id, parent_id, position, ply, sibling_order, created_at)
                 VALUES ('r1', 'ghost', NULL, 'start', 0, 0, '2024-01-01T00:00:00Z')",
                (),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("FOREIGN KEY constraint failed"));
    }
}
