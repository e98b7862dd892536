//! Movetree Inspect Binary
//!
//! Prints the positions of one study file from a movetree database as JSON,
//! either as the flat `(ply, order)` list or as the nested tree. With
//! `--files` it lists the study files instead, newest first.
//!
//! # Usage
//!
//! ```bash
//! # Flat list
//! cargo run --bin movetree-inspect -- <file-id>
//!
//! # Nested tree
//! cargo run --bin movetree-inspect -- <file-id> --tree
//!
//! # Study files
//! cargo run --bin movetree-inspect -- --files
//!
//! # Another database
//! MOVETREE_DB_PATH=/tmp/study.db cargo run --bin movetree-inspect -- <file-id>
//! ```
//!
//! # Environment Variables
//!
//! - `MOVETREE_DB_PATH`, `MOVETREE_BUSY_TIMEOUT_MS`: see `EngineConfig`
//! - `RUST_LOG`: Logging level (e.g., "info", "debug"); logs go to stderr

use std::env;
use std::sync::Arc;

use movetree_core::db::{DatabaseService, TursoStore};
use movetree_core::logging::init_tracing;
use movetree_core::{EngineConfig, FileService, TreeEngine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let mut file_id = None;
    let mut as_tree = false;
    let mut list_files = false;
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--tree" => as_tree = true,
            "--files" => list_files = true,
            other if file_id.is_none() => file_id = Some(other.to_string()),
            other => anyhow::bail!("Unexpected argument '{}'", other),
        }
    }

    let config = EngineConfig::from_env()?;
    if !config.database_path.exists() {
        anyhow::bail!("No database at {}", config.database_path.display());
    }

    let db = Arc::new(DatabaseService::from_config(&config).await?);
    let store = Arc::new(TursoStore::new(db));

    if list_files {
        let files = FileService::new(store).list_files().await?;
        tracing::info!("{} file(s)", files.len());
        println!("{}", serde_json::to_string_pretty(&files)?);
        return Ok(());
    }

    let file_id = file_id
        .ok_or_else(|| anyhow::anyhow!("Usage: movetree-inspect <file-id> [--tree] | --files"))?;
    let engine = TreeEngine::with_config(store, &config);

    let output = if as_tree {
        serde_json::to_string_pretty(&engine.get_tree(&file_id).await?)?
    } else {
        let nodes = engine.get_flat_list(&file_id).await?;
        tracing::info!("{} position(s) in file '{}'", nodes.len(), file_id);
        serde_json::to_string_pretty(&nodes)?
    };
    println!("{}", output);

    Ok(())
}
