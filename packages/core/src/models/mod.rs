//! Data Models
//!
//! This module contains the data structures shared by the engine and the
//! storage layer:
//!
//! - `ChessFile` - A named study file owning one tree
//! - `PositionNode` - One position in a study file's variation tree
//! - `PositionTree` - Nested, materialized view of a tree
//! - `NodeUpdate` / `PositionUpdate` - Partial updates (storage-level / caller-facing)
//! - `Note` / `Arrow` - Annotations attached to a position

mod annotation;
mod file;
mod node;

pub use annotation::{normalize_note_text, normalize_square, Arrow, ArrowColor, Note, MAX_NOTE_LEN};
pub use file::{ChessFile, MAX_FILE_NAME_LEN};
pub use node::{
    validate_position, ChessMove, FileId, NodeId, NodeUpdate, PositionNode, PositionTree,
    PositionUpdate, ValidationError, MAX_MOVE_SAN_LEN, MAX_MOVE_UCI_LEN,
};
