//! Study files
//!
//! A `ChessFile` owns one variation tree. Positions reference it through
//! `file_id`, and a root can only be created for a file that exists.

use crate::models::node::{FileId, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum length of a file name
pub const MAX_FILE_NAME_LEN: usize = 200;

/// A named study file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChessFile {
    pub id: FileId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ChessFile {
    /// Create a file with a fresh UUID
    ///
    /// The name is trimmed and must be non-empty. A blank description is
    /// stored as `None`.
    pub fn new(name: &str, description: Option<&str>) -> Result<Self, ValidationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::MissingField("name".to_string()));
        }
        if name.chars().count() > MAX_FILE_NAME_LEN {
            return Err(ValidationError::FieldTooLong {
                field: "name".to_string(),
                max: MAX_FILE_NAME_LEN,
            });
        }

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: description
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
            created_at: Utc::now(),
        })
    }
}
