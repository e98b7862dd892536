//! Annotation Data Structures
//!
//! Notes and arrows are attached to a single position node by id. They carry
//! no structure of their own; their lifetime is bound to the node they
//! annotate, so deleting a node deletes its annotations in the same unit of work.

use crate::models::node::{NodeId, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Maximum length of a note's text
pub const MAX_NOTE_LEN: usize = 2000;

/// Free-text comment on a position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub node_id: NodeId,
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Note {
    /// Create a note after trimming and validating `text`
    pub fn new(node_id: NodeId, text: &str) -> Result<Self, ValidationError> {
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            node_id,
            text: normalize_note_text(text)?,
            created_at: Utc::now(),
            updated_at: None,
        })
    }
}

/// Trim note text and enforce the non-empty and length rules
pub fn normalize_note_text(text: &str) -> Result<String, ValidationError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ValidationError::MissingField("text".to_string()));
    }
    if text.chars().count() > MAX_NOTE_LEN {
        return Err(ValidationError::FieldTooLong {
            field: "text".to_string(),
            max: MAX_NOTE_LEN,
        });
    }
    Ok(text.to_string())
}

/// Colors an arrow can be drawn in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrowColor {
    Red,
    Green,
    Blue,
}

impl ArrowColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArrowColor::Red => "red",
            ArrowColor::Green => "green",
            ArrowColor::Blue => "blue",
        }
    }
}

impl fmt::Display for ArrowColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArrowColor {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "red" => Ok(ArrowColor::Red),
            "green" => Ok(ArrowColor::Green),
            "blue" => Ok(ArrowColor::Blue),
            _ => Err(ValidationError::InvalidColor(s.to_string())),
        }
    }
}

/// Board arrow drawn on a position, from one square to another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Arrow {
    pub id: String,
    pub node_id: NodeId,
    pub from_square: String,
    pub to_square: String,
    pub color: ArrowColor,
    pub created_at: DateTime<Utc>,
}

impl Arrow {
    /// Create an arrow, normalizing both squares to lowercase
    pub fn new(
        node_id: NodeId,
        from_square: &str,
        to_square: &str,
        color: ArrowColor,
    ) -> Result<Self, ValidationError> {
        let from_square = normalize_square(from_square)?;
        let to_square = normalize_square(to_square)?;
        if from_square == to_square {
            return Err(ValidationError::InvalidArrow(
                "from and to squares must differ".to_string(),
            ));
        }

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            node_id,
            from_square,
            to_square,
            color,
            created_at: Utc::now(),
        })
    }
}

/// Normalize a square name like ` E2 ` to `e2`, rejecting anything off the board
pub fn normalize_square(square: &str) -> Result<String, ValidationError> {
    let normalized = square.trim().to_ascii_lowercase();
    let bytes = normalized.as_bytes();
    let valid = bytes.len() == 2
        && (b'a'..=b'h').contains(&bytes[0])
        && (b'1'..=b'8').contains(&bytes[1]);

    if valid {
        Ok(normalized)
    } else {
        Err(ValidationError::InvalidSquare(square.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_text_is_trimmed() {
        let note = Note::new("n1".to_string(), "  sharp line  ").unwrap();
        assert_eq!(note.text, "sharp line");
        assert!(note.updated_at.is_none());
    }

    #[test]
    fn test_note_rejects_blank_and_oversized_text() {
        assert_eq!(
            Note::new("n1".to_string(), "   ").unwrap_err(),
            ValidationError::MissingField("text".to_string())
        );
        let long = "x".repeat(MAX_NOTE_LEN + 1);
        assert!(matches!(
            Note::new("n1".to_string(), &long),
            Err(ValidationError::FieldTooLong { .. })
        ));
    }

    #[test]
    fn test_square_normalization() {
        assert_eq!(normalize_square(" E2 ").unwrap(), "e2");
        assert_eq!(normalize_square("h8").unwrap(), "h8");
        assert!(normalize_square("i1").is_err());
        assert!(normalize_square("a9").is_err());
        assert!(normalize_square("a10").is_err());
        assert!(normalize_square("").is_err());
    }

    #[test]
    fn test_arrow_requires_distinct_squares() {
        let result = Arrow::new("n1".to_string(), "e2", "E2", ArrowColor::Red);
        assert!(matches!(result, Err(ValidationError::InvalidArrow(_))));

        let arrow = Arrow::new("n1".to_string(), "E2", "e4", ArrowColor::Green).unwrap();
        assert_eq!(arrow.from_square, "e2");
        assert_eq!(arrow.to_square, "e4");
    }

    #[test]
    fn test_arrow_color_parsing() {
        assert_eq!("Red".parse::<ArrowColor>().unwrap(), ArrowColor::Red);
        assert_eq!(" blue ".parse::<ArrowColor>().unwrap(), ArrowColor::Blue);
        assert!(matches!(
            "purple".parse::<ArrowColor>(),
            Err(ValidationError::InvalidColor(_))
        ));
        assert_eq!(
            serde_json::to_value(ArrowColor::Green).unwrap(),
            serde_json::json!("green")
        );
    }
}
