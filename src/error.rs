use thiserror::Error;

/// Main error type for Prosograph
#[derive(Error, Debug)]
pub enum ProsographError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored JSON could not be (de)serialized
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Entity type not present in the catalog
    #[error("Unknown entity type: {0}")]
    UnknownEntityType(String),

    /// Relation kind not present in the registry
    #[error("Unknown relation kind: {0}")]
    UnknownRelationKind(String),

    /// Relation endpoints disagree with the kind's declared types
    #[error("Relation kind {kind} connects {expected}, got {actual}")]
    RelationTypeMismatch {
        kind: String,
        expected: String,
        actual: String,
    },

    /// Entity not found
    #[error("Entity not found: {entity_type} {id}")]
    EntityNotFound { entity_type: String, id: i64 },

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl ProsographError {
    /// Data-model mismatches that must surface instead of being recovered locally.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ProsographError::Config(_)
                | ProsographError::UnknownEntityType(_)
                | ProsographError::UnknownRelationKind(_)
                | ProsographError::RelationTypeMismatch { .. }
        )
    }
}

/// Convenient Result type using ProsographError
pub type Result<T> = std::result::Result<T, ProsographError>;
