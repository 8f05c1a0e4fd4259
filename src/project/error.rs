// Error type for everything that reads serialized project data

/// Project error types
///
/// Lookups that miss and duplicate ids are reported as plain `bool`/`Option`
/// results by the model itself; this enum only covers malformed input coming
/// from documents, snapshots and serialized undo history.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid project structure: {0}")]
    InvalidStructure(String),

    #[error("Missing attribute `{attribute}` on <{tag}>")]
    MissingAttribute { tag: String, attribute: String },

    #[error("Unexpected node <{found}>, expected <{expected}>")]
    UnexpectedTag { expected: String, found: String },

    #[error("Unknown undo action <{0}>")]
    UnknownAction(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("RON error: {0}")]
    Ron(#[from] ron::Error),
}
