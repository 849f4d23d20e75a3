use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Missing value for required field `{field}` of {entity_type}")]
    MissingField { entity_type: String, field: String },

    #[error("Unexpected field `{field}` for {entity_type}")]
    UnexpectedField { entity_type: String, field: String },

    #[error("Unknown field `{field}` on {entity_type}")]
    UnknownField { entity_type: String, field: String },

    #[error("No transcoder for kind {kind}")]
    UnsupportedType { kind: String },

    #[error("Dangling reference: {entity_type} {id} has no stored record")]
    DanglingReference { entity_type: String, id: String },

    #[error("Corrupt record {entity_type}/{id}: {reason}")]
    CorruptRecord {
        entity_type: String,
        id: String,
        reason: String,
    },

    #[error("Entity type not registered: {0}")]
    UnknownType(String),

    #[error("Entity type already registered: {0}")]
    DuplicateType(String),

    #[error("Invalid schema for {entity_type}: {reason}")]
    InvalidSchema { entity_type: String, reason: String },

    #[error("Field `{field}` expects {expected}, got {found}")]
    TypeMismatch {
        field: String,
        expected: String,
        found: String,
    },

    #[error("Invalid value for `{field}`: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Invalid entity ID: {0}")]
    InvalidId(String),

    #[error("{entity_type} {id} has been deleted")]
    Deleted { entity_type: String, id: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Shorthand for a `CorruptRecord` error.
    pub fn corrupt(entity_type: &str, id: &str, reason: impl Into<String>) -> Self {
        CoreError::CorruptRecord {
            entity_type: entity_type.to_string(),
            id: id.to_string(),
            reason: reason.into(),
        }
    }
}
