use keepsake_core::error::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("Field `{field}` of {entity_type} is not a sequence")]
    NotASequence { entity_type: String, field: String },

    #[error("Index {index} out of bounds for `{field}` with {len} members")]
    IndexOutOfBounds {
        field: String,
        index: usize,
        len: usize,
    },
}

impl Error {
    /// The underlying core error, if any.
    pub fn as_core(&self) -> Option<&CoreError> {
        match self {
            Error::Core(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_dangling_reference(&self) -> bool {
        matches!(self, Error::Core(CoreError::DanglingReference { .. }))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Core(CoreError::Io(e))
    }
}
