use thiserror::Error;

/// Failures of sticky-note operations, shared by the REST and gateway paths.
#[derive(Debug, Error)]
pub enum NoteError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("authentication required")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Persistence or role lookup failed.
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl NoteError {
    /// Stable code sent in gateway error replies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::InvalidInput(_) => "invalid_input",
            Self::Storage(_) => "internal",
        }
    }
}
