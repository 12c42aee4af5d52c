use thiserror::Error;

#[derive(Error, Debug)]
pub enum TallyError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("question {index} out of bounds (quiz has {len} questions)")]
    OutOfRange { index: i64, len: usize },

    #[error("{0:?} contains illegal characters")]
    InvalidName(String),

    #[error("Title fetch failed: {0}")]
    FetchFailed(String),

    #[error("Persist failed: {0}")]
    PersistFailed(String),

    #[error("Load failed: {0}")]
    LoadFailed(String),
}

impl TallyError {
    /// True for errors caused by the caller's input rather than by infrastructure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::OutOfRange { .. } | Self::InvalidName(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, TallyError>;
