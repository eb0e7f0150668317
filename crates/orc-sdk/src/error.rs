//! Error types for the site contract

/// Result type for site operations
pub type SiteResult<T> = Result<T, SiteError>;

/// A fault raised by a site during its own computation.
///
/// The engine never lets these propagate through the scheduler: the calling
/// branch halts and the fault is reported to the host.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SiteError {
    /// Wrong number of arguments
    #[error("{site}: expected {expected} arguments, got {got}")]
    ArityMismatch {
        /// Site name
        site: String,
        /// Expected argument count
        expected: usize,
        /// Actual argument count
        got: usize,
    },

    /// Argument of the wrong type
    #[error("{site}: expected {expected} for argument {index}, got {got}")]
    TypeMismatch {
        /// Site name
        site: String,
        /// Argument position
        index: usize,
        /// Expected type name
        expected: &'static str,
        /// Actual type name
        got: &'static str,
    },

    /// The target value cannot be called
    #[error("value of type {0} is not callable")]
    Uncallable(&'static str),

    /// Site-specific failure
    #[error("{0}")]
    Failed(String),
}

impl SiteError {
    /// Create a generic failure
    pub fn failed(msg: impl Into<String>) -> Self {
        SiteError::Failed(msg.into())
    }
}

impl From<String> for SiteError {
    fn from(s: String) -> Self {
        SiteError::Failed(s)
    }
}

impl From<&str> for SiteError {
    fn from(s: &str) -> Self {
        SiteError::Failed(s.to_string())
    }
}

/// Error returned when a call handle is used outside its contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    /// `publish`/`halt` was already called on this handle
    #[error("call handle already completed")]
    AlreadyCompleted,

    /// The calling scope was killed before the site completed
    #[error("call was cancelled")]
    Cancelled,
}
