//! Error types for the WOPI host core.

/// WOPI host errors.
#[derive(Debug, thiserror::Error)]
pub enum WopiError {
    /// A routing or proof operation was invoked on the empty discovery document.
    #[error("the discovery document is empty and cannot be used to perform the requested action")]
    EmptyDocument,

    /// `handle` was invoked on the empty operation sentinel.
    #[error("an empty wopi operation cannot be handled; check is_empty before invoking")]
    EmptyOperation,

    /// The access token failed the pre-handling validity check.
    #[error("the access token has expired")]
    ExpiredAccessToken,

    /// The request was cancelled before or during handling.
    #[error("the operation was cancelled")]
    Cancelled,

    /// The file is not known to the repository (or not yet synchronized into it).
    #[error("file not found: {file_id}")]
    FileNotFound { file_id: String },

    /// The file exists but its status does not authorize sharing it.
    #[error("file {file_id} is not safe to share: status is {status}")]
    NotSafeToShare { file_id: String, status: String },

    /// The repository served a different version than the one requested.
    #[error("version mismatch for {file_id}: requested {requested}, served {served}")]
    VersionMismatch {
        file_id: String,
        requested: String,
        served: String,
    },

    /// The bytes served do not hash to the value recorded in the metadata.
    #[error("content hash mismatch for {file_id}: expected {expected}, got {actual}")]
    ContentHashMismatch {
        file_id: String,
        expected: String,
        actual: String,
    },

    /// A value failed its construction invariant.
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// Storage-layer failure reported by the file repository.
    #[error("storage error: {message}")]
    Storage { message: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl WopiError {
    /// Whether the error indicates served content failed its integrity contract.
    ///
    /// These are logged as security events, not mere client errors.
    pub fn is_integrity_violation(&self) -> bool {
        matches!(
            self,
            Self::VersionMismatch { .. } | Self::ContentHashMismatch { .. }
        )
    }

    /// Whether the error is a contract violation by the caller rather than a
    /// runtime condition.
    pub fn is_programming_error(&self) -> bool {
        matches!(self, Self::EmptyDocument | Self::EmptyOperation)
    }
}

/// Result type for WOPI host operations.
pub type WopiResult<T> = Result<T, WopiError>;
