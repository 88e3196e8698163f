use thiserror::Error;

/// The error taxonomy shared by the repository, the image store adapter and
/// the note lifecycle. HTTP status mapping happens at the API boundary only.
#[derive(Debug, Error)]
pub enum Error {
    /// The referenced note id does not exist.
    #[error("note not found: {0}")]
    NotFound(String),

    /// A required text field is missing or an upload violates the size or
    /// format policy.
    #[error("{0}")]
    Validation(String),

    /// The client exceeded its request quota.
    #[error("too many requests, please try again later")]
    RateLimited,

    /// The image host rejected or failed an upload.
    #[error("image upload failed: {0}")]
    Upload(String),

    /// The image host could not be reached for a release.
    #[error("image store unavailable: {0}")]
    StoreUnavailable(String),

    /// The backing document store failed.
    #[error("storage error: {0}")]
    Storage(#[from] opendal::Error),

    /// A persisted document could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
