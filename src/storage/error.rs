use thiserror::Error;

/// Errors that can occur when interacting with the object store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// The requested object was not found (HTTP 404).
    #[error("Object not found: {key}")]
    NotFound {
        /// The key of the object that was not found.
        key: String,
    },

    /// The bucket does not exist.
    #[error("Bucket not found: {bucket}")]
    NoSuchBucket {
        /// The bucket that was addressed.
        bucket: String,
    },

    /// Access denied (HTTP 403).
    #[error("Access denied to bucket '{bucket}'")]
    AccessDenied {
        /// The bucket that access was denied to.
        bucket: String,
    },

    /// Failed to connect to the storage endpoint.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Reading an object body failed part way through.
    #[error("Stream error: {0}")]
    Stream(String),

    /// Catch-all for other backend errors.
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Returns a helpful suggestion for resolving this error.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => {
                "The object may have been removed or never existed. \
                 Check that the key is correct and that it was stored in this bucket."
            }
            Self::NoSuchBucket { .. } => {
                "The bucket does not exist. Buckets are created when the client \
                 provisions its resources; check the configured bucket name."
            }
            Self::AccessDenied { .. } => {
                "Check that AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY are set correctly \
                 and that the credentials may read and write this bucket."
            }
            Self::ConnectionError(_) => {
                "Check that your S3 endpoint is correct and the service is running. \
                 For local development, ensure LocalStack or MinIO is started \
                 and S3_ENDPOINT points at it."
            }
            Self::Stream(_) => {
                "The connection dropped while the object body was being read. \
                 Retry the download."
            }
            Self::Backend(_) => {
                "An unexpected storage error occurred. Check the error message for details \
                 and verify your storage configuration is correct."
            }
        }
    }

    /// Returns a richly formatted error message with context and suggestions.
    #[must_use]
    pub fn display_rich(&self) -> String {
        format!("Error: {}\n\nSuggestion:\n  {}", self, self.suggestion())
    }

    /// Returns `true` if the error means the object does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
