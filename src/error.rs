//! Errors returned by client and job operations.

use thiserror::Error;

use crate::mq::QueueError;
use crate::storage::StorageError;

/// Errors returned by `RemoteJobClient` and `Job` operations.
///
/// The type is `Clone` so a single provisioning failure can be handed to
/// every call that was waiting on readiness.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteJobError {
    /// The queue name is not one of the configured queues.
    #[error("Unknown queue '{queue}'")]
    UnknownQueue {
        /// The logical queue name that was requested.
        queue: String,
    },

    /// No object exists under the key.
    #[error("Object not found: {key}")]
    NotFound {
        /// The missing key.
        key: String,
    },

    /// Creating the bucket or a queue failed. Terminal for the client.
    #[error("Provisioning {resource} failed: {message}")]
    Provisioning {
        /// The bucket or queue being provisioned.
        resource: String,
        /// The underlying failure.
        message: String,
    },

    /// An object store operation failed.
    #[error("{0}")]
    Storage(StorageError),

    /// A message queue operation failed.
    #[error("{0}")]
    Queue(#[from] QueueError),

    /// A message body could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The operation was cancelled before it completed.
    #[error("Operation cancelled")]
    Cancelled,
}

impl From<StorageError> for RemoteJobError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { key } => Self::NotFound { key },
            other => Self::Storage(other),
        }
    }
}

impl RemoteJobError {
    /// Returns a helpful suggestion for resolving this error.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::UnknownQueue { .. } => {
                "Only queues listed in [queues].names (or REMOTEJOB_QUEUES) are provisioned. \
                 Add the queue to the configuration and create a new client."
            }
            Self::NotFound { .. } => {
                "The object may have been removed or never existed. \
                 Check that the key is correct."
            }
            Self::Provisioning { .. } => {
                "The client could not create its bucket or queues and will not become ready. \
                 Check credentials, region and endpoint, then create a new client."
            }
            Self::Storage(err) => err.suggestion(),
            Self::Queue(err) => err.suggestion(),
            Self::Serialization(_) => {
                "The message body could not be encoded as JSON. \
                 This indicates corrupted metadata."
            }
            Self::Cancelled => "The caller cancelled the operation; no action is needed.",
        }
    }

    /// Returns a richly formatted error message with context and suggestions.
    #[must_use]
    pub fn display_rich(&self) -> String {
        format!("Error: {}\n\nSuggestion:\n  {}", self, self.suggestion())
    }
}
