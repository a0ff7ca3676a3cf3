use thiserror::Error;

/// Errors that can occur when interacting with the message queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The backend queue addressed by a handle does not exist.
    #[error("Queue does not exist: {queue}")]
    NoSuchQueue {
        /// The handle or name of the missing queue.
        queue: String,
    },

    /// The receipt handle is unknown, already used, or expired.
    #[error("Invalid receipt handle: {receipt_handle}")]
    InvalidReceiptHandle {
        /// The rejected receipt handle.
        receipt_handle: String,
    },

    /// Failed to connect to the queue endpoint.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Catch-all for other backend errors.
    #[error("Queue backend error: {0}")]
    Backend(String),
}

impl QueueError {
    /// Returns a helpful suggestion for resolving this error.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::NoSuchQueue { .. } => {
                "The queue may have been deleted after the client provisioned it. \
                 Create a new client to provision it again."
            }
            Self::InvalidReceiptHandle { .. } => {
                "The message was already acknowledged, or its visibility timeout \
                 elapsed and it was redelivered with a new receipt handle. \
                 Process messages within the visibility timeout."
            }
            Self::ConnectionError(_) => {
                "Check that your queue endpoint is correct and the service is running. \
                 For local development, ensure LocalStack is started \
                 and S3_ENDPOINT points at it."
            }
            Self::Backend(_) => {
                "An unexpected queue error occurred. Check the error message for details \
                 and verify your queue configuration is correct."
            }
        }
    }
}
