use std::collections::BTreeMap;
use std::fmt::{self, Debug, Display};
use std::time::Duration;

use async_trait::async_trait;

use super::QueueError;

/// Queue attribute names and values, as reported by the backend.
pub type QueueAttributes = BTreeMap<String, String>;

/// Attribute holding a queue's visibility timeout, in seconds.
pub const VISIBILITY_TIMEOUT_ATTRIBUTE: &str = "VisibilityTimeout";

/// Opaque reference to a provisioned backend queue (a URL for SQS).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueHandle(String);

impl QueueHandle {
    /// Wraps a backend queue reference.
    #[must_use]
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    /// Returns the backend reference.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for QueueHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One delivery of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    /// Backend-assigned message id, stable across redeliveries.
    pub id: String,
    /// One-time capability for deleting this delivery.
    pub receipt_handle: String,
    /// The raw message body.
    pub body: String,
}

/// Options for a single receive round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveOptions {
    /// Maximum number of messages to return.
    pub max_messages: usize,
    /// How long the backend may wait for a message before returning empty.
    pub wait_time: Duration,
}

impl Default for ReceiveOptions {
    fn default() -> Self {
        Self {
            max_messages: 1,
            wait_time: Duration::from_secs(20),
        }
    }
}

/// Durable at-least-once queue with visibility timeout and long-poll receive.
#[async_trait]
pub trait MessageQueue: Send + Sync + Debug {
    /// Looks up or creates the named queue and returns its handle.
    async fn ensure_queue(
        &self,
        name: &str,
        attributes: &QueueAttributes,
    ) -> Result<QueueHandle, QueueError>;

    /// Sends a message and returns the backend-assigned message id.
    async fn send(&self, queue: &QueueHandle, body: &str) -> Result<String, QueueError>;

    /// Waits up to `options.wait_time` for messages. An empty result means the
    /// wait elapsed with nothing to deliver.
    async fn receive(
        &self,
        queue: &QueueHandle,
        options: ReceiveOptions,
    ) -> Result<Vec<ReceivedMessage>, QueueError>;

    /// Deletes one delivery by its receipt handle.
    async fn delete(&self, queue: &QueueHandle, receipt_handle: &str) -> Result<(), QueueError>;

    /// Returns the queue's attributes.
    async fn attributes(&self, queue: &QueueHandle) -> Result<QueueAttributes, QueueError>;
}
