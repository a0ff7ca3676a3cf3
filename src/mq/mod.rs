//! Message queue abstraction carrying job pointers.
//!
//! Queues are at-least-once: a received message stays hidden for the queue's
//! visibility timeout and is redelivered unless deleted with its receipt
//! handle before then.

mod backend;
mod error;
mod memory;
mod sqs;

pub use backend::{
    MessageQueue, QueueAttributes, QueueHandle, ReceiveOptions, ReceivedMessage,
    VISIBILITY_TIMEOUT_ATTRIBUTE,
};
pub use error::QueueError;
pub use memory::MemoryMessageQueue;
pub use sqs::{SqsConfig, SqsMessageQueue};
