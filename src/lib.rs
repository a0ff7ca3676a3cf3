//! remotejob - Remote Job Coordination over an Object Store and a Message Queue
//!
//! A producer stores a payload and enqueues a lightweight pointer to it;
//! workers pull pointers, fetch the payload, process it elsewhere and write
//! result assets back keyed by job id. Backends are S3 and SQS, or the
//! in-memory equivalents for tests and single-process use.

pub mod client;
pub mod config;
pub mod error;
pub mod job;
pub mod mq;
pub mod provision;
pub mod readiness;
pub mod storage;

pub use client::{ObjectRef, RemoteJobClient, StoreRequest};
pub use config::{load_config, validate_config, ConfigError, QueueSettings, RemoteJobConfig};
pub use error::RemoteJobError;
pub use job::{Asset, Job, JobOutcome, JobPayload};
pub use mq::{MemoryMessageQueue, MessageQueue, QueueError, SqsMessageQueue};
pub use readiness::ClientState;
pub use storage::{ByteStream, MemoryObjectStore, ObjectStore, S3ObjectStore, StorageError};

// Re-exported so callers can cancel `next` without a direct dependency.
pub use tokio_util::sync::CancellationToken;
