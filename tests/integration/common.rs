//! Common test utilities.
//!
//! Most helpers build clients over the in-memory backends. `aws_client` reads
//! its configuration from environment variables with LocalStack defaults:
//!
//! ```bash
//! export S3_ENDPOINT=http://localhost:4566 AWS_ACCESS_KEY_ID=test AWS_SECRET_ACCESS_KEY=test
//! cargo test --test integration --features integration
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use remotejob::mq::{
    MemoryMessageQueue, MessageQueue, QueueAttributes, QueueError, QueueHandle, ReceiveOptions,
    ReceivedMessage,
};
use remotejob::storage::{
    ByteStream, MemoryObjectStore, Metadata, ObjectMetadata, ObjectStore, StorageError,
    StoredObject,
};
use remotejob::{RemoteJobClient, RemoteJobConfig};
use tokio::sync::{Mutex, Semaphore};
use uuid::Uuid;

pub const TEST_BUCKET: &str = "remotejob-test";

/// A client together with the in-memory backends behind it.
pub struct Harness {
    pub client: RemoteJobClient,
    pub store: Arc<MemoryObjectStore>,
    pub queue: Arc<MemoryMessageQueue>,
}

/// Default test configuration: one `pending` queue and a short long-poll.
#[must_use]
pub fn test_config() -> RemoteJobConfig {
    RemoteJobConfig::new(TEST_BUCKET).with_wait_time_seconds(1)
}

/// Creates a client over fresh in-memory backends without waiting for it to
/// become ready.
#[must_use]
pub fn memory_client(config: RemoteJobConfig) -> Harness {
    let store = Arc::new(MemoryObjectStore::new());
    let queue = Arc::new(MemoryMessageQueue::new());
    let client = RemoteJobClient::new(
        config,
        Arc::clone(&store) as Arc<dyn ObjectStore>,
        Arc::clone(&queue) as Arc<dyn MessageQueue>,
    );
    Harness {
        client,
        store,
        queue,
    }
}

/// Creates a ready client over fresh in-memory backends.
///
/// # Panics
///
/// Panics if provisioning fails.
pub async fn ready_client(config: RemoteJobConfig) -> Harness {
    let harness = memory_client(config);
    harness
        .client
        .ready()
        .await
        .expect("in-memory provisioning failed");
    harness
}

/// Object store whose bucket provisioning blocks until `release` is called,
/// and which records the keys of every `put` in call order.
#[derive(Debug)]
pub struct GatedStore {
    inner: MemoryObjectStore,
    gate: Semaphore,
    refuse_bucket: bool,
    puts: Mutex<Vec<String>>,
}

impl GatedStore {
    /// A store that provisions successfully once released.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: MemoryObjectStore::new(),
            gate: Semaphore::new(0),
            refuse_bucket: false,
            puts: Mutex::new(Vec::new()),
        }
    }

    /// A store that refuses to create the bucket once released.
    #[must_use]
    pub fn refusing() -> Self {
        Self {
            refuse_bucket: true,
            ..Self::new()
        }
    }

    /// Lets bucket provisioning proceed.
    pub fn release(&self) {
        self.gate.add_permits(1);
    }

    /// Keys written so far, in call order.
    pub async fn puts(&self) -> Vec<String> {
        self.puts.lock().await.clone()
    }
}

#[async_trait]
impl ObjectStore for GatedStore {
    async fn ensure_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        if self.refuse_bucket {
            return Err(StorageError::AccessDenied {
                bucket: bucket.to_string(),
            });
        }
        self.inner.ensure_bucket(bucket).await
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        metadata: &Metadata,
        content_type: Option<&str>,
    ) -> Result<(), StorageError> {
        self.puts.lock().await.push(key.to_string());
        self.inner
            .put(bucket, key, body, metadata, content_type)
            .await
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<StoredObject, StorageError> {
        self.inner.get(bucket, key).await
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, StorageError> {
        self.inner.head(bucket, key).await
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        self.inner.delete(bucket, key).await
    }

    async fn open_read_stream(&self, bucket: &str, key: &str) -> Result<ByteStream, StorageError> {
        self.inner.open_read_stream(bucket, key).await
    }
}

/// Creates a client over a `GatedStore`.
#[must_use]
pub fn gated_client(store: GatedStore) -> (RemoteJobClient, Arc<GatedStore>) {
    let store = Arc::new(store);
    let client = RemoteJobClient::new(
        test_config(),
        Arc::clone(&store) as Arc<dyn ObjectStore>,
        Arc::new(MemoryMessageQueue::new()),
    );
    (client, store)
}

/// Queue service whose sends always fail.
#[derive(Debug, Default)]
pub struct UnreachableQueue {
    inner: MemoryMessageQueue,
}

#[async_trait]
impl MessageQueue for UnreachableQueue {
    async fn ensure_queue(
        &self,
        name: &str,
        attributes: &QueueAttributes,
    ) -> Result<QueueHandle, QueueError> {
        self.inner.ensure_queue(name, attributes).await
    }

    async fn send(&self, _queue: &QueueHandle, _body: &str) -> Result<String, QueueError> {
        Err(QueueError::ConnectionError("connection reset".to_string()))
    }

    async fn receive(
        &self,
        queue: &QueueHandle,
        options: ReceiveOptions,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        self.inner.receive(queue, options).await
    }

    async fn delete(&self, queue: &QueueHandle, receipt_handle: &str) -> Result<(), QueueError> {
        self.inner.delete(queue, receipt_handle).await
    }

    async fn attributes(&self, queue: &QueueHandle) -> Result<QueueAttributes, QueueError> {
        self.inner.attributes(queue).await
    }
}

/// Queue service that counts receive calls.
#[derive(Debug, Default)]
pub struct CountingQueue {
    inner: MemoryMessageQueue,
    receives: AtomicUsize,
}

impl CountingQueue {
    /// Number of receive calls so far.
    pub fn receives(&self) -> usize {
        self.receives.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageQueue for CountingQueue {
    async fn ensure_queue(
        &self,
        name: &str,
        attributes: &QueueAttributes,
    ) -> Result<QueueHandle, QueueError> {
        self.inner.ensure_queue(name, attributes).await
    }

    async fn send(&self, queue: &QueueHandle, body: &str) -> Result<String, QueueError> {
        self.inner.send(queue, body).await
    }

    async fn receive(
        &self,
        queue: &QueueHandle,
        options: ReceiveOptions,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        self.receives.fetch_add(1, Ordering::SeqCst);
        self.inner.receive(queue, options).await
    }

    async fn delete(&self, queue: &QueueHandle, receipt_handle: &str) -> Result<(), QueueError> {
        self.inner.delete(queue, receipt_handle).await
    }

    async fn attributes(&self, queue: &QueueHandle) -> Result<QueueAttributes, QueueError> {
        self.inner.attributes(queue).await
    }
}

/// Creates a client over a `CountingQueue`.
#[must_use]
pub fn counting_client(config: RemoteJobConfig) -> (RemoteJobClient, Arc<CountingQueue>) {
    let queue = Arc::new(CountingQueue::default());
    let client = RemoteJobClient::new(
        config,
        Arc::new(MemoryObjectStore::new()),
        Arc::clone(&queue) as Arc<dyn MessageQueue>,
    );
    (client, queue)
}

/// Creates a client backed by S3 and SQS using environment variables.
///
/// Environment variables (with LocalStack defaults):
/// - `S3_ENDPOINT`: S3/SQS endpoint URL (default: `http://localhost:4566`)
/// - `S3_BUCKET`: Bucket name (default: `remotejob-dev`)
/// - `S3_REGION`: AWS region (default: `us-east-1`)
///
/// Queues get a unique prefix so concurrent runs do not share messages.
pub async fn aws_client() -> RemoteJobClient {
    let endpoint =
        std::env::var("S3_ENDPOINT").unwrap_or_else(|_| "http://localhost:4566".to_string());
    let bucket = std::env::var("S3_BUCKET").unwrap_or_else(|_| "remotejob-dev".to_string());
    let region = std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string());

    let mut config = RemoteJobConfig::new(bucket).with_wait_time_seconds(2);
    config.endpoint = Some(endpoint);
    config.region = region;
    config.queues.prefix = format!("test-{}-", Uuid::new_v4().simple());

    let client = RemoteJobClient::connect(config).await;
    client.ready().await.expect(
        "Failed to provision - is LocalStack running with S3 and SQS enabled?",
    );
    client
}
