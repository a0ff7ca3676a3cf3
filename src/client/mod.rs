//! The remote job client.
//!
//! A `RemoteJobClient` owns its object store and message queue handles.
//! Construction starts provisioning in the background and returns at once;
//! every operation waits its turn on the readiness gate, so calls issued
//! before provisioning completes run in order once it succeeds, and all fail
//! with the provisioning error if it does not.

mod request;

use std::sync::Arc;

use bytes::Bytes;
use metrics::counter;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::RemoteJobConfig;
use crate::error::RemoteJobError;
use crate::job::{Job, JobPayload};
use crate::mq::{MessageQueue, QueueAttributes, ReceiveOptions, SqsConfig, SqsMessageQueue};
use crate::provision::{QueueRegistry, ResourceProvisioner};
use crate::readiness::{ClientState, ReadinessGate, Turn};
use crate::storage::{
    infer_content_type, ByteStream, Metadata, ObjectStore, S3Config, S3ObjectStore, StoredObject,
};

pub use request::{ObjectRef, StoreRequest};

/// Client for storing job payloads and moving job pointers between queues.
///
/// Cloning is cheap; clones share backends and readiness.
#[derive(Debug, Clone)]
pub struct RemoteJobClient {
    inner: Arc<ClientInner>,
}

#[derive(Debug)]
struct ClientInner {
    config: RemoteJobConfig,
    store: Arc<dyn ObjectStore>,
    queue: Arc<dyn MessageQueue>,
    gate: ReadinessGate<QueueRegistry>,
    provisioning: CancellationToken,
}

impl ClientInner {
    async fn provision(&self) {
        let provisioner =
            ResourceProvisioner::new(self.store.as_ref(), self.queue.as_ref(), &self.config);

        let outcome = tokio::select! {
            biased;
            () = self.provisioning.cancelled() => Err(RemoteJobError::Provisioning {
                resource: "client".to_string(),
                message: "provisioning cancelled".to_string(),
            }),
            result = provisioner.provision() => result,
        };

        match outcome {
            Ok(ref registry) => tracing::info!(
                bucket = %self.config.bucket,
                queues = registry.len(),
                "Remote job client ready"
            ),
            Err(ref e) => tracing::error!(
                bucket = %self.config.bucket,
                error = %e,
                "Remote job client provisioning failed"
            ),
        }
        self.gate.resolve(outcome).await;
    }
}

impl RemoteJobClient {
    /// Creates a client over the given backends and starts provisioning.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn new(
        config: RemoteJobConfig,
        store: Arc<dyn ObjectStore>,
        queue: Arc<dyn MessageQueue>,
    ) -> Self {
        let inner = Arc::new(ClientInner {
            config,
            store,
            queue,
            gate: ReadinessGate::new(),
            provisioning: CancellationToken::new(),
        });

        let coordinator = Arc::clone(&inner);
        tokio::spawn(async move {
            coordinator.provision().await;
        });

        Self { inner }
    }

    /// Creates a client backed by S3 and SQS.
    ///
    /// Credentials come from the AWS default provider chain.
    pub async fn connect(config: RemoteJobConfig) -> Self {
        let store = S3ObjectStore::new(&S3Config::new(
            config.endpoint.clone(),
            config.region.clone(),
        ))
        .await;
        let queue = SqsMessageQueue::new(&SqsConfig::new(
            config.endpoint.clone(),
            config.region.clone(),
        ))
        .await;

        Self::new(config, Arc::new(store), Arc::new(queue))
    }

    /// Configuration the client was built with.
    #[must_use]
    pub fn config(&self) -> &RemoteJobConfig {
        &self.inner.config
    }

    /// Bucket that holds payloads and result assets.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.inner.config.bucket
    }

    /// Waits for provisioning to finish.
    ///
    /// # Errors
    ///
    /// Returns the provisioning error if the bucket or a queue could not be
    /// created.
    pub async fn ready(&self) -> Result<(), RemoteJobError> {
        self.inner.gate.wait().await
    }

    /// Returns `true` once provisioning succeeded.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.inner.gate.is_ready()
    }

    /// Current provisioning state.
    #[must_use]
    pub fn state(&self) -> ClientState {
        self.inner.gate.state()
    }

    /// Subscribes to provisioning state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ClientState> {
        self.inner.gate.subscribe()
    }

    /// Number of calls waiting for provisioning to finish.
    pub async fn deferred_calls(&self) -> usize {
        self.inner.gate.pending_calls().await
    }

    /// Abandons provisioning if it is still running. Waiting and later calls
    /// fail with a provisioning error.
    pub fn cancel_provisioning(&self) {
        self.inner.provisioning.cancel();
    }

    /// Waits for readiness. Deferred callers must start their backend call
    /// through the returned turn so the next deferred call starts after it.
    async fn registry(&self) -> Result<(Arc<QueueRegistry>, Turn), RemoteJobError> {
        self.inner.gate.acquire().await
    }

    fn check_queue(&self, queue: &str) -> Result<(), RemoteJobError> {
        if self.inner.config.queues.is_provisioned(queue) {
            Ok(())
        } else {
            tracing::warn!(queue = %queue, "Rejecting call on unknown queue");
            Err(RemoteJobError::UnknownQueue {
                queue: queue.to_string(),
            })
        }
    }

    async fn put_object(
        &self,
        key: &str,
        metadata: &Metadata,
        body: Bytes,
    ) -> Result<(), RemoteJobError> {
        // S3 returns user metadata keys lowercased; store them that way everywhere.
        let metadata: Metadata = metadata
            .iter()
            .map(|(name, value)| (name.to_lowercase(), value.clone()))
            .collect();
        let content_type = infer_content_type(&metadata);
        self.inner
            .store
            .put(
                self.bucket(),
                key,
                body,
                &metadata,
                content_type.as_deref(),
            )
            .await?;

        counter!("remotejob.objects.stored").increment(1);
        tracing::debug!(key = %key, content_type = ?content_type, "Object stored");
        Ok(())
    }

    /// Stores an object and returns its key.
    ///
    /// A key is generated when the request has none. The content type is
    /// inferred from a filename-like metadata field.
    ///
    /// # Errors
    ///
    /// Returns the provisioning error or the storage error.
    pub async fn store(&self, request: StoreRequest) -> Result<String, RemoteJobError> {
        let (_, turn) = self.registry().await?;
        let key = request
            .key
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        turn.run(self.put_object(&key, &request.metadata, request.body))
            .await?;
        Ok(key)
    }

    /// Stores an object under an explicit key with exactly the given metadata,
    /// apart from keys being lowercased.
    ///
    /// # Errors
    ///
    /// Returns the provisioning error or the storage error.
    pub async fn store_raw(
        &self,
        key: &str,
        metadata: Metadata,
        body: impl Into<Bytes>,
    ) -> Result<(), RemoteJobError> {
        let (_, turn) = self.registry().await?;
        turn.run(self.put_object(key, &metadata, body.into())).await
    }

    /// Reads an object and its metadata.
    ///
    /// # Errors
    ///
    /// Returns `RemoteJobError::NotFound` if no object has this key.
    pub async fn retrieve(&self, key: &str) -> Result<StoredObject, RemoteJobError> {
        let (_, turn) = self.registry().await?;
        Ok(turn.run(self.inner.store.get(self.bucket(), key)).await?)
    }

    /// Deletes an object.
    ///
    /// # Errors
    ///
    /// Returns the provisioning error or the storage error.
    pub async fn remove(&self, key: &str) -> Result<(), RemoteJobError> {
        let (_, turn) = self.registry().await?;
        turn.run(self.inner.store.delete(self.bucket(), key)).await?;
        tracing::debug!(key = %key, "Object removed");
        Ok(())
    }

    /// Opens a lazy stream over an object's body.
    ///
    /// # Errors
    ///
    /// Returns `RemoteJobError::NotFound` if the object does not exist.
    pub async fn download(&self, object: ObjectRef) -> Result<ByteStream, RemoteJobError> {
        let (_, turn) = self.registry().await?;
        let bucket = object.bucket.as_deref().unwrap_or(self.bucket());
        Ok(turn
            .run(self.inner.store.open_read_stream(bucket, &object.key))
            .await?)
    }

    /// Sends a pointer to the object at `key` to `queue`.
    ///
    /// The message body is the object's metadata plus `bucket` and `key`;
    /// the body itself is not read. Returns the message id.
    ///
    /// # Errors
    ///
    /// Returns `RemoteJobError::UnknownQueue` for an unconfigured queue and
    /// `RemoteJobError::NotFound` if the object does not exist.
    pub async fn trigger(&self, queue: &str, key: &str) -> Result<String, RemoteJobError> {
        self.check_queue(queue)?;
        let (registry, turn) = self.registry().await?;
        let handle = registry.resolve(queue)?;

        let head = turn.run(self.inner.store.head(self.bucket(), key)).await?;
        let body = JobPayload::from_metadata(self.bucket(), key, head.metadata).to_message_body()?;
        let message_id = self.inner.queue.send(handle, &body).await?;

        counter!("remotejob.jobs.triggered", "queue" => queue.to_string()).increment(1);
        tracing::debug!(queue = %queue, key = %key, message_id = %message_id, "Job triggered");
        Ok(message_id)
    }

    /// Stores the request's object and triggers the default queue with it.
    /// Returns the job id, which is the message id.
    ///
    /// If the trigger fails the stored object is deleted again before the
    /// trigger error is returned.
    ///
    /// # Errors
    ///
    /// Returns the storage error or the trigger error.
    pub async fn submit(&self, request: StoreRequest) -> Result<String, RemoteJobError> {
        let queue = self.inner.config.queues.default.clone();
        self.check_queue(&queue)?;

        let key = self.store(request).await?;
        match self.trigger(&queue, &key).await {
            Ok(job_id) => Ok(job_id),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Trigger failed, removing stored object");
                if let Err(cleanup) = self.inner.store.delete(self.bucket(), &key).await {
                    tracing::warn!(
                        key = %key,
                        error = %cleanup,
                        "Failed to remove orphaned object"
                    );
                }
                Err(e)
            }
        }
    }

    /// Waits for the next job on `queue`.
    ///
    /// Each iteration is one long-poll receive; an empty poll is retried.
    /// The wait ends only when a message arrives, a receive fails or `cancel`
    /// fires.
    ///
    /// # Errors
    ///
    /// Returns `RemoteJobError::UnknownQueue` without polling for an
    /// unconfigured queue and `RemoteJobError::Cancelled` when `cancel` fires.
    pub async fn next(&self, queue: &str, cancel: &CancellationToken) -> Result<Job, RemoteJobError> {
        self.check_queue(queue)?;
        let (registry, turn) = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(RemoteJobError::Cancelled),
            registry = self.registry() => registry?,
        };
        let handle = registry.resolve(queue)?;
        let mut turn = Some(turn);
        let options = ReceiveOptions {
            max_messages: 1,
            wait_time: self.inner.config.queues.wait_time(),
        };

        loop {
            let messages = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::debug!(queue = %queue, "Stopped waiting for jobs");
                    return Err(RemoteJobError::Cancelled);
                }
                received = turn
                    .take()
                    .unwrap_or_default()
                    .run(self.inner.queue.receive(handle, options)) => received?,
            };

            if let Some(message) = messages.into_iter().next() {
                counter!("remotejob.jobs.received", "queue" => queue.to_string()).increment(1);
                tracing::debug!(queue = %queue, job_id = %message.id, "Job received");
                return Ok(Job::new(self.clone(), queue, message));
            }

            counter!("remotejob.polls.empty", "queue" => queue.to_string()).increment(1);
            tracing::trace!(queue = %queue, "Empty poll");
        }
    }

    /// Deletes one delivery from `queue`.
    ///
    /// # Errors
    ///
    /// Returns `RemoteJobError::UnknownQueue` for an unconfigured queue, or
    /// the queue error.
    pub async fn remove_message(
        &self,
        queue: &str,
        receipt_handle: &str,
    ) -> Result<(), RemoteJobError> {
        self.check_queue(queue)?;
        let (registry, turn) = self.registry().await?;
        let handle = registry.resolve(queue)?;
        turn.run(self.inner.queue.delete(handle, receipt_handle))
            .await?;
        Ok(())
    }

    /// Reports the backend attributes of `queue`.
    ///
    /// # Errors
    ///
    /// Returns `RemoteJobError::UnknownQueue` for an unconfigured queue, or
    /// the queue error.
    pub async fn status(&self, queue: &str) -> Result<QueueAttributes, RemoteJobError> {
        self.check_queue(queue)?;
        let (registry, turn) = self.registry().await?;
        let handle = registry.resolve(queue)?;
        Ok(turn.run(self.inner.queue.attributes(handle)).await?)
    }
}
