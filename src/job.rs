//! Jobs received from a queue, their payloads and their outcomes.

use std::collections::BTreeMap;

use bytes::Bytes;
use futures::future::try_join_all;
use metrics::counter;
use serde::Serialize;
use serde_json::Value;

use crate::client::{ObjectRef, RemoteJobClient, StoreRequest};
use crate::error::RemoteJobError;
use crate::mq::ReceivedMessage;
use crate::storage::{ByteStream, Metadata};

/// Asset key used when a worker does not name its result.
pub const DEFAULT_ASSET_KEY: &str = "output";

/// Suffix of the object written for a failed outcome.
pub const ERROR_ASSET_KEY: &str = "error";

/// Payload field names with a typed slot in `JobPayload`.
const RESERVED_FIELDS: [&str; 4] = ["bucket", "key", "name", "filename"];

/// Message body carried by a queue: a pointer to a stored object plus the
/// object's metadata.
///
/// Well-known fields are typed. Every other field lands in `fields`, so a
/// payload field can never shadow a property of the `Job` itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobPayload {
    /// Bucket holding the job's payload object.
    pub bucket: String,
    /// Key of the job's payload object.
    pub key: String,
    /// Optional human-readable name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Optional filename of the payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Every other field.
    #[serde(flatten)]
    pub fields: BTreeMap<String, String>,
}

impl JobPayload {
    /// Builds the payload sent by `trigger` from an object's metadata.
    ///
    /// `bucket` and `key` always win over metadata fields of the same name.
    #[must_use]
    pub fn from_metadata(bucket: &str, key: &str, metadata: Metadata) -> Self {
        let mut payload = Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
            ..Self::default()
        };
        for (field, value) in metadata {
            match field.as_str() {
                "bucket" | "key" => {}
                "name" => payload.name = Some(value),
                "filename" => payload.filename = Some(value),
                _ => {
                    payload.fields.insert(field, value);
                }
            }
        }
        payload
    }

    /// Parses a message body.
    ///
    /// A body that is not a JSON object is logged and treated as an empty
    /// payload. String values are kept as-is, `null` values are dropped and
    /// any other value is kept in its JSON form.
    #[must_use]
    pub fn from_message_body(body: &str) -> Self {
        let object = match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(object)) => object,
            Ok(other) => {
                tracing::warn!(
                    kind = json_kind(&other),
                    "Message body is not a JSON object, using empty payload"
                );
                return Self::default();
            }
            Err(e) => {
                tracing::warn!(error = %e, "Malformed message body, using empty payload");
                return Self::default();
            }
        };

        let mut payload = Self::default();
        for (field, value) in object {
            let value = match value {
                Value::Null => continue,
                Value::String(s) => s,
                other => other.to_string(),
            };
            match field.as_str() {
                "bucket" => payload.bucket = value,
                "key" => payload.key = value,
                "name" => payload.name = Some(value),
                "filename" => payload.filename = Some(value),
                _ => {
                    payload.fields.insert(field, value);
                }
            }
        }
        payload
    }

    /// Encodes the payload as a JSON message body.
    ///
    /// # Errors
    ///
    /// Returns `RemoteJobError::Serialization` if encoding fails.
    pub fn to_message_body(&self) -> Result<String, RemoteJobError> {
        serde_json::to_string(self).map_err(|e| RemoteJobError::Serialization(e.to_string()))
    }

    /// Looks up a field by name, typed or not.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        match name {
            "bucket" => Some(self.bucket.as_str()),
            "key" => Some(self.key.as_str()),
            "name" => self.name.as_deref(),
            "filename" => self.filename.as_deref(),
            _ => self.fields.get(name).map(String::as_str),
        }
    }

    /// Returns `true` if `name` has a typed slot.
    #[must_use]
    pub fn is_reserved(name: &str) -> bool {
        RESERVED_FIELDS.contains(&name)
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A result artifact produced by a worker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Asset {
    /// Suffix of the stored key; defaults to `output`.
    pub key: Option<String>,
    /// Optional filename, used to infer the content type.
    pub filename: Option<String>,
    /// Asset body.
    pub body: Bytes,
}

impl Asset {
    /// Creates an unnamed asset.
    #[must_use]
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            key: None,
            filename: None,
            body: body.into(),
        }
    }

    /// Sets the key suffix.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Sets the filename.
    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    fn stored_key(&self, job_id: &str) -> String {
        format!(
            "{job_id}-{}",
            self.key.as_deref().unwrap_or(DEFAULT_ASSET_KEY)
        )
    }
}

/// How a worker finished a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The job was processed.
    Succeeded,
    /// The job could not be processed.
    Failed {
        /// Worker-reported reason, stored alongside the job's assets.
        reason: String,
    },
}

impl JobOutcome {
    /// Creates a failed outcome.
    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    /// Returns true for `Succeeded`.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Metric label for this outcome.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed { .. } => "failed",
        }
    }
}

/// One received message joined with its parsed payload.
///
/// `id` is always the message id; payload fields live in `payload()` and are
/// reached through `field()`.
#[derive(Debug, Clone)]
pub struct Job {
    id: String,
    receipt_handle: String,
    queue: String,
    payload: JobPayload,
    client: RemoteJobClient,
}

impl Job {
    pub(crate) fn new(client: RemoteJobClient, queue: &str, message: ReceivedMessage) -> Self {
        let payload = JobPayload::from_message_body(&message.body);
        Self {
            id: message.id,
            receipt_handle: message.receipt_handle,
            queue: queue.to_string(),
            payload,
            client,
        }
    }

    /// Message id; identical across redeliveries.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Receipt handle of this delivery.
    #[must_use]
    pub fn receipt_handle(&self) -> &str {
        &self.receipt_handle
    }

    /// Logical queue the job was received from.
    #[must_use]
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Decoded message body.
    #[must_use]
    pub const fn payload(&self) -> &JobPayload {
        &self.payload
    }

    /// Bucket holding the job's input object.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.payload.bucket
    }

    /// Key of the job's input object.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.payload.key
    }

    /// The `name` field, if the producer set one.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.payload.name.as_deref()
    }

    /// The `filename` field, if the producer set one.
    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        self.payload.filename.as_deref()
    }

    /// Looks up a payload field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.payload.field(name)
    }

    /// Deletes this delivery from its source queue.
    ///
    /// Acknowledging twice, or after the visibility timeout elapsed, is
    /// reported by the backend.
    ///
    /// # Errors
    ///
    /// Returns the queue error if the delete fails.
    pub async fn acknowledge(&self) -> Result<(), RemoteJobError> {
        self.client
            .remove_message(&self.queue, &self.receipt_handle)
            .await?;
        counter!("remotejob.jobs.acknowledged", "queue" => self.queue.clone()).increment(1);
        tracing::debug!(job_id = %self.id, queue = %self.queue, "Job acknowledged");
        Ok(())
    }

    /// Opens a stream over the job's payload object.
    ///
    /// # Errors
    ///
    /// Returns `RemoteJobError::NotFound` if the payload object is gone.
    pub async fn create_read_stream(&self) -> Result<ByteStream, RemoteJobError> {
        let bucket = (!self.payload.bucket.is_empty()).then(|| self.payload.bucket.clone());
        self.client
            .download(ObjectRef {
                bucket,
                key: self.payload.key.clone(),
            })
            .await
    }

    /// Stores the job's result assets and records its outcome.
    ///
    /// Each asset is stored under `<job id>-<asset key or "output">`. A failed
    /// outcome also stores `<job id>-error` holding the reason and, when a
    /// failed queue is configured, triggers that queue with it. Returns every
    /// key written.
    ///
    /// # Errors
    ///
    /// Returns the first storage or queue error encountered.
    pub async fn complete(
        &self,
        outcome: JobOutcome,
        assets: Vec<Asset>,
    ) -> Result<Vec<String>, RemoteJobError> {
        let stores = assets.into_iter().map(|asset| {
            let key = asset.stored_key(&self.id);
            let mut request = StoreRequest::new(asset.body).with_key(key);
            if let Some(filename) = asset.filename {
                request = request.with_field("filename", filename);
            }
            self.client.store(request)
        });
        let mut keys = try_join_all(stores).await?;

        if let JobOutcome::Failed { ref reason } = outcome {
            let error_key = format!("{}-{ERROR_ASSET_KEY}", self.id);
            let request = StoreRequest::new(reason.clone())
                .with_key(error_key.clone())
                .with_field("status", "failed")
                .with_field("job_id", self.id.clone())
                .with_field("queue", self.queue.clone());
            self.client.store(request).await?;

            if let Some(failed_queue) = self.client.config().queues.failed.clone() {
                self.client.trigger(&failed_queue, &error_key).await?;
                tracing::debug!(job_id = %self.id, queue = %failed_queue, "Failed job routed");
            }
            tracing::warn!(job_id = %self.id, reason = %reason, "Job failed");
            keys.push(error_key);
        }

        counter!("remotejob.jobs.completed", "outcome" => outcome.label()).increment(1);
        Ok(keys)
    }
}
