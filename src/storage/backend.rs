use std::collections::BTreeMap;
use std::fmt::Debug;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::Stream;

use super::StorageError;

/// Boxed asynchronous byte stream returned by the object store.
///
/// Chunks are produced on demand, so a caller that stops polling stops the
/// transfer.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StorageError>> + Send>>;

/// User metadata attached to a stored object.
pub type Metadata = BTreeMap<String, String>;

/// A fully materialized object read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// The object key.
    pub key: String,
    /// User metadata written alongside the body.
    pub metadata: Metadata,
    /// The object body.
    pub body: Bytes,
    /// Content type, if one was attached on write.
    pub content_type: Option<String>,
}

/// Metadata of an object, fetched without its body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMetadata {
    /// User metadata written alongside the body.
    pub metadata: Metadata,
    /// Content type, if one was attached on write.
    pub content_type: Option<String>,
}

/// Keyed blob storage with per-object metadata.
///
/// Objects are never patched: a `put` on an existing key replaces the whole
/// object.
#[async_trait]
pub trait ObjectStore: Send + Sync + Debug {
    /// Creates the bucket if needed. A bucket the caller already owns is not
    /// an error.
    async fn ensure_bucket(&self, bucket: &str) -> Result<(), StorageError>;

    /// Writes an object with private, owner-only access.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        metadata: &Metadata,
        content_type: Option<&str>,
    ) -> Result<(), StorageError>;

    /// Reads an object and its metadata, or `StorageError::NotFound`.
    async fn get(&self, bucket: &str, key: &str) -> Result<StoredObject, StorageError>;

    /// Reads only the metadata of an object, or `StorageError::NotFound`.
    async fn head(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, StorageError>;

    /// Deletes an object. Deleting a missing key succeeds.
    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError>;

    /// Opens a lazy stream over the object body.
    async fn open_read_stream(&self, bucket: &str, key: &str) -> Result<ByteStream, StorageError>;
}
