use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use super::{ByteStream, Metadata, ObjectMetadata, ObjectStore, StorageError, StoredObject};

/// Chunk size used when streaming bodies out of the memory store.
const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// In-process object store.
///
/// Follows the same contract as the S3 backend: buckets must be ensured
/// before use, missing keys surface as `StorageError::NotFound`, and deletes
/// of missing keys succeed.
#[derive(Debug)]
pub struct MemoryObjectStore {
    buckets: RwLock<HashMap<String, HashMap<String, StoredObject>>>,
    chunk_size: usize,
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryObjectStore {
    /// Creates an empty store with no buckets.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Sets the chunk size used by `open_read_stream`.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Returns the number of objects held in `bucket`.
    pub async fn object_count(&self, bucket: &str) -> usize {
        self.buckets.read().await.get(bucket).map_or(0, HashMap::len)
    }

    async fn lookup(&self, bucket: &str, key: &str) -> Result<StoredObject, StorageError> {
        let buckets = self.buckets.read().await;
        let objects = buckets.get(bucket).ok_or_else(|| StorageError::NoSuchBucket {
            bucket: bucket.to_string(),
        })?;
        objects
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                key: key.to_string(),
            })
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn ensure_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        self.buckets
            .write()
            .await
            .entry(bucket.to_string())
            .or_default();
        Ok(())
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        metadata: &Metadata,
        content_type: Option<&str>,
    ) -> Result<(), StorageError> {
        let mut buckets = self.buckets.write().await;
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| StorageError::NoSuchBucket {
                bucket: bucket.to_string(),
            })?;

        objects.insert(
            key.to_string(),
            StoredObject {
                key: key.to_string(),
                metadata: metadata.clone(),
                body,
                content_type: content_type.map(ToString::to_string),
            },
        );
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<StoredObject, StorageError> {
        self.lookup(bucket, key).await
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, StorageError> {
        let object = self.lookup(bucket, key).await?;
        Ok(ObjectMetadata {
            metadata: object.metadata,
            content_type: object.content_type,
        })
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        let mut buckets = self.buckets.write().await;
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| StorageError::NoSuchBucket {
                bucket: bucket.to_string(),
            })?;
        objects.remove(key);
        Ok(())
    }

    async fn open_read_stream(&self, bucket: &str, key: &str) -> Result<ByteStream, StorageError> {
        let body = self.lookup(bucket, key).await?.body;
        let chunk_size = self.chunk_size;

        let stream = futures::stream::unfold(body, move |mut remaining| async move {
            if remaining.is_empty() {
                return None;
            }
            let chunk = remaining.split_to(chunk_size.min(remaining.len()));
            Some((Ok(chunk), remaining))
        });

        Ok(Box::pin(stream))
    }
}
