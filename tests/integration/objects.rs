//! Test: storing, retrieving, removing and streaming objects.

use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use remotejob::storage::{MemoryObjectStore, ObjectStore};
use remotejob::{MemoryMessageQueue, ObjectRef, RemoteJobClient, RemoteJobError, StoreRequest};

use crate::common::{ready_client, test_config, TEST_BUCKET};

#[tokio::test]
async fn test_generated_keys_are_distinct() {
    let harness = ready_client(test_config()).await;

    let mut keys = HashSet::new();
    for _ in 0..50 {
        let key = harness
            .client
            .store(StoreRequest::new("same body").with_field("name", "same"))
            .await
            .unwrap();
        assert!(keys.insert(key), "generated key was reused");
    }
    assert_eq!(harness.store.object_count(TEST_BUCKET).await, 50);
}

#[tokio::test]
async fn test_store_then_retrieve_round_trip() {
    let harness = ready_client(test_config()).await;
    let body = Bytes::from_static(&[0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10]);

    let key = harness
        .client
        .store(
            StoreRequest::new(body.clone())
                .with_field("name", "Cat")
                .with_field("filename", "cat.jpg"),
        )
        .await
        .unwrap();

    let object = harness.client.retrieve(&key).await.unwrap();
    assert_eq!(object.key, key);
    assert_eq!(object.body, body);
    assert_eq!(object.metadata.len(), 2);
    assert_eq!(object.metadata["name"], "Cat");
    assert_eq!(object.metadata["filename"], "cat.jpg");
    assert!(!object.metadata.contains_key("key"));
    assert!(!object.metadata.contains_key("body"));
}

#[tokio::test]
async fn test_explicit_key_overwrites() {
    let harness = ready_client(test_config()).await;

    let request = StoreRequest::new("v1").with_key("fixed");
    assert_eq!(harness.client.store(request).await.unwrap(), "fixed");
    harness
        .client
        .store(StoreRequest::new("v2").with_field("key", "fixed"))
        .await
        .unwrap();

    let object = harness.client.retrieve("fixed").await.unwrap();
    assert_eq!(object.body, Bytes::from("v2"));
    assert!(object.metadata.is_empty());
}

#[tokio::test]
async fn test_empty_body_by_default() {
    let harness = ready_client(test_config()).await;

    let key = harness
        .client
        .store(StoreRequest::default().with_field("name", "empty"))
        .await
        .unwrap();

    assert!(harness.client.retrieve(&key).await.unwrap().body.is_empty());
}

#[tokio::test]
async fn test_retrieve_unknown_key_is_not_found() {
    let harness = ready_client(test_config()).await;

    let err = harness.client.retrieve("does-not-exist").await.unwrap_err();
    assert_eq!(
        err,
        RemoteJobError::NotFound {
            key: "does-not-exist".to_string()
        }
    );
}

#[tokio::test]
async fn test_remove_deletes_object() {
    let harness = ready_client(test_config()).await;
    let key = harness.client.store(StoreRequest::new("x")).await.unwrap();

    harness.client.remove(&key).await.unwrap();
    assert!(harness.client.retrieve(&key).await.is_err());
    // Removing again is not an error.
    harness.client.remove(&key).await.unwrap();
}

#[tokio::test]
async fn test_download_streams_in_chunks() {
    let store = Arc::new(MemoryObjectStore::new().with_chunk_size(4));
    let client = RemoteJobClient::new(
        test_config(),
        Arc::clone(&store) as Arc<dyn ObjectStore>,
        Arc::new(MemoryMessageQueue::new()),
    );
    let key = client
        .store(StoreRequest::new("0123456789"))
        .await
        .unwrap();

    let chunks: Vec<Bytes> = client
        .download(ObjectRef::new(key.as_str()))
        .await
        .unwrap()
        .map(|chunk| chunk.unwrap())
        .collect()
        .await;
    assert_eq!(chunks, vec![Bytes::from("0123"), Bytes::from("4567"), Bytes::from("89")]);
}

#[tokio::test]
async fn test_download_can_stop_early() {
    let store = Arc::new(MemoryObjectStore::new().with_chunk_size(2));
    let client = RemoteJobClient::new(
        test_config(),
        Arc::clone(&store) as Arc<dyn ObjectStore>,
        Arc::new(MemoryMessageQueue::new()),
    );
    let key = client.store(StoreRequest::new("abcdef")).await.unwrap();

    let mut stream = client.download(ObjectRef::from(key.as_str())).await.unwrap();
    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first, Bytes::from("ab"));
    drop(stream);

    // The object is untouched by a partial read.
    assert_eq!(client.retrieve(&key).await.unwrap().body, Bytes::from("abcdef"));
}

#[tokio::test]
async fn test_download_from_other_bucket() {
    let harness = ready_client(test_config()).await;
    harness.store.ensure_bucket("elsewhere").await.unwrap();
    harness
        .store
        .put("elsewhere", "k", Bytes::from("remote"), &Default::default(), None)
        .await
        .unwrap();

    let mut stream = harness
        .client
        .download(ObjectRef::in_bucket("elsewhere", "k"))
        .await
        .unwrap();
    assert_eq!(stream.next().await.unwrap().unwrap(), Bytes::from("remote"));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_download_missing_object() {
    let harness = ready_client(test_config()).await;
    let result = harness.client.download(ObjectRef::new("missing")).await;
    assert!(matches!(result, Err(RemoteJobError::NotFound { .. })));
}
