//! Test: submitting jobs and receiving them with `next`.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use remotejob::mq::{MessageQueue, QueueHandle, ReceiveOptions};
use remotejob::storage::{MemoryObjectStore, ObjectStore};
use remotejob::{
    CancellationToken, QueueError, RemoteJobClient, RemoteJobError, StoreRequest,
};
use serde_json::{json, Value};

use crate::common::{
    counting_client, ready_client, test_config, GatedStore, UnreachableQueue, TEST_BUCKET,
};

fn cat_request() -> StoreRequest {
    StoreRequest::new(Bytes::from_static(b"\xff\xd8\xff\xe0cat"))
        .with_field("name", "Cat")
        .with_field("filename", "cat.jpg")
}

#[tokio::test]
async fn test_submit_then_next_yields_job() {
    let harness = ready_client(test_config()).await;
    let cancel = CancellationToken::new();

    let job_id = harness
        .client
        .submit(
            StoreRequest::new("payload")
                .with_field("name", "Report")
                .with_field("owner", "ops")
                .with_field("priority", "high"),
        )
        .await
        .unwrap();

    let job = harness.client.next("pending", &cancel).await.unwrap();
    assert_eq!(job.id(), job_id);
    assert_eq!(job.queue(), "pending");
    assert_eq!(job.bucket(), TEST_BUCKET);
    assert_eq!(job.name(), Some("Report"));
    assert_eq!(job.field("owner"), Some("ops"));
    assert_eq!(job.field("priority"), Some("high"));

    let stored = harness.client.retrieve(job.key()).await.unwrap();
    assert_eq!(stored.body, Bytes::from("payload"));
    for (field, value) in &stored.metadata {
        assert_eq!(job.field(field), Some(value.as_str()), "field {field}");
    }
}

#[tokio::test]
async fn test_cat_message_body() {
    let harness = ready_client(test_config()).await;
    harness.client.submit(cat_request()).await.unwrap();

    let messages = harness
        .queue
        .receive(&QueueHandle::new("pending"), ReceiveOptions::default())
        .await
        .unwrap();
    assert_eq!(messages.len(), 1);

    let body: Value = serde_json::from_str(&messages[0].body).unwrap();
    let key = body["key"].as_str().unwrap().to_string();
    assert_eq!(
        body,
        json!({"name": "Cat", "filename": "cat.jpg", "bucket": TEST_BUCKET, "key": key})
    );

    let stored = harness.client.retrieve(&key).await.unwrap();
    assert_eq!(stored.body, Bytes::from_static(b"\xff\xd8\xff\xe0cat"));
    assert_eq!(stored.content_type.as_deref(), Some("image/jpeg"));
}

#[tokio::test]
async fn test_cat_job() {
    let harness = ready_client(test_config()).await;
    let cancel = CancellationToken::new();
    harness.client.submit(cat_request()).await.unwrap();

    let job = harness.client.next("pending", &cancel).await.unwrap();
    assert_eq!(job.name(), Some("Cat"));
    assert_eq!(job.filename(), Some("cat.jpg"));
    assert!(harness.client.retrieve(job.key()).await.is_ok());
}

#[tokio::test]
async fn test_trigger_named_queue() {
    let config = test_config().with_queues(["pending", "thumbnails"]);
    let harness = ready_client(config).await;
    let cancel = CancellationToken::new();

    harness
        .client
        .store_raw(
            "photo-1",
            [("filename".to_string(), "photo.png".to_string())].into(),
            "png",
        )
        .await
        .unwrap();
    let message_id = harness.client.trigger("thumbnails", "photo-1").await.unwrap();

    let job = harness.client.next("thumbnails", &cancel).await.unwrap();
    assert_eq!(job.id(), message_id);
    assert_eq!(job.key(), "photo-1");
    assert_eq!(job.filename(), Some("photo.png"));
}

#[tokio::test]
async fn test_payload_id_does_not_replace_job_id() {
    let harness = ready_client(test_config()).await;
    let cancel = CancellationToken::new();

    let job_id = harness
        .client
        .submit(StoreRequest::new("x").with_field("id", "spoofed"))
        .await
        .unwrap();

    let job = harness.client.next("pending", &cancel).await.unwrap();
    assert_eq!(job.id(), job_id);
    assert_eq!(job.field("id"), Some("spoofed"));
}

#[tokio::test]
async fn test_unknown_queue_fails_without_polling() {
    let harness = ready_client(test_config()).await;
    let cancel = CancellationToken::new();

    let err = harness.client.next("nope", &cancel).await.unwrap_err();
    assert_eq!(
        err,
        RemoteJobError::UnknownQueue {
            queue: "nope".to_string()
        }
    );
    assert!(matches!(
        harness.client.trigger("nope", "k").await,
        Err(RemoteJobError::UnknownQueue { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_next_keeps_polling_through_empty_receives() {
    let harness = ready_client(test_config()).await;
    let cancel = CancellationToken::new();

    let worker = {
        let client = harness.client.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { client.next("pending", &cancel).await })
    };

    // Many one-second polls come back empty first.
    tokio::time::sleep(Duration::from_secs(65)).await;
    assert!(!worker.is_finished());

    let job_id = harness
        .client
        .submit(StoreRequest::new("late"))
        .await
        .unwrap();
    let job = worker.await.unwrap().unwrap();
    assert_eq!(job.id(), job_id);
}

#[tokio::test(start_paused = true)]
async fn test_next_is_cancellable() {
    let harness = ready_client(test_config()).await;
    let cancel = CancellationToken::new();

    let worker = {
        let client = harness.client.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { client.next("pending", &cancel).await })
    };

    tokio::time::sleep(Duration::from_secs(5)).await;
    cancel.cancel();

    assert_eq!(worker.await.unwrap().unwrap_err(), RemoteJobError::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn test_zero_wait_time_still_long_polls() {
    let (client, queue) = counting_client(test_config().with_wait_time_seconds(0));
    client.ready().await.unwrap();
    let cancel = CancellationToken::new();

    let worker = {
        let client = client.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { client.next("pending", &cancel).await })
    };

    tokio::time::sleep(Duration::from_millis(10_500)).await;
    cancel.cancel();
    assert_eq!(worker.await.unwrap().unwrap_err(), RemoteJobError::Cancelled);

    // One receive per second of waiting, not a spin.
    let receives = queue.receives();
    assert!((10..=11).contains(&receives), "{receives} receives in 10.5s");
}

#[tokio::test]
async fn test_next_cancelled_while_provisioning() {
    let store = GatedStore::new();
    let (client, _store) = crate::common::gated_client(store);
    let cancel = CancellationToken::new();
    cancel.cancel();

    assert_eq!(
        client.next("pending", &cancel).await.unwrap_err(),
        RemoteJobError::Cancelled
    );
    assert!(!client.is_ready());
}

#[tokio::test]
async fn test_concurrent_workers_get_distinct_jobs() {
    let harness = ready_client(test_config()).await;
    let cancel = CancellationToken::new();

    let workers: Vec<_> = (0..2)
        .map(|_| {
            let client = harness.client.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { client.next("pending", &cancel).await })
        })
        .collect();

    let first = harness.client.submit(StoreRequest::new("a")).await.unwrap();
    let second = harness.client.submit(StoreRequest::new("b")).await.unwrap();

    let mut received = Vec::new();
    for worker in workers {
        received.push(worker.await.unwrap().unwrap().id().to_string());
    }
    received.sort();
    let mut expected = vec![first, second];
    expected.sort();
    assert_eq!(received, expected);
}

#[tokio::test]
async fn test_submit_removes_object_when_trigger_fails() {
    let store = Arc::new(MemoryObjectStore::new());
    let client = RemoteJobClient::new(
        test_config(),
        Arc::clone(&store) as Arc<dyn ObjectStore>,
        Arc::new(UnreachableQueue::default()),
    );

    let err = client.submit(cat_request()).await.unwrap_err();
    assert_eq!(
        err,
        RemoteJobError::Queue(QueueError::ConnectionError(
            "connection reset".to_string()
        ))
    );
    assert_eq!(store.object_count(TEST_BUCKET).await, 0);
}
