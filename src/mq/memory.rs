use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use uuid::Uuid;

use super::{
    MessageQueue, QueueAttributes, QueueError, QueueHandle, ReceiveOptions, ReceivedMessage,
    VISIBILITY_TIMEOUT_ATTRIBUTE,
};

/// Visibility timeout used when a queue is created without one (SQS default).
const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);

/// In-process message queue.
///
/// Implements the semantics the coordination layer relies on: a received
/// message is hidden for the queue's visibility timeout, then becomes
/// deliverable again with a fresh receipt handle unless it was deleted.
/// Receives long-poll until a message arrives, a hidden message reappears,
/// or the wait elapses. Timing uses `tokio::time`, so tests can drive it with
/// a paused clock.
#[derive(Debug)]
pub struct MemoryMessageQueue {
    queues: Mutex<HashMap<String, QueueState>>,
    arrivals: Notify,
    default_visibility_timeout: Duration,
}

#[derive(Debug)]
struct QueueState {
    visibility_timeout: Duration,
    entries: VecDeque<Entry>,
}

#[derive(Debug)]
struct Entry {
    id: String,
    body: String,
    delivery: Option<Delivery>,
}

#[derive(Debug)]
struct Delivery {
    receipt_handle: String,
    visible_at: Instant,
}

impl Entry {
    fn is_visible(&self, now: Instant) -> bool {
        self.delivery.as_ref().map_or(true, |d| d.visible_at <= now)
    }
}

impl Default for MemoryMessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryMessageQueue {
    /// Creates a queue service with no queues.
    #[must_use]
    pub fn new() -> Self {
        Self::with_visibility_timeout(DEFAULT_VISIBILITY_TIMEOUT)
    }

    /// Creates a queue service whose queues default to `timeout` when created
    /// without a `VisibilityTimeout` attribute.
    #[must_use]
    pub fn with_visibility_timeout(timeout: Duration) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            arrivals: Notify::new(),
            default_visibility_timeout: timeout,
        }
    }

    /// Hands out up to `max` visible messages and returns them together with
    /// the earliest instant at which a hidden message becomes visible.
    async fn take_visible(
        &self,
        queue: &QueueHandle,
        max: usize,
    ) -> Result<(Vec<ReceivedMessage>, Option<Instant>), QueueError> {
        let mut queues = self.queues.lock().await;
        let state = queues
            .get_mut(queue.as_str())
            .ok_or_else(|| QueueError::NoSuchQueue {
                queue: queue.to_string(),
            })?;

        let now = Instant::now();
        let visible_at = now + state.visibility_timeout;
        let mut messages = Vec::new();
        let mut next_visible: Option<Instant> = None;

        for entry in &mut state.entries {
            if messages.len() < max && entry.is_visible(now) {
                let receipt_handle = Uuid::new_v4().to_string();
                entry.delivery = Some(Delivery {
                    receipt_handle: receipt_handle.clone(),
                    visible_at,
                });
                messages.push(ReceivedMessage {
                    id: entry.id.clone(),
                    receipt_handle,
                    body: entry.body.clone(),
                });
            } else if let Some(ref delivery) = entry.delivery {
                if delivery.visible_at > now {
                    next_visible = Some(
                        next_visible.map_or(delivery.visible_at, |t| t.min(delivery.visible_at)),
                    );
                }
            }
        }

        Ok((messages, next_visible))
    }
}

#[async_trait]
impl MessageQueue for MemoryMessageQueue {
    async fn ensure_queue(
        &self,
        name: &str,
        attributes: &QueueAttributes,
    ) -> Result<QueueHandle, QueueError> {
        let visibility_timeout = match attributes.get(VISIBILITY_TIMEOUT_ATTRIBUTE) {
            Some(value) => value.parse().map(Duration::from_secs).map_err(|_| {
                QueueError::Backend(format!("Invalid {VISIBILITY_TIMEOUT_ATTRIBUTE}: {value}"))
            })?,
            None => self.default_visibility_timeout,
        };

        self.queues
            .lock()
            .await
            .entry(name.to_string())
            .or_insert_with(|| QueueState {
                visibility_timeout,
                entries: VecDeque::new(),
            });

        Ok(QueueHandle::new(name))
    }

    async fn send(&self, queue: &QueueHandle, body: &str) -> Result<String, QueueError> {
        let id = Uuid::new_v4().to_string();
        {
            let mut queues = self.queues.lock().await;
            let state = queues
                .get_mut(queue.as_str())
                .ok_or_else(|| QueueError::NoSuchQueue {
                    queue: queue.to_string(),
                })?;
            state.entries.push_back(Entry {
                id: id.clone(),
                body: body.to_string(),
                delivery: None,
            });
        }
        self.arrivals.notify_waiters();
        Ok(id)
    }

    async fn receive(
        &self,
        queue: &QueueHandle,
        options: ReceiveOptions,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let deadline = Instant::now() + options.wait_time;
        let max = options.max_messages.max(1);

        loop {
            // Registered before checking so a send between the check and the
            // wait is not missed.
            let arrival = self.arrivals.notified();
            tokio::pin!(arrival);
            arrival.as_mut().enable();

            let (messages, next_visible) = self.take_visible(queue, max).await?;
            if !messages.is_empty() || Instant::now() >= deadline {
                return Ok(messages);
            }

            let wake_at = next_visible.map_or(deadline, |at| at.min(deadline));
            tokio::select! {
                () = &mut arrival => {}
                () = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    async fn delete(&self, queue: &QueueHandle, receipt_handle: &str) -> Result<(), QueueError> {
        let mut queues = self.queues.lock().await;
        let state = queues
            .get_mut(queue.as_str())
            .ok_or_else(|| QueueError::NoSuchQueue {
                queue: queue.to_string(),
            })?;

        let position = state
            .entries
            .iter()
            .position(|entry| {
                entry
                    .delivery
                    .as_ref()
                    .is_some_and(|d| d.receipt_handle == receipt_handle)
            })
            .ok_or_else(|| QueueError::InvalidReceiptHandle {
                receipt_handle: receipt_handle.to_string(),
            })?;

        state.entries.remove(position);
        Ok(())
    }

    async fn attributes(&self, queue: &QueueHandle) -> Result<QueueAttributes, QueueError> {
        let queues = self.queues.lock().await;
        let state = queues
            .get(queue.as_str())
            .ok_or_else(|| QueueError::NoSuchQueue {
                queue: queue.to_string(),
            })?;

        let now = Instant::now();
        let visible = state.entries.iter().filter(|e| e.is_visible(now)).count();
        let hidden = state.entries.len() - visible;

        Ok(QueueAttributes::from([
            (
                "ApproximateNumberOfMessages".to_string(),
                visible.to_string(),
            ),
            (
                "ApproximateNumberOfMessagesNotVisible".to_string(),
                hidden.to_string(),
            ),
            (
                VISIBILITY_TIMEOUT_ATTRIBUTE.to_string(),
                state.visibility_timeout.as_secs().to_string(),
            ),
        ]))
    }
}
