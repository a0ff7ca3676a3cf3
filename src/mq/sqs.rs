use async_trait::async_trait;
use aws_sdk_sqs::{
    config::BehaviorVersion,
    error::SdkError,
    operation::{
        delete_message::DeleteMessageError, get_queue_attributes::GetQueueAttributesError,
        send_message::SendMessageError,
    },
    types::QueueAttributeName,
    Client,
};

use super::{
    MessageQueue, QueueAttributes, QueueError, QueueHandle, ReceiveOptions, ReceivedMessage,
};

/// SQS caps a single receive at ten messages.
const MAX_MESSAGES_PER_RECEIVE: usize = 10;

/// SQS caps long-poll waits at twenty seconds.
const MAX_WAIT_TIME_SECONDS: u64 = 20;

/// Configuration for connecting to SQS or an SQS-compatible service.
#[derive(Debug, Clone)]
pub struct SqsConfig {
    /// Optional custom endpoint URL (e.g., for local development with LocalStack).
    pub endpoint: Option<String>,
    /// The AWS region.
    pub region: String,
}

impl SqsConfig {
    /// Creates a new `SqsConfig` with explicit values.
    #[must_use]
    pub const fn new(endpoint: Option<String>, region: String) -> Self {
        Self { endpoint, region }
    }
}

/// Message queue backed by Amazon SQS.
#[derive(Debug, Clone)]
pub struct SqsMessageQueue {
    client: Client,
}

impl SqsMessageQueue {
    /// Creates a new `SqsMessageQueue` with the given configuration.
    pub async fn new(config: &SqsConfig) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_sdk_sqs::config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut sqs_config_builder = aws_sdk_sqs::config::Builder::from(&sdk_config);
        if let Some(ref endpoint) = config.endpoint {
            sqs_config_builder = sqs_config_builder.endpoint_url(endpoint);
        }

        Self {
            client: Client::from_conf(sqs_config_builder.build()),
        }
    }
}

#[async_trait]
impl MessageQueue for SqsMessageQueue {
    async fn ensure_queue(
        &self,
        name: &str,
        attributes: &QueueAttributes,
    ) -> Result<QueueHandle, QueueError> {
        // Look the queue up first; creating it requires broader permissions.
        match self.client.get_queue_url().queue_name(name).send().await {
            Ok(output) => {
                if let Some(url) = output.queue_url() {
                    return Ok(QueueHandle::new(url));
                }
            }
            Err(err) => {
                tracing::debug!(queue = %name, error = %err, "Queue lookup failed, creating queue");
            }
        }

        let mut request = self.client.create_queue().queue_name(name);
        for (attribute, value) in attributes {
            request = request.attributes(QueueAttributeName::from(attribute.as_str()), value);
        }

        let output = request.send().await.map_err(|ref err| map_sdk_error(err))?;
        output
            .queue_url()
            .map(QueueHandle::new)
            .ok_or_else(|| QueueError::Backend(format!("CreateQueue returned no URL for {name}")))
    }

    async fn send(&self, queue: &QueueHandle, body: &str) -> Result<String, QueueError> {
        let output = self
            .client
            .send_message()
            .queue_url(queue.as_str())
            .message_body(body)
            .send()
            .await
            .map_err(|ref err| map_send_error(err, queue))?;

        output
            .message_id()
            .map(ToString::to_string)
            .ok_or_else(|| QueueError::Backend("SendMessage returned no message id".to_string()))
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    async fn receive(
        &self,
        queue: &QueueHandle,
        options: ReceiveOptions,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let max_messages = options.max_messages.clamp(1, MAX_MESSAGES_PER_RECEIVE) as i32;
        let wait_seconds = options.wait_time.as_secs().min(MAX_WAIT_TIME_SECONDS) as i32;

        let output = self
            .client
            .receive_message()
            .queue_url(queue.as_str())
            .max_number_of_messages(max_messages)
            .wait_time_seconds(wait_seconds)
            .send()
            .await
            .map_err(|ref err| map_sdk_error(err))?;

        Ok(output
            .messages()
            .iter()
            .filter_map(|message| {
                Some(ReceivedMessage {
                    id: message.message_id()?.to_string(),
                    receipt_handle: message.receipt_handle()?.to_string(),
                    body: message.body().unwrap_or_default().to_string(),
                })
            })
            .collect())
    }

    async fn delete(&self, queue: &QueueHandle, receipt_handle: &str) -> Result<(), QueueError> {
        self.client
            .delete_message()
            .queue_url(queue.as_str())
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|ref err| map_delete_error(err, receipt_handle))?;

        Ok(())
    }

    async fn attributes(&self, queue: &QueueHandle) -> Result<QueueAttributes, QueueError> {
        let output = self
            .client
            .get_queue_attributes()
            .queue_url(queue.as_str())
            .attribute_names(QueueAttributeName::All)
            .send()
            .await
            .map_err(|ref err| map_attributes_error(err, queue))?;

        Ok(output
            .attributes()
            .map(|attributes| {
                attributes
                    .iter()
                    .map(|(name, value)| (name.as_str().to_string(), value.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Maps any SQS SDK error to `QueueError`, separating connection failures.
fn map_sdk_error<E, R>(err: &SdkError<E, R>) -> QueueError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    if let SdkError::DispatchFailure(dispatch_err) = err {
        if dispatch_err.is_io() || dispatch_err.is_timeout() {
            return QueueError::ConnectionError(err.to_string());
        }
    }
    QueueError::Backend(err.to_string())
}

/// Maps `SendMessage` errors to `QueueError`.
fn map_send_error(err: &SdkError<SendMessageError>, queue: &QueueHandle) -> QueueError {
    if let SdkError::ServiceError(service_err) = err {
        if service_err.err().meta().code() == Some("AWS.SimpleQueueService.NonExistentQueue") {
            return QueueError::NoSuchQueue {
                queue: queue.to_string(),
            };
        }
    }
    map_sdk_error(err)
}

/// Maps `DeleteMessage` errors to `QueueError`.
fn map_delete_error(err: &SdkError<DeleteMessageError>, receipt_handle: &str) -> QueueError {
    if let SdkError::ServiceError(service_err) = err {
        if matches!(
            service_err.err(),
            DeleteMessageError::ReceiptHandleIsInvalid(_) | DeleteMessageError::InvalidIdFormat(_)
        ) {
            return QueueError::InvalidReceiptHandle {
                receipt_handle: receipt_handle.to_string(),
            };
        }
    }
    map_sdk_error(err)
}

/// Maps `GetQueueAttributes` errors to `QueueError`.
fn map_attributes_error(
    err: &SdkError<GetQueueAttributesError>,
    queue: &QueueHandle,
) -> QueueError {
    if let SdkError::ServiceError(service_err) = err {
        if matches!(
            service_err.err(),
            GetQueueAttributesError::QueueDoesNotExist(_)
        ) {
            return QueueError::NoSuchQueue {
                queue: queue.to_string(),
            };
        }
    }
    map_sdk_error(err)
}
