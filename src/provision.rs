//! Bucket and queue provisioning.

use std::collections::HashMap;

use futures::future::try_join_all;

use crate::config::RemoteJobConfig;
use crate::error::RemoteJobError;
use crate::mq::{MessageQueue, QueueHandle};
use crate::storage::ObjectStore;

/// Maps logical queue names to the backend handles resolved at provisioning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueRegistry {
    handles: HashMap<String, QueueHandle>,
}

impl QueueRegistry {
    /// Resolves a logical queue name.
    ///
    /// # Errors
    ///
    /// Returns `RemoteJobError::UnknownQueue` if the name was not provisioned.
    pub fn resolve(&self, name: &str) -> Result<&QueueHandle, RemoteJobError> {
        self.handles
            .get(name)
            .ok_or_else(|| RemoteJobError::UnknownQueue {
                queue: name.to_string(),
            })
    }

    /// Number of provisioned queues.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Returns `true` if no queues were provisioned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl FromIterator<(String, QueueHandle)> for QueueRegistry {
    fn from_iter<I: IntoIterator<Item = (String, QueueHandle)>>(iter: I) -> Self {
        Self {
            handles: iter.into_iter().collect(),
        }
    }
}

/// Ensures the bucket and every configured queue exist.
///
/// The bucket and all queues are provisioned concurrently. The first failure
/// short-circuits the rest and becomes the provisioning outcome; there is no
/// retry.
#[derive(Debug)]
pub struct ResourceProvisioner<'a> {
    store: &'a dyn ObjectStore,
    queue: &'a dyn MessageQueue,
    config: &'a RemoteJobConfig,
}

impl<'a> ResourceProvisioner<'a> {
    /// Creates a provisioner over the given backends.
    #[must_use]
    pub fn new(
        store: &'a dyn ObjectStore,
        queue: &'a dyn MessageQueue,
        config: &'a RemoteJobConfig,
    ) -> Self {
        Self {
            store,
            queue,
            config,
        }
    }

    /// Runs provisioning and returns the resolved queue handles.
    ///
    /// # Errors
    ///
    /// Returns `RemoteJobError::Provisioning` naming the first resource that
    /// could not be created.
    pub async fn provision(&self) -> Result<QueueRegistry, RemoteJobError> {
        let bucket = &self.config.bucket;
        let ensure_bucket = async {
            self.store.ensure_bucket(bucket).await.map_err(|e| {
                RemoteJobError::Provisioning {
                    resource: format!("bucket '{bucket}'"),
                    message: e.to_string(),
                }
            })
        };

        let attributes = self.config.queues.backend_attributes();
        let ensure_queues = try_join_all(self.config.queues.provisioned_names().into_iter().map(
            |name| {
                let attributes = &attributes;
                async move {
                    let backend_name = self.config.queues.backend_name(&name);
                    let handle = self
                        .queue
                        .ensure_queue(&backend_name, attributes)
                        .await
                        .map_err(|e| RemoteJobError::Provisioning {
                            resource: format!("queue '{backend_name}'"),
                            message: e.to_string(),
                        })?;
                    tracing::debug!(queue = %name, handle = %handle, "Queue ready");
                    Ok::<_, RemoteJobError>((name, handle))
                }
            },
        ));

        let ((), handles) = futures::try_join!(ensure_bucket, ensure_queues)?;
        Ok(handles.into_iter().collect())
    }
}
