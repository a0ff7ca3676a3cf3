use async_trait::async_trait;
use aws_sdk_s3::{
    config::BehaviorVersion,
    error::SdkError,
    operation::{
        create_bucket::CreateBucketError, delete_object::DeleteObjectError,
        get_object::GetObjectError, head_object::HeadObjectError, put_object::PutObjectError,
    },
    primitives::ByteStream as S3Body,
    types::{BucketLocationConstraint, CreateBucketConfiguration, ObjectCannedAcl},
    Client,
};
use bytes::Bytes;

use super::{ByteStream, Metadata, ObjectMetadata, ObjectStore, StorageError, StoredObject};

/// Region in which buckets are created without a location constraint.
const DEFAULT_REGION: &str = "us-east-1";

/// Configuration for connecting to an S3-compatible storage service.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// Optional custom endpoint URL (e.g., for local development with LocalStack/MinIO).
    pub endpoint: Option<String>,
    /// The AWS region.
    pub region: String,
}

impl S3Config {
    /// Creates a new `S3Config` with explicit values.
    #[must_use]
    pub const fn new(endpoint: Option<String>, region: String) -> Self {
        Self { endpoint, region }
    }
}

/// Object store backed by S3 or an S3-compatible service.
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: Client,
    region: String,
}

impl S3ObjectStore {
    /// Creates a new `S3ObjectStore` with the given configuration.
    ///
    /// Credentials are resolved through the AWS default provider chain. A
    /// custom endpoint switches the client to path-style addressing, which
    /// most S3-compatible services require.
    pub async fn new(config: &S3Config) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(ref endpoint) = config.endpoint {
            s3_config_builder = s3_config_builder
                .endpoint_url(endpoint)
                .force_path_style(true);
        }

        Self {
            client: Client::from_conf(s3_config_builder.build()),
            region: config.region.clone(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn ensure_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        let mut request = self.client.create_bucket().bucket(bucket);
        if self.region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => Ok(()),
            Err(ref err) if is_already_owned_error(err) => {
                tracing::debug!(bucket = %bucket, "Bucket already owned by caller");
                Ok(())
            }
            Err(ref err) => Err(map_create_bucket_error(err, bucket)),
        }
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        metadata: &Metadata,
        content_type: Option<&str>,
    ) -> Result<(), StorageError> {
        let mut request = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .acl(ObjectCannedAcl::Private)
            .body(S3Body::from(body));

        for (name, value) in metadata {
            request = request.metadata(name, value);
        }
        if let Some(content_type) = content_type {
            request = request.content_type(content_type);
        }

        request
            .send()
            .await
            .map_err(|ref err| map_put_error(err, bucket))?;

        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<StoredObject, StorageError> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|ref err| map_get_error(err, key))?;

        let metadata = response
            .metadata()
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        let content_type = response.content_type().map(ToString::to_string);

        let body = response
            .body
            .collect()
            .await
            .map_err(|err| StorageError::Stream(format!("Failed to read body: {err}")))?
            .into_bytes();

        Ok(StoredObject {
            key: key.to_string(),
            metadata,
            body,
            content_type,
        })
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, StorageError> {
        let response = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|ref err| map_head_error(err, key))?;

        Ok(ObjectMetadata {
            metadata: response
                .metadata()
                .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                .unwrap_or_default(),
            content_type: response.content_type().map(ToString::to_string),
        })
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|ref err| map_delete_error(err))?;

        Ok(())
    }

    async fn open_read_stream(&self, bucket: &str, key: &str) -> Result<ByteStream, StorageError> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|ref err| map_get_error(err, key))?;

        let stream = futures::stream::unfold(Some(response.body), |body| async move {
            let mut body = body?;
            match body.next().await {
                Some(Ok(chunk)) => Some((Ok(chunk), Some(body))),
                Some(Err(err)) => Some((Err(StorageError::Stream(err.to_string())), None)),
                None => None,
            }
        });

        Ok(Box::pin(stream))
    }
}

/// Checks if a `CreateBucket` error means the caller already owns the bucket.
fn is_already_owned_error(err: &SdkError<CreateBucketError>) -> bool {
    matches!(
        err,
        SdkError::ServiceError(service_err)
            if matches!(service_err.err(), CreateBucketError::BucketAlreadyOwnedByYou(_))
    )
}

/// Returns `true` for dispatch failures caused by I/O or timeouts.
fn is_connection_error<E, R>(err: &SdkError<E, R>) -> bool {
    matches!(err, SdkError::DispatchFailure(dispatch_err) if dispatch_err.is_io() || dispatch_err.is_timeout())
}

/// Maps `CreateBucket` errors to `StorageError`.
fn map_create_bucket_error(err: &SdkError<CreateBucketError>, bucket: &str) -> StorageError {
    if let SdkError::ServiceError(service_err) = err {
        if service_err.raw().status().as_u16() == 403 {
            return StorageError::AccessDenied {
                bucket: bucket.to_string(),
            };
        }
    }
    if is_connection_error(err) {
        return StorageError::ConnectionError(err.to_string());
    }
    StorageError::Backend(err.to_string())
}

/// Maps `PutObject` errors to `StorageError`.
fn map_put_error(err: &SdkError<PutObjectError>, bucket: &str) -> StorageError {
    if let SdkError::ServiceError(service_err) = err {
        match service_err.raw().status().as_u16() {
            403 => {
                return StorageError::AccessDenied {
                    bucket: bucket.to_string(),
                }
            }
            404 => {
                return StorageError::NoSuchBucket {
                    bucket: bucket.to_string(),
                }
            }
            _ => {}
        }
    }
    if is_connection_error(err) {
        return StorageError::ConnectionError(err.to_string());
    }
    StorageError::Backend(err.to_string())
}

/// Maps `GetObject` errors to `StorageError`.
fn map_get_error(err: &SdkError<GetObjectError>, key: &str) -> StorageError {
    if let SdkError::ServiceError(service_err) = err {
        if matches!(service_err.err(), GetObjectError::NoSuchKey(_))
            || service_err.raw().status().as_u16() == 404
        {
            return StorageError::NotFound {
                key: key.to_string(),
            };
        }
    }
    if is_connection_error(err) {
        return StorageError::ConnectionError(err.to_string());
    }
    StorageError::Backend(err.to_string())
}

/// Maps `HeadObject` errors to `StorageError`.
fn map_head_error(err: &SdkError<HeadObjectError>, key: &str) -> StorageError {
    if let SdkError::ServiceError(service_err) = err {
        if matches!(service_err.err(), HeadObjectError::NotFound(_))
            || service_err.raw().status().as_u16() == 404
        {
            return StorageError::NotFound {
                key: key.to_string(),
            };
        }
    }
    if is_connection_error(err) {
        return StorageError::ConnectionError(err.to_string());
    }
    StorageError::Backend(err.to_string())
}

/// Maps `DeleteObject` errors to `StorageError`.
fn map_delete_error(err: &SdkError<DeleteObjectError>) -> StorageError {
    if is_connection_error(err) {
        return StorageError::ConnectionError(err.to_string());
    }
    StorageError::Backend(err.to_string())
}
