//! Object storage for cached panel images.
//!
//! Uploads go through one S3 principal, retrieval URLs are signed by a
//! possibly different url-signing principal. Keys carry a fixed-width
//! millisecond timestamp so listings are lexicographically time-ordered.

use crate::config::Settings;
use aws_credential_types::Credentials;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use aws_types::region::Region;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use url::Url;

/// SigV4 presigned URLs cannot outlive 7 days
const MAX_PRESIGN_EXPIRY: Duration = Duration::from_secs(7 * 86400);

/// Errors produced by storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// Upload failed
    #[error("S3 upload error: {0}")]
    Upload(String),
    /// Listing failed
    #[error("S3 list error: {0}")]
    List(String),
    /// Deletion failed
    #[error("S3 delete error: {0}")]
    Delete(String),
    /// Presigning failed
    #[error("URL signing error: {0}")]
    Sign(String),
    /// The presigned URI did not parse back into a URL
    #[error("signed URL is not a valid URL: {0}")]
    SignedUrl(#[from] url::ParseError),
    /// An operation exceeded the configured timeout
    #[error("S3 {operation} timed out")]
    Timeout {
        /// Operation that timed out
        operation: &'static str,
    },
    /// Required configuration is missing or inconsistent
    #[error("Configuration error: {0}")]
    Config(String),
}

/// A listing entry: key and modification time as reported by the store
#[derive(Debug, Clone)]
pub struct StoredObject {
    /// Object key; listings can produce entries without one
    pub key: Option<String>,
    /// Last modification time
    pub last_modified: Option<DateTime<Utc>>,
}

/// The subset of store operations the retention sweeper needs
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Key prefix under which images live
    fn root(&self) -> &str;

    /// List every object under the root prefix.
    async fn list(&self) -> Result<Vec<StoredObject>, StorageError>;

    /// Delete a single object by key.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// S3-backed store for rendered panel images
pub struct ImageStore {
    client: Client,
    signing_client: Client,
    bucket: String,
    root: String,
    retention: Duration,
}

impl ImageStore {
    /// Create a new image store from the application settings.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError::Config`] if the url-signing credentials
    /// are missing (neither a signing pair nor an upload pair configured).
    pub async fn new(settings: &Settings, retention: Duration) -> Result<Self, StorageError> {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let (Some(key), Some(secret)) =
            (&settings.s3_access_key_id, &settings.s3_secret_access_key)
        {
            loader =
                loader.credentials_provider(Credentials::new(key, secret, None, None, "image-store"));
        }
        match (&settings.s3_region, &settings.s3_endpoint_url) {
            (Some(region), _) => loader = loader.region(Region::new(region.clone())),
            // Custom endpoints (R2, MinIO) do not route by region
            (None, Some(_)) => loader = loader.region(Region::new("auto")),
            (None, None) => {}
        }
        let sdk_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint_url) = &settings.s3_endpoint_url {
            builder = builder.endpoint_url(endpoint_url).force_path_style(true);
        }
        let client = Client::from_conf(builder.clone().build());

        let (signing_key, signing_secret) = settings.signing_credentials();
        let (signing_key, signing_secret) = match (signing_key, signing_secret) {
            (Some(key), Some(secret)) => (key, secret),
            _ => {
                return Err(StorageError::Config(
                    "url-signing credentials are missing: set S3_URL_SIGNING_ACCESS_KEY_ID / \
                     S3_URL_SIGNING_SECRET_ACCESS_KEY or the upload credential pair"
                        .into(),
                ))
            }
        };
        let signing_client = Client::from_conf(
            builder
                .credentials_provider(Credentials::new(
                    signing_key,
                    signing_secret,
                    None,
                    None,
                    "url-signing",
                ))
                .build(),
        );

        Ok(Self {
            client,
            signing_client,
            bucket: settings.s3_bucket.clone(),
            root: settings.s3_root_prefix(),
            retention,
        })
    }

    /// Upload rendered image bytes, returning the storage key.
    ///
    /// The object carries an `Expires` hint of `now + retention` alongside
    /// the sweep-based retention.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the upload fails.
    pub async fn put_image(
        &self,
        image: Bytes,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let now = Utc::now();
        let key = image_key(&self.root, now);
        let expires = aws_sdk_s3::primitives::DateTime::from_secs(
            now.timestamp() + self.retention.as_secs().cast_signed(),
        );

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(image))
            .content_type(content_type)
            .expires(expires)
            .send()
            .await
            .map_err(|e| match e {
                SdkError::TimeoutError(_) => StorageError::Timeout {
                    operation: "upload",
                },
                e => StorageError::Upload(e.to_string()),
            })?;

        Ok(key)
    }

    /// Produce a time-limited signed retrieval URL for a stored image.
    ///
    /// The signature lifetime is the retention window, clamped to the
    /// 7-day SigV4 ceiling.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if presigning fails.
    pub async fn signed_url(&self, key: &str) -> Result<Url, StorageError> {
        let expiry = self.retention.min(MAX_PRESIGN_EXPIRY);
        let presigning = PresigningConfig::expires_in(expiry)
            .map_err(|e| StorageError::Sign(e.to_string()))?;

        let presigned = self
            .signing_client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| match e {
                SdkError::TimeoutError(_) => StorageError::Timeout { operation: "sign" },
                e => StorageError::Sign(e.to_string()),
            })?;

        Ok(Url::parse(presigned.uri())?)
    }

    /// Check connectivity to the bucket, logging the outcome.
    ///
    /// # Errors
    ///
    /// Returns a description of the failure if the bucket is unreachable.
    pub async fn check_connection(&self) -> Result<(), String> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => {
                info!("Successfully connected to image storage.");
                Ok(())
            }
            Err(e) => {
                let err_msg = format!("Image storage connectivity test failed: {e:#?}");
                error!("{}", err_msg);
                Err(err_msg)
            }
        }
    }
}

#[async_trait]
impl ObjectStore for ImageStore {
    fn root(&self) -> &str {
        &self.root
    }

    async fn list(&self) -> Result<Vec<StoredObject>, StorageError> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&self.root)
            .into_paginator()
            .send();

        let mut objects = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| match e {
                SdkError::TimeoutError(_) => StorageError::Timeout { operation: "list" },
                e => StorageError::List(e.to_string()),
            })?;
            for object in page.contents() {
                objects.push(StoredObject {
                    key: object.key().map(str::to_string),
                    last_modified: object
                        .last_modified()
                        .and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos())),
                });
            }
        }
        Ok(objects)
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match e {
                SdkError::TimeoutError(_) => StorageError::Timeout {
                    operation: "delete",
                },
                e => StorageError::Delete(e.to_string()),
            })?;
        Ok(())
    }
}

/// Build the storage key for an image uploaded at `now`.
///
/// The fixed-width `yyyyMMddHHmmssSSS` timestamp keeps keys
/// lexicographically time-ordered under the root prefix.
#[must_use]
pub fn image_key(root: &str, now: DateTime<Utc>) -> String {
    format!("{root}{}.png", now.format("%Y%m%d%H%M%S%3f"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_image_key_format() {
        let at = Utc
            .with_ymd_and_hms(2024, 1, 2, 3, 4, 5)
            .single()
            .expect("timestamp")
            + chrono::Duration::milliseconds(6);
        assert_eq!(image_key("grafana/", at), "grafana/20240102030405006.png");
        assert_eq!(image_key("", at), "20240102030405006.png");
    }

    #[test]
    fn test_image_keys_sort_by_time() {
        let earlier = Utc
            .with_ymd_and_hms(2024, 1, 2, 3, 4, 5)
            .single()
            .expect("timestamp");
        let later = earlier + chrono::Duration::milliseconds(1);
        assert!(image_key("p/", earlier) < image_key("p/", later));
    }
}
