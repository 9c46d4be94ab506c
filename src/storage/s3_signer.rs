// cdr-restore/src/storage/s3_signer.rs
use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::config::Region;
use s3::error::DisplayErrorContext;
use s3::presigning::PresigningConfig;
use std::time::Duration;
use tracing::debug;

use super::UrlSigner;
use crate::config::StorageConfig;
use crate::errors::{RestoreError, Result};

/// Produces pre-signed GET URLs through the S3 API of the storage provider.
///
/// Works against any S3-compatible endpoint, including the Cloud Storage
/// interoperability endpoint with HMAC keys.
pub struct S3UrlSigner {
    client: s3::Client,
}

impl S3UrlSigner {
    pub async fn from_config(storage: &StorageConfig) -> Self {
        let mut loader = aws_config::defaults(s3::config::BehaviorVersion::latest())
            .region(Region::new(storage.region.clone()));

        if let Some(endpoint) = &storage.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        // Without static keys the default provider chain (env, profile, IMDS) applies.
        if let Some((access_key_id, secret_access_key)) = &storage.static_credentials {
            loader = loader.credentials_provider(s3::config::Credentials::new(
                access_key_id,
                secret_access_key,
                None, // session_token
                None, // expiry
                "Static", // provider_name
            ));
        }

        let sdk_config = loader.load().await;
        let s3_config = s3::config::Builder::from(&sdk_config)
            .force_path_style(storage.force_path_style)
            .build();

        Self {
            client: s3::Client::from_conf(s3_config),
        }
    }
}

#[async_trait]
impl UrlSigner for S3UrlSigner {
    async fn sign(&self, bucket: &str, object_path: &str, validity: Duration) -> Result<String> {
        let presigning = PresigningConfig::expires_in(validity)
            .map_err(|e| RestoreError::Signing(format!("invalid validity {:?}: {}", validity, e)))?;

        let request = self
            .client
            .get_object()
            .bucket(bucket)
            .key(object_path)
            .presigned(presigning)
            .await
            .map_err(|e| {
                RestoreError::Signing(format!(
                    "s3://{}/{}: {}",
                    bucket,
                    object_path,
                    DisplayErrorContext(&e)
                ))
            })?;

        debug!(bucket, object = object_path, "Signed object URL");
        Ok(request.uri().to_string())
    }
}
