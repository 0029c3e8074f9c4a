//! S3-backed [`ReleaseStore`].

use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Credentials as AwsCredentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use jetmaster_shared::{Credentials, MasterError, ReleaseDescriptor, Result, StorageConfig};
use tracing::{debug, info, instrument};

use crate::{ReleaseStore, parse_descriptor};

/// Provider name recorded on statically configured credentials.
const CREDENTIALS_PROVIDER: &str = "jetmaster-config";

/// Release store on an S3 bucket.
///
/// The client is built eagerly; the bucket is only required once a request
/// is made, so commands that never touch storage run without it.
#[derive(Clone)]
pub struct S3ReleaseStore {
    client: Client,
    bucket: Option<String>,
}

impl S3ReleaseStore {
    /// Build a store from config, with credentials from the process environment.
    pub async fn connect(config: &StorageConfig) -> Self {
        Self::connect_with(config, config.credentials()).await
    }

    /// Build a store from config and explicitly resolved credentials.
    ///
    /// Without credentials or region the AWS default provider chain applies.
    pub async fn connect_with(config: &StorageConfig, credentials: Option<Credentials>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());

        if let Some(region) = config.resolved_region() {
            debug!(%region, "using configured region");
            loader = loader.region(Region::new(region));
        }

        if let Some(creds) = credentials {
            loader = loader.credentials_provider(AwsCredentials::new(
                creds.access_key_id,
                creds.secret_key,
                None,
                None,
                CREDENTIALS_PROVIDER,
            ));
        }

        let sdk_config = loader.load().await;

        Self {
            client: Client::new(&sdk_config),
            bucket: config.bucket.clone(),
        }
    }

    fn bucket(&self) -> Result<&str> {
        self.bucket
            .as_deref()
            .ok_or_else(|| MasterError::config("no bucket configured. Set S3_BUCKET"))
    }
}

#[async_trait]
impl ReleaseStore for S3ReleaseStore {
    #[instrument(skip(self))]
    async fn fetch_descriptor(&self, key: &str) -> Result<Option<ReleaseDescriptor>> {
        let bucket = self.bucket()?;
        info!(bucket, key, "fetching descriptor");

        match self.client.get_object().bucket(bucket).key(key).send().await {
            Ok(output) => {
                let bytes = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| MasterError::storage(format!("{bucket}/{key}: {e}")))?
                    .into_bytes();
                parse_descriptor(&bytes, key).map(Some)
            }
            Err(err) => {
                let service = err.as_service_error();
                let not_found = service
                    .is_some_and(|e| e.is_no_such_key() || e.code() == Some("NotFound"));
                if not_found {
                    debug!(bucket, key, "descriptor does not exist");
                    return Ok(None);
                }

                let mut message = format!("{bucket}/{key}: {}", DisplayErrorContext(&err));
                if let Some(hint) = missing_key_hint(service.and_then(|e| e.code())) {
                    message.push_str(hint);
                }
                Err(MasterError::storage(message))
            }
        }
    }

    #[instrument(skip(self), fields(local_path = %local_path.display()))]
    async fn upload(&self, local_path: &Path, key: &str) -> Result<String> {
        let bucket = self.bucket()?;

        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| MasterError::storage(format!("{}: {e}", local_path.display())))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .content_type("application/json")
            .acl(ObjectCannedAcl::PublicRead)
            .send()
            .await
            .map_err(|e| {
                MasterError::storage(format!("upload to {bucket}/{key}: {}", DisplayErrorContext(&e)))
            })?;

        let url = public_url(bucket, key);
        info!(%url, "upload complete");
        Ok(url)
    }
}

/// S3 reports a missing key as `AccessDenied` when the caller lacks
/// `s3:ListBucket`. That stays fatal, but the message says so.
fn missing_key_hint(code: Option<&str>) -> Option<&'static str> {
    (code == Some("AccessDenied")).then_some(
        " (a missing key is reported as AccessDenied when the credentials lack s3:ListBucket)",
    )
}

/// Public HTTP URL of an object in a public-read bucket.
pub fn public_url(bucket: &str, key: &str) -> String {
    format!("https://{bucket}.s3.amazonaws.com/{}", key.trim_start_matches('/'))
}
