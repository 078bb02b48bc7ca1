//! S3 generation store
//!
//! Generations are S3 object versions, so the bucket must have versioning
//! enabled. Buckets created by this store are versioned from the start.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketVersioningStatus, PublicAccessBlockConfiguration, ServerSideEncryption,
    VersioningConfiguration,
};
use bsr_core::Source;
use log::{debug, info};

use crate::store::{GenerationStore, StoreError, StoreResult};

/// S3-based generation store
pub struct S3Store {
    /// S3 client
    client: Client,
    /// Bucket name
    bucket: String,
    /// AWS region
    region: String,
    /// Whether to encrypt written generations (default: true)
    encrypt: bool,
    /// Whether to auto-create the bucket if it doesn't exist (default: true)
    auto_create: bool,
}

/// One entry of a version listing, in the order S3 returned it (newest first)
#[derive(Debug, Clone, PartialEq)]
struct ListedVersion {
    version_id: String,
    /// Last-modified time as (seconds, subsecond nanos) since the epoch
    last_modified: Option<(i64, u32)>,
}

impl S3Store {
    /// Create a new S3Store from a source
    pub async fn from_source(source: &Source) -> StoreResult<Self> {
        let region = source.region_or_default().to_string();

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(region.clone()));
        if let (Some(access_key_id), Some(secret_access_key)) =
            (&source.access_key_id, &source.secret_access_key)
        {
            loader = loader.credentials_provider(Credentials::new(
                access_key_id,
                secret_access_key,
                None,
                None,
                "bsr-source",
            ));
        }
        let aws_config = loader.load().await;

        let mut config = aws_sdk_s3::config::Builder::from(&aws_config);
        if let Some(endpoint) = &source.endpoint {
            config = config.endpoint_url(endpoint).force_path_style(true);
        }
        let client = Client::from_conf(config.build());

        let bucket = source
            .bucket_name()
            .ok_or_else(|| StoreError::configuration("s3 backend requires source.bucket"))?;

        Ok(Self {
            client,
            bucket: bucket.to_string(),
            region,
            encrypt: source.encrypt,
            auto_create: source.auto_create,
        })
    }

    /// Unversioned buckets report no version id (or the literal "null")
    fn require_version_id(&self, version_id: Option<&str>) -> StoreResult<String> {
        match version_id {
            Some(version_id) if version_id != "null" => Ok(version_id.to_string()),
            _ => Err(StoreError::configuration(format!(
                "bucket {} does not have versioning enabled",
                self.bucket
            ))),
        }
    }

    /// Make sure the bucket exists before the first write
    async fn ensure_bucket(&self) -> StoreResult<()> {
        if self.bucket_exists().await? {
            return Ok(());
        }
        if !self.auto_create {
            return Err(StoreError::BucketNotFound(self.bucket.clone()));
        }
        info!("Creating versioned bucket {} in {}", self.bucket, self.region);
        self.create_bucket().await
    }

    /// Check if the bucket exists
    async fn bucket_exists(&self) -> StoreResult<bool> {
        let result = self.client.head_bucket().bucket(&self.bucket).send().await;

        match result {
            Ok(_) => Ok(true),
            Err(err) => {
                if is_not_found_error(&err) {
                    Ok(false)
                } else {
                    Err(StoreError::Aws(err.to_string()))
                }
            }
        }
    }

    /// Create the bucket with versioning enabled and public access blocked
    async fn create_bucket(&self) -> StoreResult<()> {
        // Create bucket with location constraint if not us-east-1
        let mut create_request = self.client.create_bucket().bucket(&self.bucket);

        if self.region != "us-east-1" {
            use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};

            let constraint = BucketLocationConstraint::from(self.region.as_str());
            let config = CreateBucketConfiguration::builder()
                .location_constraint(constraint)
                .build();
            create_request = create_request.create_bucket_configuration(config);
        }

        create_request
            .send()
            .await
            .map_err(|e| StoreError::BucketCreationFailed(e.to_string()))?;

        let versioning_config = VersioningConfiguration::builder()
            .status(BucketVersioningStatus::Enabled)
            .build();

        self.client
            .put_bucket_versioning()
            .bucket(&self.bucket)
            .versioning_configuration(versioning_config)
            .send()
            .await
            .map_err(|e| StoreError::Aws(format!("Failed to enable versioning: {}", e)))?;

        let public_access_block = PublicAccessBlockConfiguration::builder()
            .block_public_acls(true)
            .block_public_policy(true)
            .ignore_public_acls(true)
            .restrict_public_buckets(true)
            .build();

        self.client
            .put_public_access_block()
            .bucket(&self.bucket)
            .public_access_block_configuration(public_access_block)
            .send()
            .await
            .map_err(|e| StoreError::Aws(format!("Failed to block public access: {}", e)))?;

        Ok(())
    }
}

#[async_trait]
impl GenerationStore for S3Store {
    fn describe(&self) -> String {
        format!("s3://{}", self.bucket)
    }

    async fn list_generations(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut listed = Vec::new();
        let mut key_marker: Option<String> = None;
        let mut version_id_marker: Option<String> = None;

        loop {
            let result = self
                .client
                .list_object_versions()
                .bucket(&self.bucket)
                .prefix(key)
                .set_key_marker(key_marker.take())
                .set_version_id_marker(version_id_marker.take())
                .send()
                .await;

            let output = match result {
                Ok(output) => output,
                // A missing bucket has never been written to
                Err(err) if is_not_found_error(&err) => return Ok(Vec::new()),
                Err(err) => return Err(StoreError::Aws(err.to_string())),
            };

            // The prefix also matches longer keys, e.g. "prod/bbl-state.json.bak"
            for object in output.versions() {
                if object.key() != Some(key) {
                    continue;
                }
                let Some(version_id) = object.version_id() else {
                    continue;
                };
                listed.push(ListedVersion {
                    version_id: version_id.to_string(),
                    last_modified: object
                        .last_modified()
                        .map(|t| (t.secs(), t.subsec_nanos())),
                });
            }

            if output.is_truncated() == Some(true) {
                key_marker = output.next_key_marker().map(str::to_string);
                version_id_marker = output.next_version_id_marker().map(str::to_string);
                debug!("Listing more versions of {} after {:?}", key, key_marker);
            } else {
                break;
            }
        }

        Ok(oldest_first(listed))
    }

    async fn read_generation(&self, key: &str, generation: &str) -> StoreResult<Option<Vec<u8>>> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .version_id(generation)
            .send()
            .await;

        match result {
            Ok(output) => {
                let body = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| StoreError::Io(e.to_string()))?;
                Ok(Some(body.into_bytes().to_vec()))
            }
            Err(err) => {
                if is_missing_version_error(&err) {
                    Ok(None)
                } else {
                    Err(StoreError::Aws(err.to_string()))
                }
            }
        }
    }

    async fn write_generation(&self, key: &str, contents: Vec<u8>) -> StoreResult<String> {
        self.ensure_bucket().await?;

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(contents))
            .content_type("application/json");

        if self.encrypt {
            request = request.server_side_encryption(ServerSideEncryption::Aes256);
        }

        let output = request
            .send()
            .await
            .map_err(|e| StoreError::Aws(e.to_string()))?;

        self.require_version_id(output.version_id())
    }

    async fn latest_generation(&self, key: &str) -> StoreResult<Option<String>> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(output) => self.require_version_id(output.version_id()).map(Some),
            // Also the answer when the newest version is a delete marker
            Err(err) if is_not_found_error(&err) => Ok(None),
            Err(err) => Err(StoreError::Aws(err.to_string())),
        }
    }

    async fn mark_removed(&self, key: &str) -> StoreResult<()> {
        // Without a version id this adds a delete marker and keeps every version
        let output = self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StoreError::Aws(e.to_string()))?;

        if output.delete_marker() != Some(true) {
            return Err(StoreError::configuration(format!(
                "bucket {} does not have versioning enabled",
                self.bucket
            )));
        }
        debug!("Added delete marker for {}", key);
        Ok(())
    }
}

/// Order a newest-first listing oldest first
///
/// S3 lists the versions of a key newest first. Sorting the reversed listing
/// by last-modified keeps the service order for versions written within the
/// same timestamp.
fn oldest_first(mut listed: Vec<ListedVersion>) -> Vec<String> {
    listed.reverse();
    listed.sort_by_key(|version| version.last_modified);
    listed.into_iter().map(|version| version.version_id).collect()
}

/// Check if an S3 error is a "not found" error
fn is_not_found_error<E: std::fmt::Debug>(err: &SdkError<E>) -> bool {
    // Check the raw HTTP response status
    if let Some(raw) = err.raw_response() {
        return raw.status().as_u16() == 404;
    }
    false
}

/// Check if a GetObject error means the requested version does not exist
///
/// Malformed version ids are rejected with InvalidArgument rather than 404.
fn is_missing_version_error<E>(err: &SdkError<E>) -> bool
where
    E: ProvideErrorMetadata + std::fmt::Debug,
{
    is_not_found_error(err)
        || matches!(
            err.code(),
            Some("NoSuchKey" | "NoSuchVersion" | "InvalidArgument")
        )
}
