//! Google Cloud Storage generation store
//!
//! Generations are GCS object generations, so the bucket must have object
//! versioning enabled: without it every write destroys the previous
//! generation. Buckets created by this store are versioned from the start.

use async_trait::async_trait;
use bsr_core::Source;
use google_cloud_storage::client::google_cloud_auth::credentials::CredentialsFile;
use google_cloud_storage::client::{Client, ClientConfig};
use google_cloud_storage::http::Error as GcsError;
use google_cloud_storage::http::buckets::Versioning;
use google_cloud_storage::http::buckets::get::GetBucketRequest;
use google_cloud_storage::http::buckets::insert::{
    BucketCreationConfig, InsertBucketParam, InsertBucketRequest,
};
use google_cloud_storage::http::objects::delete::DeleteObjectRequest;
use google_cloud_storage::http::objects::download::Range;
use google_cloud_storage::http::objects::get::GetObjectRequest;
use google_cloud_storage::http::objects::list::ListObjectsRequest;
use google_cloud_storage::http::objects::upload::{Media, UploadObjectRequest, UploadType};
use log::{debug, info};

use crate::store::{GenerationStore, StoreError, StoreResult};

/// Bucket location used when the source names no GCP region
const DEFAULT_LOCATION: &str = "US";

/// GCS-based generation store
pub struct GcsStore {
    client: Client,
    bucket: String,
    /// Bucket location for auto-creation
    location: String,
    /// Project that owns auto-created buckets
    project_id: Option<String>,
    /// Whether to auto-create the bucket if it doesn't exist (default: true)
    auto_create: bool,
}

impl GcsStore {
    /// Create a new GcsStore from a source
    ///
    /// Authenticates with `gcp-service-account-key` when given, otherwise with
    /// application default credentials.
    pub async fn from_source(source: &Source) -> StoreResult<Self> {
        let bucket = source
            .bucket_name()
            .ok_or_else(|| StoreError::configuration("gcs backend requires source.bucket"))?
            .to_string();

        let config = match &source.gcp_service_account_key {
            Some(key) => {
                let credentials = CredentialsFile::new_from_str(key).await.map_err(|e| {
                    StoreError::configuration(format!("invalid gcp-service-account-key: {}", e))
                })?;
                ClientConfig::default()
                    .with_credentials(credentials)
                    .await
                    .map_err(|e| StoreError::Gcs(e.to_string()))?
            }
            None => ClientConfig::default()
                .with_auth()
                .await
                .map_err(|e| StoreError::Gcs(e.to_string()))?,
        };
        let project_id = config.project_id.clone();

        Ok(Self {
            client: Client::new(config),
            bucket,
            location: source
                .gcp_region
                .clone()
                .unwrap_or_else(|| DEFAULT_LOCATION.to_string()),
            project_id,
            auto_create: source.auto_create,
        })
    }

    /// Make sure the bucket exists and keeps noncurrent generations
    async fn ensure_versioned_bucket(&self) -> StoreResult<()> {
        let request = GetBucketRequest {
            bucket: self.bucket.clone(),
            ..Default::default()
        };
        match self.client.get_bucket(&request).await {
            Ok(bucket) => {
                if bucket.versioning.map(|v| v.enabled) == Some(true) {
                    Ok(())
                } else {
                    Err(StoreError::configuration(format!(
                        "bucket {} does not have object versioning enabled",
                        self.bucket
                    )))
                }
            }
            Err(err) if is_not_found_error(&err) => {
                if !self.auto_create {
                    return Err(StoreError::BucketNotFound(self.bucket.clone()));
                }
                self.create_bucket().await
            }
            Err(err) => Err(StoreError::Gcs(err.to_string())),
        }
    }

    /// Create the bucket with object versioning enabled
    async fn create_bucket(&self) -> StoreResult<()> {
        let Some(project) = &self.project_id else {
            return Err(StoreError::BucketCreationFailed(format!(
                "{}: credentials name no project to create it in",
                self.bucket
            )));
        };
        info!(
            "Creating versioned bucket {} in {} ({})",
            self.bucket, self.location, project
        );

        let request = InsertBucketRequest {
            name: self.bucket.clone(),
            param: InsertBucketParam {
                project: project.clone(),
                ..Default::default()
            },
            bucket: BucketCreationConfig {
                location: self.location.clone(),
                versioning: Some(Versioning { enabled: true }),
                ..Default::default()
            },
        };
        self.client
            .insert_bucket(&request)
            .await
            .map_err(|e| StoreError::BucketCreationFailed(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl GenerationStore for GcsStore {
    fn describe(&self) -> String {
        format!("gs://{}", self.bucket)
    }

    async fn list_generations(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut listed = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let request = ListObjectsRequest {
                bucket: self.bucket.clone(),
                prefix: Some(key.to_string()),
                versions: Some(true),
                page_token: page_token.take(),
                ..Default::default()
            };
            let response = match self.client.list_objects(&request).await {
                Ok(response) => response,
                // A missing bucket has never been written to
                Err(err) if is_not_found_error(&err) => return Ok(Vec::new()),
                Err(err) => return Err(StoreError::Gcs(err.to_string())),
            };

            listed.extend(
                response
                    .items
                    .unwrap_or_default()
                    .into_iter()
                    .map(|object| (object.name, object.generation)),
            );

            match response.next_page_token {
                Some(token) if !token.is_empty() => {
                    debug!("Listing more generations of {}", key);
                    page_token = Some(token);
                }
                _ => break,
            }
        }

        Ok(generations_of(key, listed))
    }

    async fn read_generation(&self, key: &str, generation: &str) -> StoreResult<Option<Vec<u8>>> {
        let Some(generation) = parse_generation(generation) else {
            return Ok(None);
        };
        let request = GetObjectRequest {
            bucket: self.bucket.clone(),
            object: key.to_string(),
            generation: Some(generation),
            ..Default::default()
        };

        match self.client.download_object(&request, &Range::default()).await {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if is_not_found_error(&err) => Ok(None),
            Err(err) => Err(StoreError::Gcs(err.to_string())),
        }
    }

    async fn write_generation(&self, key: &str, contents: Vec<u8>) -> StoreResult<String> {
        self.ensure_versioned_bucket().await?;

        let mut media = Media::new(key.to_string());
        media.content_type = "application/json".into();
        let request = UploadObjectRequest {
            bucket: self.bucket.clone(),
            ..Default::default()
        };
        let object = self
            .client
            .upload_object(&request, contents, &UploadType::Simple(media))
            .await
            .map_err(|e| StoreError::Gcs(e.to_string()))?;
        Ok(object.generation.to_string())
    }

    async fn latest_generation(&self, key: &str) -> StoreResult<Option<String>> {
        let request = GetObjectRequest {
            bucket: self.bucket.clone(),
            object: key.to_string(),
            ..Default::default()
        };

        // Only the live generation is returned without an explicit generation
        match self.client.get_object(&request).await {
            Ok(object) => Ok(Some(object.generation.to_string())),
            Err(err) if is_not_found_error(&err) => Ok(None),
            Err(err) => Err(StoreError::Gcs(err.to_string())),
        }
    }

    async fn mark_removed(&self, key: &str) -> StoreResult<()> {
        self.ensure_versioned_bucket().await?;

        // Deleting the live object in a versioned bucket keeps it as noncurrent
        let request = DeleteObjectRequest {
            bucket: self.bucket.clone(),
            object: key.to_string(),
            ..Default::default()
        };
        match self.client.delete_object(&request).await {
            Ok(()) => {
                debug!("Archived live generation of {}", key);
                Ok(())
            }
            Err(err) if is_not_found_error(&err) => Ok(()),
            Err(err) => Err(StoreError::Gcs(err.to_string())),
        }
    }
}

/// Generations of exactly `key`, oldest first
///
/// A prefix listing also returns longer keys such as "prod/bbl-state.json.bak".
/// Generation numbers of one object only ever grow.
fn generations_of(key: &str, listed: Vec<(String, i64)>) -> Vec<String> {
    let mut generations: Vec<i64> = listed
        .into_iter()
        .filter(|(name, _)| name == key)
        .map(|(_, generation)| generation)
        .collect();
    generations.sort_unstable();
    generations.dedup();
    generations.into_iter().map(|g| g.to_string()).collect()
}

/// Parse a ref into a GCS generation number
fn parse_generation(reference: &str) -> Option<i64> {
    reference
        .parse::<i64>()
        .ok()
        .filter(|generation| *generation > 0 && generation.to_string() == reference)
}

/// Check if a GCS error is a "not found" error
fn is_not_found_error(err: &GcsError) -> bool {
    matches!(err, GcsError::Response(response) if response.code == 404)
}
