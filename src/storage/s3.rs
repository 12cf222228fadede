//! S3 storage backend.
//!
//! Streams backups into S3 with multipart uploads: parts of at most
//! `part_size` bytes are read from the body and uploaded one at a time, so
//! memory use is bounded by a single part. Bodies that fit into one part are
//! stored with a single `PutObject`. A multipart upload that fails midway is
//! aborted so no orphaned parts are left behind.

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart, StorageClass};
use aws_sdk_s3::Client;
use tracing::{debug, info, warn};
use url::Url;

use super::{read_part, ByteSource, ObjectStore, PutOptions, StorageError};

/// Object store backed by AWS S3 or an S3-compatible service.
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    base: aws_sdk_s3::Config,
    endpoint: Option<String>,
    force_path_style: bool,
}

impl S3ObjectStore {
    /// Create a store from a loaded AWS SDK configuration.
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self::from_s3_config(aws_sdk_s3::Config::from(sdk_config))
    }

    /// Create a store from an explicit S3 client configuration.
    pub fn from_s3_config(config: aws_sdk_s3::Config) -> Self {
        Self { base: config, endpoint: None, force_path_style: false }
    }

    /// Send requests to a custom endpoint (MinIO, LocalStack, test servers).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>, force_path_style: bool) -> Self {
        let endpoint = endpoint.into();
        self.base = self
            .base
            .to_builder()
            .endpoint_url(endpoint.clone())
            .force_path_style(force_path_style)
            .build();
        self.endpoint = Some(endpoint);
        self.force_path_style = force_path_style;
        self
    }

    fn client_for(&self, region: &str) -> Client {
        let config = self.base.to_builder().region(Region::new(region.to_string())).build();
        Client::from_conf(config)
    }

    /// URL of an object, used when the service does not report a location.
    pub fn object_url(&self, bucket: &str, region: &str, key: &str) -> String {
        let base = match (&self.endpoint, self.force_path_style) {
            (Some(endpoint), true) => format!("{}/{}", endpoint.trim_end_matches('/'), bucket),
            (Some(endpoint), false) => match Url::parse(endpoint) {
                Ok(url) => format!(
                    "{}://{}.{}",
                    url.scheme(),
                    bucket,
                    url.host_str().unwrap_or_default()
                ),
                Err(_) => format!("{}/{}", endpoint.trim_end_matches('/'), bucket),
            },
            (None, _) => format!("https://{}.s3.{}.amazonaws.com", bucket, region),
        };

        match Url::parse(&base) {
            Ok(mut url) => {
                if let Ok(mut segments) = url.path_segments_mut() {
                    segments.pop_if_empty().extend(key.split('/'));
                }
                url.to_string()
            }
            Err(_) => format!("{}/{}", base, key),
        }
    }

    async fn put_single(
        &self,
        client: &Client,
        key: &str,
        body: Vec<u8>,
        options: &PutOptions,
    ) -> Result<String, StorageError> {
        debug!(key, bytes = body.len(), "Uploading object with a single PutObject");

        client
            .put_object()
            .bucket(&options.bucket)
            .key(key)
            .storage_class(StorageClass::from(options.storage_class.as_str()))
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| {
                StorageError::request(
                    key,
                    format!("PutObject failed: {}", DisplayErrorContext(&e)),
                    e,
                )
            })?;

        Ok(self.object_url(&options.bucket, &options.region, key))
    }

    async fn put_multipart(
        &self,
        client: &Client,
        key: &str,
        first_part: Vec<u8>,
        body: &mut ByteSource,
        options: &PutOptions,
    ) -> Result<String, StorageError> {
        let created = client
            .create_multipart_upload()
            .bucket(&options.bucket)
            .key(key)
            .storage_class(StorageClass::from(options.storage_class.as_str()))
            .send()
            .await
            .map_err(|e| {
                StorageError::request(
                    key,
                    format!("CreateMultipartUpload failed: {}", DisplayErrorContext(&e)),
                    e,
                )
            })?;

        let upload_id = created
            .upload_id()
            .ok_or_else(|| {
                StorageError::request_message(key, "CreateMultipartUpload returned no upload id")
            })?
            .to_string();

        debug!(key, upload_id = %upload_id, "Started multipart upload");

        match self.upload_parts(client, key, &upload_id, first_part, body, options).await {
            Ok(location) => Ok(location),
            Err(err) => {
                if let Err(abort_err) = client
                    .abort_multipart_upload()
                    .bucket(&options.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    warn!(
                        key,
                        upload_id = %upload_id,
                        error = %DisplayErrorContext(&abort_err),
                        "Failed to abort multipart upload"
                    );
                }
                Err(err)
            }
        }
    }

    async fn upload_parts(
        &self,
        client: &Client,
        key: &str,
        upload_id: &str,
        first_part: Vec<u8>,
        body: &mut ByteSource,
        options: &PutOptions,
    ) -> Result<String, StorageError> {
        let mut completed = Vec::new();
        let mut part = first_part;
        let mut part_number: i32 = 1;

        while !part.is_empty() {
            let size = part.len();
            let uploaded = client
                .upload_part()
                .bucket(&options.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(part))
                .send()
                .await
                .map_err(|e| {
                    StorageError::request(
                        key,
                        format!("UploadPart {} failed: {}", part_number, DisplayErrorContext(&e)),
                        e,
                    )
                })?;

            debug!(key, part_number, bytes = size, "Uploaded part");

            completed.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .set_e_tag(uploaded.e_tag().map(str::to_string))
                    .build(),
            );

            part = read_part(body, key, options.part_size).await?;
            part_number += 1;
        }

        let output = client
            .complete_multipart_upload()
            .bucket(&options.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(CompletedMultipartUpload::builder().set_parts(Some(completed)).build())
            .send()
            .await
            .map_err(|e| {
                StorageError::request(
                    key,
                    format!("CompleteMultipartUpload failed: {}", DisplayErrorContext(&e)),
                    e,
                )
            })?;

        Ok(output
            .location()
            .map(str::to_string)
            .unwrap_or_else(|| self.object_url(&options.bucket, &options.region, key)))
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(
        &self,
        key: &str,
        mut body: ByteSource,
        options: &PutOptions,
    ) -> Result<String, StorageError> {
        info!(bucket = %options.bucket, key, "Uploading to S3");

        let client = self.client_for(&options.region);
        let first_part = read_part(&mut body, key, options.part_size).await?;

        let location = if (first_part.len() as u64) < options.part_size {
            self.put_single(&client, key, first_part, options).await?
        } else {
            self.put_multipart(&client, key, first_part, &mut body, options).await?
        };

        info!(location = %location, "Uploaded to S3");
        Ok(location)
    }
}
