// src/s3_utils.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! `ObjectStore` adapter over the async AWS Rust SDK.

use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::Client;
use tracing::{debug, trace};

use crate::config::S3Config;
use crate::error::{MaterializeError, Result};
use crate::object_store::{BodyStream, ObjectStore, ObjectStream, RemoteObject};
use crate::s3_client::build_s3_client;

/// S3 adapter around a caller-supplied client.
#[derive(Clone, Debug)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn from_config(config: &S3Config) -> Self {
        Self::new(build_s3_client(config).await)
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn name(&self) -> &'static str {
        "s3"
    }

    /// List every key that starts with `prefix` (handles pagination lazily).
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<ObjectStream> {
        let client = self.client.clone();
        let bucket = bucket.to_owned();
        let prefix = prefix.to_owned();

        let stream = try_stream! {
            let mut cont: Option<String> = None;
            let mut page = 0usize;
            loop {
                let mut req = client.list_objects_v2().bucket(&bucket);
                if !prefix.is_empty() {
                    req = req.prefix(&prefix);
                }
                if let Some(token) = &cont {
                    req = req.continuation_token(token);
                }
                let resp = req
                    .send()
                    .await
                    .map_err(|e| classify(e, &bucket, None))?;
                page += 1;
                trace!(bucket = %bucket, prefix = %prefix, page, keys = resp.contents().len(), "list page");

                for obj in resp.contents() {
                    if let Some(key) = obj.key() {
                        let size = obj.size().unwrap_or(0).max(0) as u64;
                        yield RemoteObject::new(key, size);
                    }
                }
                match resp.next_continuation_token() {
                    Some(token) => cont = Some(token.to_owned()),
                    None => break,
                }
            }
        };
        Ok(stream.boxed())
    }

    async fn get_object_body(&self, bucket: &str, key: &str) -> Result<BodyStream> {
        debug!(bucket, key, "get_object");
        let resp = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify(e, bucket, Some(key)))?;

        let bucket = bucket.to_owned();
        let key = key.to_owned();
        let stream = try_stream! {
            let mut body = resp.body;
            while let Some(chunk) = body.try_next().await.map_err(|e| {
                MaterializeError::unavailable(format!("reading s3://{bucket}/{key}: {e}"))
            })? {
                yield chunk;
            }
        };
        Ok(stream.boxed())
    }

    /// `HeadObject` on the exact key; a 404 is `None`.
    async fn stat_object(&self, bucket: &str, key: &str) -> Result<Option<RemoteObject>> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(resp) => {
                let size = resp.content_length().unwrap_or(0).max(0) as u64;
                Ok(Some(RemoteObject::new(key, size)))
            }
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => {
                trace!(bucket, key, "head_object: not found");
                Ok(None)
            }
            Err(e) => Err(classify(e, bucket, Some(key))),
        }
    }
}

/// Map SDK failures onto the error taxonomy by their S3 error code.
fn classify<E, R>(err: SdkError<E, R>, bucket: &str, key: Option<&str>) -> MaterializeError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let target = match key {
        Some(key) => format!("s3://{bucket}/{key}"),
        None => format!("s3://{bucket}"),
    };
    match (err.code(), key) {
        (Some("NoSuchKey"), Some(key)) => MaterializeError::not_found(bucket, key),
        (Some("AccessDenied" | "Forbidden" | "AllAccessDisabled" | "InvalidAccessKeyId" | "SignatureDoesNotMatch"), _) => {
            MaterializeError::AccessDenied(format!("{target}: {}", DisplayErrorContext(&err)))
        }
        (Some("NoSuchBucket"), _) => {
            MaterializeError::unavailable(format!("bucket `{bucket}` does not exist"))
        }
        _ => MaterializeError::unavailable(format!("{target}: {}", DisplayErrorContext(&err))),
    }
}
