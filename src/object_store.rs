// src/object_store.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// Pluggable object-store abstraction used by the materializer.
// Backends: s3:// (S3ObjectStore), file:// (FileSystemObjectStore),
// plus InMemoryObjectStore for deterministic tests.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::config::S3Config;
use crate::error::{MaterializeError, Result};
use crate::file_store::FileSystemObjectStore;
use crate::s3_utils::S3ObjectStore;
use crate::uri_utils::{parse_storage_uri, Scheme};

/// One listed object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteObject {
    pub key: String,
    pub size: u64,
}

impl RemoteObject {
    pub fn new(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            size,
        }
    }
}

/// Lazy, finite listing. Pages are fetched as the stream is polled and the
/// stream is consumed once.
pub type ObjectStream = BoxStream<'static, Result<RemoteObject>>;

/// Object content delivered chunk by chunk.
pub type BodyStream = BoxStream<'static, Result<Bytes>>;

/// Narrow storage capability the materializer needs.
///
/// Implementations are passed in explicitly; nothing here reads global
/// client state.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Every object in `bucket` whose key starts with `prefix` (plain string
    /// prefix, like S3's ListObjectsV2). An empty prefix lists the bucket.
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<ObjectStream>;

    /// Full content of one object.
    ///
    /// Fails with `ObjectNotFound` if the key is gone and `AccessDenied` on
    /// permission failure.
    async fn get_object_body(&self, bucket: &str, key: &str) -> Result<BodyStream>;

    /// The object stored under exactly `key`, or `None`.
    ///
    /// The default reads the first entry of a listing for `key`; in a
    /// lexicographically ordered listing the exact key sorts before every
    /// longer key sharing it. Backends with a cheap point lookup override this.
    async fn stat_object(&self, bucket: &str, key: &str) -> Result<Option<RemoteObject>> {
        use futures::TryStreamExt;

        let mut listing = self.list_objects(bucket, key).await?;
        Ok(listing.try_next().await?.filter(|object| object.key == key))
    }

    /// Convenience: read a whole object into memory.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes> {
        use futures::TryStreamExt;

        let chunks: Vec<Bytes> = self.get_object_body(bucket, key).await?.try_collect().await?;
        Ok(Bytes::from(chunks.concat()))
    }
}

/// Convenience factory that picks a built-in backend from a URI.
///
/// Callers that already hold a client (or want GCS/Azure through their own
/// adapter) should construct an `ObjectStore` themselves instead.
pub async fn store_for_uri(uri: &str, config: &S3Config) -> Result<Arc<dyn ObjectStore>> {
    let parsed = parse_storage_uri(uri)?;
    match parsed.scheme {
        Scheme::S3 => Ok(Arc::new(S3ObjectStore::from_config(config).await)),
        Scheme::File => Ok(Arc::new(FileSystemObjectStore::new(&config.file_root))),
        other => Err(MaterializeError::invalid_location(
            uri,
            format!("no built-in backend for {other}://, supply an ObjectStore for it"),
        )),
    }
}
