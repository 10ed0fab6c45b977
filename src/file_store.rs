// src/file_store.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// FileSystemObjectStore: the ObjectStore interface over a local directory tree.
// Each bucket is a directory directly under the store root and keys are
// `/`-separated paths beneath it, so `file://bucket/a/b.txt` maps to
// `<root>/bucket/a/b.txt`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use bytes::Bytes;
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::{debug, trace};

use crate::error::{MaterializeError, Result};
use crate::object_store::{BodyStream, ObjectStore, ObjectStream, RemoteObject};

/// Read buffer for streaming file bodies (64 KiB)
const READ_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Clone, Debug)]
pub struct FileSystemObjectStore {
    root: PathBuf,
}

impl FileSystemObjectStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf> {
        if bucket.is_empty() || bucket.contains('/') || bucket == "." || bucket == ".." {
            return Err(MaterializeError::invalid_location(
                format!("file://{bucket}"),
                "bucket must be a single directory name",
            ));
        }
        Ok(self.root.join(bucket))
    }

    /// Convert a key to a path under the bucket, refusing anything that would leave it.
    fn key_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        let mut path = self.bucket_dir(bucket)?;
        for segment in key.split('/') {
            match segment {
                "" | "." => continue,
                ".." => {
                    return Err(MaterializeError::invalid_location(
                        format!("file://{bucket}/{key}"),
                        "key may not contain `..`",
                    ))
                }
                s => path.push(s),
            }
        }
        Ok(path)
    }
}

fn io_to_store_error(err: std::io::Error, bucket: &str, key: &str) -> MaterializeError {
    match err.kind() {
        ErrorKind::NotFound => MaterializeError::not_found(bucket, key),
        ErrorKind::PermissionDenied => {
            MaterializeError::AccessDenied(format!("file://{bucket}/{key}: {err}"))
        }
        _ => MaterializeError::unavailable(format!("file://{bucket}/{key}: {err}")),
    }
}

/// `true` if a directory with key `dir_key/` can contain keys starting with `prefix`.
fn may_contain(dir_key: &str, prefix: &str) -> bool {
    let dir_prefix = format!("{dir_key}/");
    dir_prefix.starts_with(prefix) || prefix.starts_with(&dir_prefix)
}

#[async_trait]
impl ObjectStore for FileSystemObjectStore {
    fn name(&self) -> &'static str {
        "file"
    }

    /// Walks the bucket directory lazily, one directory per poll burst.
    /// Directories that cannot hold matching keys are not descended into.
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<ObjectStream> {
        let bucket_dir = self.bucket_dir(bucket)?;
        match fs::metadata(&bucket_dir).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(MaterializeError::unavailable(format!(
                    "bucket path {} is not a directory",
                    bucket_dir.display()
                )))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(MaterializeError::unavailable(format!(
                    "bucket `{bucket}` does not exist under {}",
                    self.root.display()
                )))
            }
            Err(e) => return Err(io_to_store_error(e, bucket, "")),
        }
        debug!(bucket, prefix, dir = %bucket_dir.display(), "listing local bucket");

        let bucket = bucket.to_owned();
        let prefix = prefix.to_owned();
        let stream = try_stream! {
            // (directory on disk, key of that directory relative to the bucket)
            let mut pending: Vec<(PathBuf, String)> = vec![(bucket_dir, String::new())];
            while let Some((dir, dir_key)) = pending.pop() {
                let mut entries = fs::read_dir(&dir)
                    .await
                    .map_err(|e| io_to_store_error(e, &bucket, &dir_key))?;
                let mut files = Vec::new();
                while let Some(entry) = entries
                    .next_entry()
                    .await
                    .map_err(|e| io_to_store_error(e, &bucket, &dir_key))?
                {
                    let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                        trace!(path = %entry.path().display(), "skipping non UTF-8 name");
                        continue;
                    };
                    let key = if dir_key.is_empty() { name } else { format!("{dir_key}/{name}") };
                    let meta = entry
                        .metadata()
                        .await
                        .map_err(|e| io_to_store_error(e, &bucket, &key))?;
                    if meta.is_dir() {
                        if may_contain(&key, &prefix) {
                            pending.push((entry.path(), key));
                        }
                    } else if key.starts_with(prefix.as_str()) {
                        files.push(RemoteObject::new(key, meta.len()));
                    }
                }
                files.sort_by(|a, b| a.key.cmp(&b.key));
                for object in files {
                    yield object;
                }
            }
        };
        Ok(stream.boxed())
    }

    async fn get_object_body(&self, bucket: &str, key: &str) -> Result<BodyStream> {
        let path = self.key_path(bucket, key)?;
        let mut file = fs::File::open(&path)
            .await
            .map_err(|e| io_to_store_error(e, bucket, key))?;
        if file
            .metadata()
            .await
            .map_err(|e| io_to_store_error(e, bucket, key))?
            .is_dir()
        {
            return Err(MaterializeError::not_found(bucket, key));
        }

        let bucket = bucket.to_owned();
        let key = key.to_owned();
        let stream = try_stream! {
            let mut buf = vec![0u8; READ_CHUNK_SIZE];
            loop {
                let n = file
                    .read(&mut buf)
                    .await
                    .map_err(|e| io_to_store_error(e, &bucket, &key))?;
                if n == 0 {
                    break;
                }
                yield Bytes::copy_from_slice(&buf[..n]);
            }
        };
        Ok(stream.boxed())
    }

    async fn stat_object(&self, bucket: &str, key: &str) -> Result<Option<RemoteObject>> {
        let path = self.key_path(bucket, key)?;
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(Some(RemoteObject::new(key, meta.len()))),
            Ok(_) => Ok(None),
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => Ok(None),
            Err(e) => Err(io_to_store_error(e, bucket, key)),
        }
    }
}
