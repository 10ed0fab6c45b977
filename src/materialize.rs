// src/materialize.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Remote-prefix-to-local-tree materializer.
//!
//! Given a resolved `(bucket, prefix)` and a destination directory, lists every
//! object that belongs under the prefix, decides between the single-file and
//! the tree layout, and downloads each object to its relative path under the
//! destination with a bounded number of concurrent GETs.
//!
//! Nothing is rolled back on failure: an error means the destination may be
//! incomplete and should be discarded.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{stream, StreamExt, TryStreamExt};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use crate::config::MaterializeConfig;
use crate::constants::KEY_SEPARATOR;
use crate::error::{MaterializeError, Result};
use crate::object_store::{ObjectStore, RemoteObject};
use crate::uri_utils::{key_basename, resolve, ResolvedLocation};

/// One object of the tree layout together with its path under the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub object: RemoteObject,
    pub relative_path: String,
}

/// How the listed objects land on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layout {
    /// Exactly one object whose key is the prefix itself.
    SingleFile(RemoteObject),
    /// Everything else, each object at its path relative to the prefix.
    Tree(Vec<TreeEntry>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutKind {
    SingleFile,
    Tree,
}

impl Layout {
    pub fn kind(&self) -> LayoutKind {
        match self {
            Layout::SingleFile(_) => LayoutKind::SingleFile,
            Layout::Tree(_) => LayoutKind::Tree,
        }
    }
}

/// Decide the layout from the listing result alone.
///
/// `objects` must already be restricted to keys that belong to `location`.
/// Keys whose relative path is empty or ends in `/` are directory markers and
/// are dropped from the tree. A lone marker equal to the prefix is a marker
/// too, so it yields an empty tree rather than a file.
pub fn plan_layout(location: &ResolvedLocation, mut objects: Vec<RemoteObject>) -> Layout {
    if objects.len() == 1
        && !location.prefix.is_empty()
        && objects[0].key == location.prefix
        && !objects[0].key.ends_with(KEY_SEPARATOR)
    {
        if let Some(object) = objects.pop() {
            return Layout::SingleFile(object);
        }
    }

    let entries = objects
        .into_iter()
        .filter_map(|object| {
            let relative = location.relative_path(&object.key)?;
            if relative.is_empty() || relative.ends_with(KEY_SEPARATOR) {
                debug!(key = %object.key, "skipping directory marker");
                return None;
            }
            let relative_path = relative.to_owned();
            Some(TreeEntry {
                object,
                relative_path,
            })
        })
        .collect();
    Layout::Tree(entries)
}

/// Map a `/`-separated relative key onto a path under `root`.
///
/// Rejects anything that would resolve outside `root`.
pub fn local_path(root: &Path, relative: &str) -> Result<PathBuf> {
    let mut path = root.to_path_buf();
    let mut pushed = 0usize;
    for segment in relative.split(KEY_SEPARATOR) {
        if segment.is_empty() || segment == "." {
            continue;
        }
        let mut components = Path::new(segment).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) => {
                path.push(part);
                pushed += 1;
            }
            _ => {
                return Err(MaterializeError::invalid_location(
                    relative,
                    "key does not map to a path inside the destination",
                ))
            }
        }
    }
    if pushed == 0 {
        return Err(MaterializeError::invalid_location(relative, "key has no file name"));
    }
    Ok(path)
}

/// Fail if two keys land on the same local file (`a//b` and `a/b`, for instance).
fn ensure_distinct_paths(location: &ResolvedLocation, jobs: &[(RemoteObject, PathBuf)]) -> Result<()> {
    let mut seen: HashMap<&Path, &str> = HashMap::with_capacity(jobs.len());
    for (object, path) in jobs {
        if let Some(first) = seen.insert(path.as_path(), object.key.as_str()) {
            return Err(MaterializeError::invalid_location(
                location.to_string(),
                format!(
                    "keys `{first}` and `{}` both map to {}",
                    object.key,
                    path.display()
                ),
            ));
        }
    }
    Ok(())
}

/// Statistics for a completed materialization
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DownloadStats {
    /// Objects written to disk
    pub objects_count: usize,
    /// Objects left alone because the file existed and overwrite was off
    pub skipped_count: usize,
    /// Bytes written
    pub total_bytes: u64,
    pub elapsed: Duration,
    /// Average throughput in bytes per second
    pub throughput_bps: f64,
}

/// The local result of one `materialize` call.
#[derive(Debug, Clone)]
pub struct MaterializedTree {
    /// The destination root that was populated
    pub root: PathBuf,
    pub kind: LayoutKind,
    /// Every file written or kept, sorted
    pub files: Vec<PathBuf>,
    pub stats: DownloadStats,
}

enum Outcome {
    Written(u64),
    Skipped,
}

/// Downloads remote prefixes into local directories through one `ObjectStore`.
#[derive(Clone)]
pub struct Materializer {
    store: Arc<dyn ObjectStore>,
    config: MaterializeConfig,
}

impl Materializer {
    pub fn new(store: Arc<dyn ObjectStore>, config: MaterializeConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &MaterializeConfig {
        &self.config
    }

    /// Every object that belongs to `location`: the key equal to the prefix,
    /// if any, followed by everything listed under `prefix/`.
    ///
    /// Siblings that merely share the string prefix (`v10` next to `v1`) are
    /// never listed.
    pub async fn list_location(&self, location: &ResolvedLocation) -> Result<Vec<RemoteObject>> {
        let listing = self
            .store
            .list_objects(&location.bucket, &location.children_prefix())
            .await?;
        let mut objects: Vec<RemoteObject> = Vec::new();
        if !location.prefix.is_empty() {
            objects.extend(
                self.store
                    .stat_object(&location.bucket, &location.prefix)
                    .await?,
            );
        }
        let children: Vec<RemoteObject> = listing
            .try_filter(|object| futures::future::ready(location.matches(&object.key)))
            .try_collect()
            .await?;
        objects.extend(children);
        debug!(
            backend = self.store.name(),
            location = %location,
            matched = objects.len(),
            "listing complete"
        );
        Ok(objects)
    }

    /// Resolve `uri`, then materialize it under `dest`.
    pub async fn materialize_uri(&self, uri: &str, dest: impl AsRef<Path>) -> Result<MaterializedTree> {
        let location = resolve(uri)?;
        self.materialize(&location, dest.as_ref()).await
    }

    #[instrument(skip_all, fields(location = %location, dest = %dest.display()))]
    pub async fn materialize(&self, location: &ResolvedLocation, dest: &Path) -> Result<MaterializedTree> {
        let start = Instant::now();
        let objects = self.list_location(location).await?;
        if objects.is_empty() {
            warn!("no objects under {}", location);
        }

        let layout = plan_layout(location, objects);
        let kind = layout.kind();
        let jobs: Vec<(RemoteObject, PathBuf)> = match layout {
            Layout::SingleFile(object) => {
                let path = local_path(dest, key_basename(&object.key))?;
                vec![(object, path)]
            }
            Layout::Tree(entries) => entries
                .into_iter()
                .map(|entry| -> Result<(RemoteObject, PathBuf)> {
                    let path = local_path(dest, &entry.relative_path)?;
                    Ok((entry.object, path))
                })
                .collect::<Result<_>>()?,
        };
        ensure_distinct_paths(location, &jobs)?;
        debug!(?kind, objects = jobs.len(), "layout decided");

        create_dir(dest).await?;

        let mut stats = self.download_all(&location.bucket, jobs.iter()).await?;
        stats.elapsed = start.elapsed();
        stats.throughput_bps = throughput(stats.total_bytes, stats.elapsed);

        let mut files: Vec<PathBuf> = jobs.into_iter().map(|(_, path)| path).collect();
        files.sort();

        info!(
            "materialized {} into {}: {} written, {} skipped, {} bytes in {:.2?}",
            location,
            dest.display(),
            stats.objects_count,
            stats.skipped_count,
            stats.total_bytes,
            stats.elapsed
        );
        Ok(MaterializedTree {
            root: dest.to_path_buf(),
            kind,
            files,
            stats,
        })
    }

    /// Fetch one named file from a directory-like URI into `dest`.
    ///
    /// `s3://bucket/profiles/` with `profiles.yml` fetches
    /// `profiles/profiles.yml`; a URI that already ends in the file name is
    /// used as is. Returns the path of the written file.
    pub async fn fetch_file(&self, uri: &str, file_name: &str, dest: impl AsRef<Path>) -> Result<PathBuf> {
        let dest = dest.as_ref();
        let location = resolve(uri)?;
        let target = if location.basename() == file_name {
            location
        } else {
            location.child(file_name)
        };

        let object = self
            .store
            .stat_object(&target.bucket, &target.prefix)
            .await?
            .ok_or_else(|| MaterializeError::not_found(&target.bucket, &target.prefix))?;

        let path = local_path(dest, key_basename(&object.key))?;
        create_dir(dest).await?;
        let job = (object, path);
        self.download_all(&target.bucket, std::iter::once(&job)).await?;
        Ok(job.1)
    }

    /// Run all downloads through a pool of at most `concurrency` in flight.
    /// The first failure drops every other in-flight download.
    async fn download_all<'a, I>(&self, bucket: &str, jobs: I) -> Result<DownloadStats>
    where
        I: Iterator<Item = &'a (RemoteObject, PathBuf)>,
    {
        let overwrite = self.config.overwrite;
        let mut results = stream::iter(jobs.map(|(object, path)| {
            download_object(self.store.as_ref(), bucket, &object.key, path, overwrite)
        }))
        .buffer_unordered(self.config.effective_concurrency());

        let mut stats = DownloadStats::default();
        while let Some(outcome) = results.next().await {
            match outcome? {
                Outcome::Written(bytes) => {
                    stats.objects_count += 1;
                    stats.total_bytes += bytes;
                }
                Outcome::Skipped => stats.skipped_count += 1,
            }
        }
        Ok(stats)
    }
}

/// Download one object to `path`, creating its parent directories first.
async fn download_object(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
    path: &Path,
    overwrite: bool,
) -> Result<Outcome> {
    if !overwrite {
        match fs::metadata(path).await {
            Ok(meta) if meta.is_file() => {
                debug!(key, path = %path.display(), "exists, skipping");
                return Ok(Outcome::Skipped);
            }
            // Not a regular file: File::create below reports the conflict.
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(MaterializeError::local_write(path, e)),
        }
    }
    if let Some(parent) = path.parent() {
        create_dir(parent).await?;
    }

    let mut body = store.get_object_body(bucket, key).await?;
    let mut file = fs::File::create(path)
        .await
        .map_err(|e| MaterializeError::local_write(path, e))?;
    let mut written = 0u64;
    while let Some(chunk) = body.try_next().await? {
        file.write_all(&chunk)
            .await
            .map_err(|e| MaterializeError::local_write(path, e))?;
        written += chunk.len() as u64;
    }
    file.flush()
        .await
        .map_err(|e| MaterializeError::local_write(path, e))?;

    debug!(key, path = %path.display(), bytes = written, "object written");
    Ok(Outcome::Written(written))
}

/// `create_dir_all` already treats an existing directory as success, so
/// concurrent downloads may race on the same ancestors.
async fn create_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .await
        .map_err(|e| MaterializeError::local_write(dir, e))
}

fn throughput(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        bytes as f64 / secs
    } else {
        0.0
    }
}

/// Resolve `uri` and materialize it into `dest` with `store`; returns the root.
pub async fn materialize(
    store: Arc<dyn ObjectStore>,
    uri: &str,
    dest: impl AsRef<Path>,
    config: &MaterializeConfig,
) -> Result<PathBuf> {
    let tree = Materializer::new(store, config.clone())
        .materialize_uri(uri, dest)
        .await?;
    Ok(tree.root)
}
