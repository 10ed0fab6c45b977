// src/mem_store.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! In-memory `ObjectStore` for tests and dry runs.
//!
//! Listing is served in pages of `page_size` keys, one page per lock
//! acquisition, so callers see the same lazy behaviour as a paginated
//! backend. Fault injection hooks cover listing failures and denied keys,
//! and counters expose how many GETs were in flight at once.

use std::collections::{BTreeMap, HashSet};
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_stream::try_stream;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tracing::trace;

use crate::constants::DEFAULT_LIST_PAGE_SIZE;
use crate::error::{MaterializeError, Result};
use crate::object_store::{BodyStream, ObjectStore, ObjectStream, RemoteObject};

type Buckets = BTreeMap<String, BTreeMap<String, Bytes>>;

#[derive(Default)]
struct Faults {
    list_failure: Option<String>,
    denied: HashSet<(String, String)>,
}

#[derive(Default)]
struct Counters {
    list_calls: AtomicUsize,
    pages_served: AtomicUsize,
    get_calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Decrements the in-flight counter when a body stream is dropped.
struct InFlight(Arc<Counters>);

impl InFlight {
    fn enter(counters: &Arc<Counters>) -> Self {
        let now = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        counters.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(counters.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub struct InMemoryObjectStore {
    buckets: Arc<RwLock<Buckets>>,
    faults: Arc<RwLock<Faults>>,
    counters: Arc<Counters>,
    page_size: usize,
    latency: Option<Duration>,
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self {
            buckets: Arc::default(),
            faults: Arc::default(),
            counters: Arc::default(),
            page_size: DEFAULT_LIST_PAGE_SIZE,
            latency: None,
        }
    }

    /// Keys returned per listing page (minimum 1).
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Artificial delay before each GET body is handed out.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn create_bucket(&self, bucket: &str) {
        self.write_buckets().entry(bucket.to_owned()).or_default();
    }

    /// Store an object, creating the bucket if needed.
    pub fn put(&self, bucket: &str, key: &str, data: impl Into<Bytes>) {
        self.write_buckets()
            .entry(bucket.to_owned())
            .or_default()
            .insert(key.to_owned(), data.into());
    }

    pub fn remove(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.write_buckets().get_mut(bucket)?.remove(key)
    }

    /// Make every subsequent listing fail with `BackendUnavailable(msg)`.
    pub fn fail_listing(&self, msg: impl Into<String>) {
        self.write_faults().list_failure = Some(msg.into());
    }

    /// Make GETs of one key fail with `AccessDenied`.
    pub fn deny_access(&self, bucket: &str, key: &str) {
        self.write_faults()
            .denied
            .insert((bucket.to_owned(), key.to_owned()));
    }

    pub fn list_calls(&self) -> usize {
        self.counters.list_calls.load(Ordering::SeqCst)
    }

    pub fn pages_served(&self) -> usize {
        self.counters.pages_served.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.counters.get_calls.load(Ordering::SeqCst)
    }

    /// Highest number of GET bodies alive at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.counters.peak_in_flight.load(Ordering::SeqCst)
    }

    fn read_buckets(&self) -> RwLockReadGuard<'_, Buckets> {
        self.buckets.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_buckets(&self) -> RwLockWriteGuard<'_, Buckets> {
        self.buckets.write().unwrap_or_else(|e| e.into_inner())
    }

    fn read_faults(&self) -> RwLockReadGuard<'_, Faults> {
        self.faults.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_faults(&self) -> RwLockWriteGuard<'_, Faults> {
        self.faults.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Next page of matching keys strictly after `after`.
    fn page(&self, bucket: &str, prefix: &str, after: Option<&str>) -> Result<Vec<RemoteObject>> {
        let buckets = self.read_buckets();
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| MaterializeError::unavailable(format!("bucket `{bucket}` does not exist")))?;
        let lower = match after {
            Some(key) => Bound::Excluded(key),
            None => Bound::Included(prefix),
        };
        Ok(objects
            .range::<str, _>((lower, Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .take(self.page_size)
            .map(|(key, data)| RemoteObject::new(key.clone(), data.len() as u64))
            .collect())
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<ObjectStream> {
        self.counters.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(msg) = self.read_faults().list_failure.clone() {
            return Err(MaterializeError::unavailable(msg));
        }

        let store = self.clone();
        let bucket = bucket.to_owned();
        let prefix = prefix.to_owned();
        let stream = try_stream! {
            let mut after: Option<String> = None;
            loop {
                let page = store.page(&bucket, &prefix, after.as_deref())?;
                store.counters.pages_served.fetch_add(1, Ordering::SeqCst);
                trace!(bucket = %bucket, prefix = %prefix, keys = page.len(), "memory list page");
                let full = page.len() == store.page_size;
                after = page.last().map(|o| o.key.clone());
                for object in page {
                    yield object;
                }
                if !full {
                    break;
                }
            }
        };
        Ok(stream.boxed())
    }

    async fn get_object_body(&self, bucket: &str, key: &str) -> Result<BodyStream> {
        self.counters.get_calls.fetch_add(1, Ordering::SeqCst);
        let guard = InFlight::enter(&self.counters);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self
            .read_faults()
            .denied
            .contains(&(bucket.to_owned(), key.to_owned()))
        {
            return Err(MaterializeError::AccessDenied(format!("{bucket}/{key}")));
        }

        let data = self
            .read_buckets()
            .get(bucket)
            .and_then(|objects| objects.get(key).cloned())
            .ok_or_else(|| MaterializeError::not_found(bucket, key))?;

        let stream = try_stream! {
            let _guard = guard;
            if !data.is_empty() {
                yield data;
            }
        };
        Ok(stream.boxed())
    }

    async fn stat_object(&self, bucket: &str, key: &str) -> Result<Option<RemoteObject>> {
        let buckets = self.read_buckets();
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| MaterializeError::unavailable(format!("bucket `{bucket}` does not exist")))?;
        Ok(objects
            .get(key)
            .map(|data| RemoteObject::new(key, data.len() as u64)))
    }
}
