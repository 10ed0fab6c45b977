// src/uri_utils.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Storage URI parsing and prefix normalization.
//!
//! `scheme://bucket/key...` is split into a bucket and a key prefix. The prefix
//! is normalized so that `bucket/a/b` and `bucket/a/b/` name the same logical
//! root, and matching against listed keys always requires a full `/`
//! separator, so `project/v1` never picks up `project/v10/...`.
//!
//! No network access happens here.

use std::fmt;

use crate::constants::KEY_SEPARATOR;
use crate::error::{MaterializeError, Result};

/// A minimal scheme enum so we can route URIs to a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    S3,
    Gcs,
    Azure,
    File,
    Unknown,
}

impl Scheme {
    fn from_label(label: &str) -> Self {
        match label.to_ascii_lowercase().as_str() {
            "s3" => Scheme::S3,
            "gs" | "gcs" => Scheme::Gcs,
            "az" => Scheme::Azure,
            "file" => Scheme::File,
            _ => Scheme::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::S3 => "s3",
            Scheme::Gcs => "gs",
            Scheme::Azure => "az",
            Scheme::File => "file",
            Scheme::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Best-effort scheme inference from a URI.
pub fn infer_scheme(uri: &str) -> Scheme {
    match uri.split_once("://") {
        Some((label, _)) => Scheme::from_label(label),
        None => Scheme::Unknown,
    }
}

/// Raw split of a storage URI, before any prefix normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageUri {
    pub scheme: Scheme,
    pub bucket: String,
    /// Everything after `bucket/`, untouched. May be empty (bucket root).
    pub key_path: String,
}

/// Split `scheme://bucket/key` → (`scheme`, `bucket`, `key`).
pub fn parse_storage_uri(uri: &str) -> Result<StorageUri> {
    let (label, rest) = uri
        .split_once("://")
        .ok_or_else(|| MaterializeError::invalid_location(uri, "missing `scheme://`"))?;

    let scheme = Scheme::from_label(label);
    if scheme == Scheme::Unknown {
        return Err(MaterializeError::invalid_location(
            uri,
            format!("unrecognized scheme `{label}`; supported: s3://, gs://, az://, file://"),
        ));
    }

    let (bucket, key_path) = rest.split_once(KEY_SEPARATOR).unwrap_or((rest, ""));
    if bucket.is_empty() {
        return Err(MaterializeError::invalid_location(uri, "bucket is empty"));
    }

    Ok(StorageUri {
        scheme,
        bucket: bucket.to_owned(),
        key_path: key_path.to_owned(),
    })
}

/// A bucket plus a normalized key prefix.
///
/// `prefix` never starts with `/` and never carries the one trailing `/` the
/// caller may have typed. It may be empty, meaning the whole bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedLocation {
    pub scheme: Scheme,
    pub bucket: String,
    pub prefix: String,
}

impl ResolvedLocation {
    pub fn new(scheme: Scheme, bucket: impl Into<String>, prefix: impl AsRef<str>) -> Self {
        Self {
            scheme,
            bucket: bucket.into(),
            prefix: normalize_prefix(prefix.as_ref()),
        }
    }

    /// `true` if `key` equals the prefix or sits beneath it as a directory.
    pub fn matches(&self, key: &str) -> bool {
        self.relative_path(key).is_some()
    }

    /// The part of `key` after the prefix and its separating `/`.
    ///
    /// Returns `Some("")` for the key equal to the prefix itself and `None`
    /// for keys outside this location.
    pub fn relative_path<'k>(&self, key: &'k str) -> Option<&'k str> {
        if self.prefix.is_empty() {
            return Some(key);
        }
        let rest = key.strip_prefix(self.prefix.as_str())?;
        if rest.is_empty() {
            return Some(rest);
        }
        rest.strip_prefix(KEY_SEPARATOR)
    }

    /// Listing prefix for everything beneath this location: `prefix/`, or
    /// the empty string for the bucket root.
    pub fn children_prefix(&self) -> String {
        if self.prefix.is_empty() {
            String::new()
        } else {
            format!("{}{}", self.prefix, KEY_SEPARATOR)
        }
    }

    /// Last segment of the prefix, used as the file name in the single-object case.
    pub fn basename(&self) -> &str {
        key_basename(&self.prefix)
    }

    /// A location one level deeper: `prefix/name`.
    pub fn child(&self, name: &str) -> Self {
        let name = name.trim_matches(KEY_SEPARATOR);
        let prefix = if self.prefix.is_empty() {
            name.to_owned()
        } else {
            format!("{}{}{}", self.prefix, KEY_SEPARATOR, name)
        };
        Self {
            scheme: self.scheme,
            bucket: self.bucket.clone(),
            prefix,
        }
    }

    pub fn to_uri(&self) -> String {
        format!("{}://{}/{}", self.scheme, self.bucket, self.prefix)
    }
}

impl fmt::Display for ResolvedLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uri())
    }
}

/// Resolve a storage URI into a bucket and normalized prefix.
///
/// ```
/// use objtree::uri_utils::resolve;
///
/// let a = resolve("s3://bucket/project/").unwrap();
/// let b = resolve("s3://bucket/project").unwrap();
/// assert_eq!(a, b);
/// assert_eq!(a.prefix, "project");
/// ```
pub fn resolve(uri: &str) -> Result<ResolvedLocation> {
    let parsed = parse_storage_uri(uri)?;
    Ok(ResolvedLocation::new(parsed.scheme, parsed.bucket, &parsed.key_path))
}

fn normalize_prefix(key_path: &str) -> String {
    let trimmed = key_path.trim_start_matches(KEY_SEPARATOR);
    trimmed
        .strip_suffix(KEY_SEPARATOR)
        .unwrap_or(trimmed)
        .to_owned()
}

/// Final `/`-separated segment of a key.
pub fn key_basename(key: &str) -> &str {
    key.rsplit(KEY_SEPARATOR).next().unwrap_or(key)
}
