// src/error.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Error taxonomy shared by the resolver, the storage backends and the materializer.
//!
//! Every failure aborts the whole materialization. Callers should treat any
//! error as "destination may be incomplete, discard and retry".

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = MaterializeError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum MaterializeError {
    /// Malformed URI, unknown scheme, or a key that cannot be mapped under the destination.
    #[error("invalid location `{location}`: {reason}")]
    InvalidLocation { location: String, reason: String },

    /// Listing or fetch failed for connectivity / backend reasons.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The object disappeared between listing and fetch.
    #[error("object not found: {bucket}/{key}")]
    ObjectNotFound { bucket: String, key: String },

    /// Credentials were rejected for the bucket or key.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Creating a directory or writing a file failed.
    #[error("local write failed for {}: {source}", path.display())]
    LocalWriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MaterializeError {
    pub fn invalid_location(location: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidLocation {
            location: location.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self::ObjectNotFound {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::BackendUnavailable(msg.into())
    }

    pub fn local_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::LocalWriteFailure {
            path: path.into(),
            source,
        }
    }

    /// Only connectivity failures are worth a caller-side retry; the rest are
    /// either permanent or mean the remote state changed underneath us.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_))
    }

    /// Auth failures are reported separately but belong to the backend class.
    pub fn is_backend_failure(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_) | Self::AccessDenied(_))
    }
}
