// src/constants.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// Centralized constants for objtree to avoid hardcoded values throughout the codebase

/// Lower bound for the default download concurrency
pub const MIN_DEFAULT_CONCURRENCY: usize = 8;

/// Upper bound for the default download concurrency
pub const MAX_DEFAULT_CONCURRENCY: usize = 64;

/// Region used when neither the environment nor the AWS provider chain has one
pub const DEFAULT_REGION: &str = "us-east-1";

/// Separator between key segments in object storage
pub const KEY_SEPARATOR: char = '/';

/// Default page size for the in-memory store (matches S3's ListObjectsV2 max-keys)
pub const DEFAULT_LIST_PAGE_SIZE: usize = 1000;

// ============================================================================
// Environment variables
// ============================================================================

/// Override the maximum number of parallel downloads
pub const ENV_CONCURRENCY: &str = "OBJTREE_CONCURRENCY";

/// Set to `false`/`0`/`no` to keep existing destination files
pub const ENV_OVERWRITE: &str = "OBJTREE_OVERWRITE";

/// Use path-style S3 addressing (MinIO, Ceph and friends)
pub const ENV_FORCE_PATH_STYLE: &str = "OBJTREE_S3_FORCE_PATH_STYLE";

/// Root directory that `file://` buckets live under
pub const ENV_FILE_ROOT: &str = "OBJTREE_FILE_ROOT";

pub const ENV_AWS_REGION: &str = "AWS_REGION";
pub const ENV_AWS_ENDPOINT_URL: &str = "AWS_ENDPOINT_URL";
