// src/config.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Runtime knobs for materialization and for the built-in S3 client.
//!
//! Everything has a sane default; environment variables (optionally from a
//! `.env` file) override the defaults through the `from_env` constructors.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{
    ENV_AWS_ENDPOINT_URL, ENV_AWS_REGION, ENV_CONCURRENCY, ENV_FILE_ROOT, ENV_FORCE_PATH_STYLE,
    ENV_OVERWRITE, MAX_DEFAULT_CONCURRENCY, MIN_DEFAULT_CONCURRENCY,
};

/// Options for one `materialize` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializeConfig {
    /// Truncate and rewrite files that already exist at the destination.
    /// When `false`, existing files are left as they are.
    pub overwrite: bool,
    /// Maximum number of objects downloaded at the same time.
    pub concurrency: usize,
}

impl Default for MaterializeConfig {
    fn default() -> Self {
        Self {
            overwrite: true,
            concurrency: default_concurrency(),
        }
    }
}

impl MaterializeConfig {
    pub fn builder() -> MaterializeConfigBuilder {
        MaterializeConfigBuilder::new()
    }

    /// Defaults, then `OBJTREE_CONCURRENCY` / `OBJTREE_OVERWRITE`.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let mut config = Self::default();
        if let Some(n) = env::var(ENV_CONCURRENCY).ok().and_then(|s| s.trim().parse().ok()) {
            config.concurrency = n;
        }
        if let Some(flag) = env::var(ENV_OVERWRITE).ok().and_then(|s| parse_flag(&s)) {
            config.overwrite = flag;
        }
        config.normalized()
    }

    /// A concurrency of zero would never make progress.
    pub(crate) fn effective_concurrency(&self) -> usize {
        self.concurrency.max(1)
    }

    fn normalized(mut self) -> Self {
        self.concurrency = self.effective_concurrency();
        self
    }
}

/// Builder for `MaterializeConfig`
pub struct MaterializeConfigBuilder {
    config: MaterializeConfig,
}

impl MaterializeConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: MaterializeConfig::default(),
        }
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.config.overwrite = overwrite;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = concurrency;
        self
    }

    pub fn build(self) -> MaterializeConfig {
        self.config.normalized()
    }
}

impl Default for MaterializeConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Default parallelism: twice the cores, clamped to a sane window.
fn default_concurrency() -> usize {
    let cores = num_cpus::get();
    (cores * 2).clamp(MIN_DEFAULT_CONCURRENCY, MAX_DEFAULT_CONCURRENCY)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Connection settings for the built-in backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Config {
    /// Explicit region; falls back to the AWS provider chain, then `us-east-1`.
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible services.
    pub endpoint_url: Option<String>,
    /// Path-style addressing (`endpoint/bucket`), needed by most S3 clones.
    pub force_path_style: bool,
    /// Per-operation timeout handed to the SDK.
    pub operation_timeout: Option<Duration>,
    /// Directory that `file://` buckets live under.
    pub file_root: PathBuf,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            region: None,
            endpoint_url: None,
            force_path_style: false,
            operation_timeout: None,
            file_root: PathBuf::from("."),
        }
    }
}

impl S3Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let non_empty = |name: &str| env::var(name).ok().filter(|v| !v.trim().is_empty());

        let mut config = Self::default();
        config.region = non_empty(ENV_AWS_REGION);
        config.endpoint_url = non_empty(ENV_AWS_ENDPOINT_URL);
        // Custom endpoints are almost always path-style services.
        config.force_path_style = non_empty(ENV_FORCE_PATH_STYLE)
            .and_then(|v| parse_flag(&v))
            .unwrap_or(config.endpoint_url.is_some());
        if let Some(root) = non_empty(ENV_FILE_ROOT) {
            config.file_root = PathBuf::from(root);
        }
        config
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint_url = Some(endpoint.into());
        self
    }

    pub fn with_force_path_style(mut self, force: bool) -> Self {
        self.force_path_style = force;
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    pub fn with_file_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.file_root = root.into();
        self
    }
}
