// src/s3_client.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Builds an AWS S3 client from an explicit `S3Config`.
//!
//! No client is cached process-wide; each caller builds one and hands it to
//! `S3ObjectStore`.

use aws_config::meta::region::RegionProviderChain;
use aws_config::timeout::TimeoutConfig;
use aws_sdk_s3::{config::Region, Client};
use std::time::Duration;
use tracing::debug;

use crate::config::S3Config;
use crate::constants::DEFAULT_REGION;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Load the AWS shared config (credentials chain, profile, region) and apply
/// the overrides from `config`.
pub async fn build_s3_client(config: &S3Config) -> Client {
    let region = RegionProviderChain::first_try(config.region.clone().map(Region::new))
        .or_default_provider()
        .or_else(Region::new(DEFAULT_REGION));

    let mut timeouts = TimeoutConfig::builder().connect_timeout(CONNECT_TIMEOUT);
    if let Some(op_timeout) = config.operation_timeout {
        timeouts = timeouts.operation_timeout(op_timeout);
    }

    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(region)
        .timeout_config(timeouts.build());
    if let Some(endpoint) = config.endpoint_url.as_deref() {
        loader = loader.endpoint_url(endpoint);
    }
    let shared = loader.load().await;

    debug!(
        region = ?shared.region(),
        endpoint = ?config.endpoint_url,
        force_path_style = config.force_path_style,
        "built S3 client"
    );

    let s3_config = aws_sdk_s3::config::Builder::from(&shared)
        .force_path_style(config.force_path_style)
        .build();
    Client::from_conf(s3_config)
}
