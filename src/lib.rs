// src/lib.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// Crate root, public re-exports.

pub mod constants;
pub mod config;
pub mod error;
pub mod uri_utils;

// Storage backends behind the ObjectStore capability
pub mod object_store;
pub mod s3_client;
pub mod s3_utils;
pub mod file_store;
pub mod mem_store;

pub mod materialize;

pub use config::{MaterializeConfig, MaterializeConfigBuilder, S3Config};
pub use error::{MaterializeError, Result};
pub use uri_utils::{infer_scheme, parse_storage_uri, resolve, ResolvedLocation, Scheme, StorageUri};

pub use object_store::{store_for_uri, BodyStream, ObjectStore, ObjectStream, RemoteObject};
pub use s3_utils::S3ObjectStore;
pub use file_store::FileSystemObjectStore;
pub use mem_store::InMemoryObjectStore;

pub use materialize::{
    materialize,
    plan_layout,
    DownloadStats,
    Layout,
    LayoutKind,
    MaterializedTree,
    Materializer,
    TreeEntry,
};
