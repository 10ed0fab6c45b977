// tests/test_materialize.rs
//
// Integration tests for the prefix-to-tree materializer, run against the
// in-memory backend so every scenario is deterministic and offline.

use anyhow::Result;
use objtree::{
    materialize, InMemoryObjectStore, LayoutKind, MaterializeConfig, Materializer, ObjectStore,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const DBT_PROJECT: &str = "name: 'test'\nversion: '1.0.0'\nprofile: 'default'\n";

fn project_store() -> InMemoryObjectStore {
    let store = InMemoryObjectStore::new();
    store.put("bucket", "project/dbt_project.yml", DBT_PROJECT);
    store.put("bucket", "project/models/a_model.sql", "SELECT 1");
    store.put("bucket", "project/models/another_model.sql", "SELECT 2");
    store.put("bucket", "project/data/a_seed.csv", "col1,col2\n1,2");
    store
}

/// Relative path -> content for every file under `root`.
fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<PathBuf, Vec<u8>>) {
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(root, &path, out);
            } else {
                let rel = path.strip_prefix(root).unwrap().to_path_buf();
                out.insert(rel, std::fs::read(&path).unwrap());
            }
        }
    }
    let mut out = BTreeMap::new();
    walk(root, root, &mut out);
    out
}

fn top_level(root: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(root)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_project_scenario_with_and_without_trailing_slash() -> Result<()> {
    for uri in ["s3://bucket/project/", "s3://bucket/project"] {
        let store: Arc<dyn ObjectStore> = Arc::new(project_store());
        let tmp = TempDir::new()?;

        let root = materialize(store, uri, tmp.path(), &MaterializeConfig::default()).await?;
        assert_eq!(root, tmp.path());
        assert!(root.exists());

        assert_eq!(top_level(&root), vec!["data", "dbt_project.yml", "models"]);
        assert!(root.join("models").is_dir());
        assert!(root.join("data").is_dir());

        assert_eq!(std::fs::read_to_string(root.join("dbt_project.yml"))?, DBT_PROJECT);
        assert_eq!(std::fs::read_to_string(root.join("models/a_model.sql"))?, "SELECT 1");
        assert_eq!(std::fs::read_to_string(root.join("models/another_model.sql"))?, "SELECT 2");
        assert_eq!(std::fs::read_to_string(root.join("data/a_seed.csv"))?, "col1,col2\n1,2");
    }
    Ok(())
}

#[tokio::test]
async fn test_trailing_slash_forms_are_byte_identical() -> Result<()> {
    let store: Arc<dyn ObjectStore> = Arc::new(project_store());
    let a = TempDir::new()?;
    let b = TempDir::new()?;

    let config = MaterializeConfig::default();
    materialize(store.clone(), "s3://bucket/project", a.path(), &config).await?;
    materialize(store, "s3://bucket/project/", b.path(), &config).await?;

    assert_eq!(snapshot(a.path()), snapshot(b.path()));
    Ok(())
}

#[tokio::test]
async fn test_relative_path_fidelity_for_deep_keys() -> Result<()> {
    let store = InMemoryObjectStore::new();
    store.put("bucket", "root/a/b/c.ext", vec![0u8, 1, 2, 255]);
    store.put("bucket", "root/a/d.ext", "d");
    let tmp = TempDir::new()?;

    let m = Materializer::new(Arc::new(store), MaterializeConfig::default());
    let tree = m.materialize_uri("s3://bucket/root", tmp.path()).await?;

    assert_eq!(tree.kind, LayoutKind::Tree);
    assert_eq!(std::fs::read(tmp.path().join("a/b/c.ext"))?, vec![0u8, 1, 2, 255]);
    assert_eq!(
        tree.files,
        vec![tmp.path().join("a/b/c.ext"), tmp.path().join("a/d.ext")]
    );
    Ok(())
}

#[tokio::test]
async fn test_single_object_case() -> Result<()> {
    let store = InMemoryObjectStore::new();
    store.put("bucket", "profiles/v0.0.1/profiles.yml", "default:\n  target: dev\n");
    let tmp = TempDir::new()?;

    let m = Materializer::new(Arc::new(store), MaterializeConfig::default());
    let tree = m
        .materialize_uri("s3://bucket/profiles/v0.0.1/profiles.yml", tmp.path())
        .await?;

    assert_eq!(tree.kind, LayoutKind::SingleFile);
    assert_eq!(tree.root, tmp.path());
    assert_eq!(top_level(tmp.path()), vec!["profiles.yml"]);
    assert_eq!(
        std::fs::read_to_string(tmp.path().join("profiles.yml"))?,
        "default:\n  target: dev\n"
    );
    Ok(())
}

#[tokio::test]
async fn test_sub_directory_prefix_with_and_without_slash() -> Result<()> {
    for uri in ["s3://bucket/profiles/v0.0.1", "s3://bucket/profiles/v0.0.1/"] {
        let store = InMemoryObjectStore::new();
        store.put("bucket", "profiles/v0.0.1/profiles.yml", "p");
        let tmp = TempDir::new()?;

        let m = Materializer::new(Arc::new(store), MaterializeConfig::default());
        let path = m.fetch_file(uri, "profiles.yml", tmp.path()).await?;
        assert!(path.exists());
        assert_eq!(std::fs::read_to_string(&path)?, "p");

        let tree = m.materialize_uri(uri, tmp.path()).await?;
        assert_eq!(tree.files, vec![tmp.path().join("profiles.yml")]);
    }
    Ok(())
}

#[tokio::test]
async fn test_prefix_isolation() -> Result<()> {
    let store = InMemoryObjectStore::new();
    store.put("bucket", "project/v1/model.sql", "v1");
    store.put("bucket", "project/v10/model.sql", "v10");
    store.put("bucket", "project/v1.txt", "sibling");
    let tmp = TempDir::new()?;

    let m = Materializer::new(Arc::new(store), MaterializeConfig::default());
    let tree = m.materialize_uri("s3://bucket/project/v1", tmp.path()).await?;

    assert_eq!(tree.files, vec![tmp.path().join("model.sql")]);
    assert_eq!(std::fs::read_to_string(tmp.path().join("model.sql"))?, "v1");
    assert_eq!(top_level(tmp.path()), vec!["model.sql"]);
    Ok(())
}

#[tokio::test]
async fn test_idempotent_rerun() -> Result<()> {
    let store: Arc<dyn ObjectStore> = Arc::new(project_store());
    let tmp = TempDir::new()?;
    let config = MaterializeConfig::default();

    materialize(store.clone(), "s3://bucket/project", tmp.path(), &config).await?;
    let first = snapshot(tmp.path());
    materialize(store, "s3://bucket/project", tmp.path(), &config).await?;
    let second = snapshot(tmp.path());

    assert_eq!(first, second);
    assert_eq!(second.len(), 4);
    Ok(())
}

#[tokio::test]
async fn test_overwrite_replaces_stale_content() -> Result<()> {
    let store = project_store();
    let tmp = TempDir::new()?;
    std::fs::create_dir_all(tmp.path().join("models"))?;
    std::fs::write(tmp.path().join("models/a_model.sql"), "SELECT 'a much longer stale body'")?;

    let m = Materializer::new(Arc::new(store), MaterializeConfig::default());
    let tree = m.materialize_uri("s3://bucket/project", tmp.path()).await?;

    assert_eq!(tree.stats.objects_count, 4);
    assert_eq!(std::fs::read_to_string(tmp.path().join("models/a_model.sql"))?, "SELECT 1");
    Ok(())
}

#[tokio::test]
async fn test_no_overwrite_keeps_existing_files() -> Result<()> {
    let store = project_store();
    let tmp = TempDir::new()?;
    std::fs::create_dir_all(tmp.path().join("models"))?;
    std::fs::write(tmp.path().join("models/a_model.sql"), "local edit")?;

    let config = MaterializeConfig::builder().overwrite(false).build();
    let m = Materializer::new(Arc::new(store), config);
    let tree = m.materialize_uri("s3://bucket/project", tmp.path()).await?;

    assert_eq!(tree.stats.objects_count, 3);
    assert_eq!(tree.stats.skipped_count, 1);
    assert_eq!(tree.files.len(), 4);
    assert_eq!(std::fs::read_to_string(tmp.path().join("models/a_model.sql"))?, "local edit");
    Ok(())
}

#[tokio::test]
async fn test_directory_markers_create_nothing() -> Result<()> {
    let store = InMemoryObjectStore::new();
    store.put("bucket", "project/", "");
    store.put("bucket", "project/empty/", "");
    store.put("bucket", "project/models/a.sql", "SELECT 1");
    let tmp = TempDir::new()?;

    let m = Materializer::new(Arc::new(store), MaterializeConfig::default());
    let tree = m.materialize_uri("s3://bucket/project/", tmp.path()).await?;

    assert_eq!(tree.stats.objects_count, 1);
    assert_eq!(top_level(tmp.path()), vec!["models"]);
    assert!(!tmp.path().join("empty").exists());
    Ok(())
}

#[tokio::test]
async fn test_bucket_root() -> Result<()> {
    let store = InMemoryObjectStore::new();
    store.put("bucket", "a.txt", "a");
    store.put("bucket", "dir/b.txt", "b");
    let tmp = TempDir::new()?;

    let m = Materializer::new(Arc::new(store), MaterializeConfig::default());
    let tree = m.materialize_uri("s3://bucket/", tmp.path()).await?;

    assert_eq!(tree.files, vec![tmp.path().join("a.txt"), tmp.path().join("dir/b.txt")]);
    Ok(())
}

#[tokio::test]
async fn test_paginated_listing_is_fully_consumed() -> Result<()> {
    let store = InMemoryObjectStore::new().with_page_size(3);
    for i in 0..10 {
        store.put("bucket", &format!("many/file_{i:02}.txt"), format!("{i}"));
    }
    let tmp = TempDir::new()?;

    let m = Materializer::new(Arc::new(store.clone()), MaterializeConfig::default());
    let tree = m.materialize_uri("s3://bucket/many", tmp.path()).await?;

    assert_eq!(tree.stats.objects_count, 10);
    assert_eq!(store.pages_served(), 4);
    assert_eq!(store.list_calls(), 1);
    assert_eq!(std::fs::read_to_string(tmp.path().join("file_07.txt"))?, "7");
    Ok(())
}

#[tokio::test]
async fn test_concurrency_is_bounded() -> Result<()> {
    let store = InMemoryObjectStore::new().with_latency(Duration::from_millis(20));
    for i in 0..24 {
        store.put("bucket", &format!("wide/{i}.bin"), vec![i as u8; 128]);
    }
    let tmp = TempDir::new()?;

    let config = MaterializeConfig::builder().concurrency(4).build();
    let m = Materializer::new(Arc::new(store.clone()), config);
    let tree = m.materialize_uri("s3://bucket/wide", tmp.path()).await?;

    assert_eq!(tree.stats.objects_count, 24);
    assert_eq!(tree.stats.total_bytes, 24 * 128);
    assert_eq!(store.get_calls(), 24);
    assert!(store.peak_in_flight() <= 4, "peak was {}", store.peak_in_flight());
    assert!(store.peak_in_flight() >= 2, "downloads never overlapped");
    Ok(())
}

#[tokio::test]
async fn test_concurrency_of_one_is_sequential() -> Result<()> {
    let store = project_store();
    let tmp = TempDir::new()?;

    let config = MaterializeConfig::builder().concurrency(1).build();
    let m = Materializer::new(Arc::new(store.clone()), config);
    m.materialize_uri("s3://bucket/project", tmp.path()).await?;

    assert_eq!(store.peak_in_flight(), 1);
    Ok(())
}

#[tokio::test]
async fn test_lone_marker_with_doubled_slash_is_empty_tree() -> Result<()> {
    let store = InMemoryObjectStore::new();
    store.put("bucket", "a/", "");
    let tmp = TempDir::new()?;

    let m = Materializer::new(Arc::new(store), MaterializeConfig::default());
    let tree = m.materialize_uri("s3://bucket/a//", tmp.path()).await?;

    assert_eq!(tree.kind, LayoutKind::Tree);
    assert!(tree.files.is_empty());
    assert!(top_level(tmp.path()).is_empty());
    Ok(())
}

#[tokio::test]
async fn test_sibling_prefixes_are_not_paged_through() -> Result<()> {
    let store = InMemoryObjectStore::new().with_page_size(5);
    store.put("bucket", "project/v1", "exact");
    store.put("bucket", "project/v1/model.sql", "v1");
    for i in 0..50 {
        store.put("bucket", &format!("project/v10/m_{i:02}.sql"), "v10");
    }
    let tmp = TempDir::new()?;

    let m = Materializer::new(Arc::new(store.clone()), MaterializeConfig::default());
    let objects = m.list_location(&objtree::resolve("s3://bucket/project/v1")?).await?;

    let keys: Vec<&str> = objects.iter().map(|o| o.key.as_str()).collect();
    assert_eq!(keys, vec!["project/v1", "project/v1/model.sql"]);
    assert_eq!(store.pages_served(), 1);

    m.materialize_uri("s3://bucket/project/v1", tmp.path()).await?;
    assert_eq!(top_level(tmp.path()), vec!["model.sql"]);
    Ok(())
}
