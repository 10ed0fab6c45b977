//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! CLI supporting `fetch`, `fetch-file`, and `ls`.
//!
//! Examples:
//! ```bash
//! objtree-cli fetch      s3://bucket/project/ ./project -j 32
//! objtree-cli fetch      s3://bucket/project  ./project --timeout 2m
//! objtree-cli fetch-file s3://bucket/profiles/ profiles.yml ./profiles
//! objtree-cli ls         s3://bucket/project -p '.*\.sql$'
//! objtree-cli ls         file://bucket/project --file-root /srv/buckets
//! ```

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use regex::Regex;
use std::future::Future;
use std::io::{self, ErrorKind, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use objtree::{
    resolve, store_for_uri, MaterializeConfig, Materializer, S3Config,
};

/// Macro to safely print with broken pipe handling
macro_rules! safe_println {
    ($($arg:tt)*) => {
        match writeln!(io::stdout(), $($arg)*) {
            Ok(_) => {},
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                // Gracefully exit on broken pipe (e.g., when piped to head/tail)
                std::process::exit(0);
            }
            Err(e) => return Err(e.into())
        }
    };
}

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Increase log verbosity: -v = Info, -vv = Debug
    #[arg(short = 'v', long, action = ArgAction::Count)]
    verbose: u8,

    /// Custom S3 endpoint (MinIO, Ceph, ...). Overrides AWS_ENDPOINT_URL.
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Directory that file:// buckets live under. Overrides OBJTREE_FILE_ROOT.
    #[arg(long = "file-root", global = true)]
    file_root: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download everything under a prefix into a local directory, keeping relative paths.
    Fetch {
        /// Source URI (e.g. s3://bucket/project/ or s3://bucket/project)
        uri: String,
        /// Local directory to write into
        dest: PathBuf,
        /// Maximum parallel downloads
        #[arg(short = 'j', long = "jobs")]
        jobs: Option<usize>,
        /// Keep files that already exist in the destination
        #[arg(long = "no-overwrite")]
        no_overwrite: bool,
        /// Abandon the whole operation after this long (e.g. 30s, 5m)
        #[arg(long, value_parser = humantime::parse_duration)]
        timeout: Option<Duration>,
    },
    /// Download one named file from a directory-like URI.
    FetchFile {
        /// Directory URI, or the full URI of the file
        uri: String,
        /// File name to fetch (e.g. profiles.yml)
        name: String,
        /// Local directory to write into
        dest: PathBuf,
    },
    /// List the objects a fetch of this URI would download.
    #[clap(name = "ls")]
    List {
        /// Storage URI (e.g. s3://bucket/prefix/, file://bucket/prefix)
        uri: String,
        /// Optional regex pattern to filter keys (applied client-side)
        #[clap(short, long)]
        pattern: Option<String>,
    },
}

fn s3_config(cli: &Cli) -> S3Config {
    let mut config = S3Config::from_env();
    if let Some(endpoint) = &cli.endpoint {
        config = config.with_endpoint(endpoint).with_force_path_style(true);
    }
    if let Some(root) = &cli.file_root {
        config = config.with_file_root(root);
    }
    config
}

async fn with_timeout<T>(timeout: Option<Duration>, fut: impl Future<Output = Result<T>>) -> Result<T> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .with_context(|| format!("timed out after {}; destination may be incomplete", humantime::format_duration(limit)))?,
        None => fut.await,
    }
}

async fn fetch_cmd(
    store_config: &S3Config,
    uri: &str,
    dest: PathBuf,
    jobs: Option<usize>,
    no_overwrite: bool,
    timeout: Option<Duration>,
) -> Result<()> {
    let defaults = MaterializeConfig::from_env();
    let config = MaterializeConfig::builder()
        .concurrency(jobs.unwrap_or(defaults.concurrency))
        .overwrite(defaults.overwrite && !no_overwrite)
        .build();

    let store = store_for_uri(uri, store_config).await?;
    let materializer = Materializer::new(store, config);
    let tree = with_timeout(timeout, async {
        materializer
            .materialize_uri(uri, &dest)
            .await
            .with_context(|| format!("failed to materialize {uri} into {}", dest.display()))
    })
    .await?;

    info!(
        "{} objects, {} skipped, {:.2} MB/s",
        tree.stats.objects_count,
        tree.stats.skipped_count,
        tree.stats.throughput_bps / 1_048_576.0
    );
    safe_println!("{}", tree.root.display());
    Ok(())
}

async fn fetch_file_cmd(store_config: &S3Config, uri: &str, name: &str, dest: PathBuf) -> Result<()> {
    let store = store_for_uri(uri, store_config).await?;
    let materializer = Materializer::new(store, MaterializeConfig::from_env());
    let path = materializer
        .fetch_file(uri, name, &dest)
        .await
        .with_context(|| format!("failed to fetch {name} from {uri}"))?;
    safe_println!("{}", path.display());
    Ok(())
}

async fn list_cmd(store_config: &S3Config, uri: &str, pattern: Option<&str>) -> Result<()> {
    let regex = pattern
        .map(Regex::new)
        .transpose()
        .context("invalid --pattern regex")?;

    let location = resolve(uri)?;
    let store = store_for_uri(uri, store_config).await?;
    let objects = Materializer::new(store, MaterializeConfig::default())
        .list_location(&location)
        .await?;

    let mut count = 0usize;
    let mut bytes = 0u64;
    for object in objects {
        if let Some(re) = &regex {
            if !re.is_match(&object.key) {
                continue;
            }
        }
        count += 1;
        bytes += object.size;
        safe_println!("{:>12}  {}", object.size, object.key);
    }
    safe_println!("\nTotal objects: {} ({} bytes)", count, bytes);
    Ok(())
}

/// Main CLI function
#[tokio::main]
async fn main() -> Result<()> {
    // Loads any variables from .env file that are not already set
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let store_config = s3_config(&cli);

    match cli.cmd {
        Command::Fetch { uri, dest, jobs, no_overwrite, timeout } => {
            if jobs == Some(0) {
                bail!("--jobs must be at least 1");
            }
            fetch_cmd(&store_config, &uri, dest, jobs, no_overwrite, timeout).await?
        }
        Command::FetchFile { uri, name, dest } => {
            fetch_file_cmd(&store_config, &uri, &name, dest).await?
        }
        Command::List { uri, pattern } => list_cmd(&store_config, &uri, pattern.as_deref()).await?,
    }

    Ok(())
}
