//! panup: upload files to 123pan cloud storage.

mod config;
mod progress;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use panup_api::Client;
use panup_transfer::validate_remote_filename;
use panup_upload::{ConflictPolicy, UploadRequest, Uploader};

use crate::config::{AppConfig, DEFAULT_CONFIG_PATH};
use crate::progress::ProgressReporter;

#[derive(Debug, Parser)]
#[command(name = "panup", version, about = "Upload files to 123pan cloud storage")]
struct Cli {
    /// Path to the JSON config holding the access token.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log at debug level (RUST_LOG takes precedence).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Upload one file.
    Upload(UploadArgs),
    /// Create a folder and print its id.
    Mkdir {
        name: String,
        /// Parent folder id (defaults to the config's parent_folder_id).
        #[arg(long)]
        parent: Option<i64>,
    },
}

#[derive(Debug, clap::Args)]
struct UploadArgs {
    /// File to upload (defaults to the config's upload_file_path).
    path: Option<PathBuf>,

    /// Destination folder id (defaults to the config's parent_folder_id).
    #[arg(long)]
    parent: Option<i64>,

    /// Remote filename (defaults to the local base name).
    #[arg(long)]
    name: Option<String>,

    /// What to do when the destination already has the filename.
    #[arg(long, value_enum)]
    on_conflict: Option<ConflictArg>,

    /// Chunks uploaded in parallel.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Seconds to wait for the server to assemble the file.
    #[arg(long)]
    max_wait: Option<u64>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ConflictArg {
    Allow,
    Rename,
    Abort,
}

impl From<ConflictArg> for ConflictPolicy {
    fn from(arg: ConflictArg) -> Self {
        match arg {
            ConflictArg::Allow => ConflictPolicy::Allow,
            ConflictArg::Rename => ConflictPolicy::Rename,
            ConflictArg::Abort => ConflictPolicy::Abort,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize structured logging.
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = AppConfig::load(&cli.config)?;
    if config.access_token.is_empty() {
        bail!("no access_token in {}", cli.config.display());
    }
    if let Some(expired_at) = config.expired_at.filter(|_| config.token_expired(Utc::now())) {
        warn!(%expired_at, "access token has expired; the server will reject requests");
    }

    let mut client = Client::new(&config.access_token)?;
    if let Some(url) = &config.base_url {
        client = client.with_base_url(url.clone());
    }

    match cli.command {
        Command::Upload(args) => upload(client, &config, args).await,
        Command::Mkdir { name, parent } => {
            validate_remote_filename(&name)?;
            let parent = parent.unwrap_or(config.parent_folder_id);
            let dir_id = client.create_directory(&name, parent).await?;
            info!(name = %name, parent, dir_id, "folder created");
            println!("{dir_id}");
            Ok(())
        }
    }
}

async fn upload(client: Client, config: &AppConfig, args: UploadArgs) -> anyhow::Result<()> {
    let path = args
        .path
        .or_else(|| config.upload_file_path.clone())
        .context("no file given and no upload_file_path in config")?;
    let parent = args.parent.unwrap_or(config.parent_folder_id);

    let mut options = config.upload_options();
    if let Some(n) = args.concurrency {
        options.concurrency = n.max(1);
    }
    if let Some(secs) = args.max_wait {
        options.poll.max_wait = Duration::from_secs(secs);
    }
    if let Some(policy) = args.on_conflict {
        options.conflict = policy.into();
    }

    let mut request = UploadRequest::new(path, parent);
    if let Some(name) = args.name {
        request = request.with_filename(name);
    }

    let mut uploader = Uploader::new(Arc::new(client), options);
    let events = uploader
        .take_events()
        .context("upload event channel unavailable")?;
    let renderer = tokio::spawn(ProgressReporter::default().run(events));

    let cancel = uploader.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling upload");
            cancel.cancel();
        }
    });

    let result = uploader.upload(request).await;
    // Closing the event channel lets the renderer finish.
    drop(uploader);
    let _ = renderer.await;

    let result = result?;
    println!("{}", result.remote_file_id);
    Ok(())
}
