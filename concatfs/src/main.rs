use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;
use concatfs::config::DEFAULT_FS_NAME;
use concatfs::fuse::mount::mount_concatfs;
use concatfs::{ConcatConfig, ConcatFs};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Mount a directory of index descriptions as concatenated virtual files"
)]
struct Args {
    /// Directory whose regular files are index descriptions.
    #[arg(value_name = "SOURCE_DIR")]
    source_dir: PathBuf,

    /// Empty directory to mount on.
    #[arg(value_name = "MOUNTPOINT")]
    mount_point: PathBuf,

    /// Let users other than the mounting one access the filesystem.
    #[arg(long)]
    allow_other: bool,

    /// Mount through the kernel directly instead of fusermount3 (needs root).
    #[arg(long)]
    privileged: bool,

    /// Filesystem name shown in the mount table.
    #[arg(long, value_name = "NAME", default_value = DEFAULT_FS_NAME)]
    fs_name: String,

    /// Entry and attribute cache timeout in seconds.
    #[arg(long, value_name = "N", default_value_t = 1)]
    ttl_secs: u64,

    /// Log filter, overrides RUST_LOG (e.g. debug or concatfs=trace).
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_level.as_deref());

    if nix::unistd::getuid().is_root() || nix::unistd::geteuid().is_root() {
        warn!("running as root: no file access checking is performed on the source tree");
    }

    let source_dir = std::path::absolute(&args.source_dir)
        .with_context(|| format!("resolve source dir {}", args.source_dir.display()))?;
    if !source_dir.is_dir() {
        bail!("source dir {} is not a directory", source_dir.display());
    }
    if !args.mount_point.is_dir() {
        bail!("mount point {} is not a directory", args.mount_point.display());
    }

    let config = ConcatConfig::new(&source_dir)
        .ttl(Duration::from_secs(args.ttl_secs))
        .fs_name(args.fs_name)
        .allow_other(args.allow_other)
        .privileged(args.privileged);

    let mut mount_handle = mount_concatfs(ConcatFs::new(config), &args.mount_point)
        .await
        .with_context(|| format!("mount concatfs on {}", args.mount_point.display()))?;
    info!(
        source = %source_dir.display(),
        mount_point = %args.mount_point.display(),
        "concatfs mounted"
    );

    let handle = &mut mount_handle;
    tokio::select! {
        res = handle => res.context("fuse session failed")?,
        _ = signal::ctrl_c() => {
            info!("interrupted, unmounting");
            mount_handle.unmount().await.context("unmount")?;
        }
    }
    Ok(())
}
