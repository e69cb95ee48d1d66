use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use s3_dump::config::{self, DEFAULT_CONFIG_FILE};
use s3_dump::{BucketDumper, Console, Layout, Mode, S3Store, TerminalConsole};

/// Enumerate and dump files from S3 buckets.
///
/// With no arguments, every bucket the credentials can list is probed and you
/// are asked, per readable bucket, whether to download all of its files.
/// Downloads land in <download_root>/<session>/<bucket>/.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Download every readable bucket without asking. This can be a lot of data;
    /// consider --names-only followed by --dl-names.
    #[clap(long)]
    dl_all: bool,

    /// Only record key names, as "key@bucket" lines in
    /// <download_root>/<session>/s3_bucket_dump_file_names.txt.
    #[clap(long)]
    names_only: bool,

    /// Download only the keys listed in this file, one "key@bucket" per line.
    #[clap(long, value_name = "PATH")]
    dl_names: Option<PathBuf>,

    /// Session configuration file. Defaults to s3_dump.toml when present.
    #[clap(short, long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut console = TerminalConsole;

    let mode = match Mode::resolve(args.dl_all, args.names_only, args.dl_names) {
        Ok(mode) => mode,
        Err(err) => {
            console.announce(&format!("{err}. Exiting..."));
            std::process::exit(2);
        }
    };

    let config_file = match args.config {
        Some(path) => Some(path),
        None => {
            let default = Path::new(DEFAULT_CONFIG_FILE);
            default
                .try_exists()
                .with_context(|| format!("Could not check for {}", default.display()))?
                .then(|| default.to_path_buf())
        }
    };

    let settings = config::load_settings(config_file.as_deref())?;
    info!(session = ?settings.session, proxy = ?settings.proxy, "session loaded");

    let store = S3Store::connect(&settings.session, settings.proxy.as_ref())
        .await
        .context("Failed to build the S3 client")?;
    let layout = Layout::new(&settings.download_root, &settings.session.name);

    let summary = BucketDumper::new(&store, &mut console, layout, mode)
        .run()
        .await?;

    info!(
        buckets = summary.buckets_found,
        keys = summary.keys_listed,
        downloaded = summary.files_downloaded,
        failed = summary.downloads_failed,
        "dump finished"
    );
    console.announce(&format!("\n{} completed.", env!("CARGO_PKG_NAME")));

    Ok(())
}
