//! Example: Project a directory tree using ProjFS.
//!
//! Every entry under the source directory appears under the target
//! directory on demand; file contents are hydrated on first read.
//!
//! Usage:
//!   cargo run --example project_directory -- -s C:\source -t C:\virt

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use rusty_projfs_provider::{
    projfs_available, FileSystemStore, ProjFsOptions, ProjFsVirtualizer, ProjectionProvider,
    ProviderOptions, DEFAULT_CHUNK_SIZE,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Project a directory tree into a ProjFS virtualization root")]
struct Args {
    /// Directory whose contents are projected.
    #[arg(short, long)]
    source_directory: PathBuf,

    /// Virtualization root; created if missing.
    #[arg(short, long)]
    target_directory: PathBuf,

    /// Hydration chunk size in bytes.
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: u32,

    /// Project links as plain entries without targets.
    #[arg(long)]
    no_symlinks: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    if !projfs_available() {
        eprintln!("ProjFS is only available on Windows");
        std::process::exit(1);
    }

    let store = Arc::new(FileSystemStore::new(&args.source_directory)?);
    let provider_options = ProviderOptions::new(args.target_directory.clone())
        .with_chunk_size(args.chunk_size)
        .with_symlink_support(!args.no_symlinks);
    let provider = Arc::new(ProjectionProvider::new(store, provider_options));

    println!(
        "Projecting {:?} into {:?}...",
        args.source_directory, args.target_directory
    );
    let vfs = ProjFsVirtualizer::new(provider.clone(), ProjFsOptions::new(args.target_directory.clone()))?;
    vfs.start()?;

    println!("\n✓ Virtualization root ready at {:?}", args.target_directory);
    println!("Press Enter to stop...\n");

    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;

    vfs.stop()?;
    println!("{}", provider.stats_collector().collect().display_grid());
    println!("✓ Stopped");

    Ok(())
}
