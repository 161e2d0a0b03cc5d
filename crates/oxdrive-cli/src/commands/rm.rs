use anyhow::Result;
use clap::Args as ClapArgs;
use tracing::instrument;

use oxdrive_core::{DiskStore, Drive};

use super::normalize_path;

#[derive(ClapArgs)]
pub struct Args {
    /// Path to remove (files, symlinks or empty directories)
    pub path: String,

    /// Ignore nonexistent paths
    #[arg(short, long)]
    pub force: bool,
}

#[instrument(level = "info", name = "cmd::rm", skip_all, fields(path = %args.path))]
pub fn execute(drive: &Drive<DiskStore>, args: &Args) -> Result<()> {
    match drive.remove_file(normalize_path(&args.path)) {
        Ok(_) => Ok(()),
        Err(e) if e.is_not_found() && args.force => Ok(()),
        Err(e) => Err(e.into()),
    }
}
