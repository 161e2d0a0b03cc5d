//! Write command - replace a file's content with stdin.
//!
//! # Examples
//!
//! ```bash
//! echo "hello" | oxdrive write ~/drive /notes.txt
//! ```

use anyhow::Result;
use clap::Args as ClapArgs;
use tracing::instrument;

use oxdrive_core::{DiskStore, Drive};

use super::{normalize_path, read_stdin};

#[derive(ClapArgs)]
pub struct Args {
    /// File path within the drive (created if missing)
    pub path: String,
}

#[instrument(level = "info", name = "cmd::write", skip_all, fields(path = %args.path))]
pub fn execute(drive: &Drive<DiskStore>, args: &Args) -> Result<()> {
    let content = read_stdin()?;
    let meta = drive.write_file(normalize_path(&args.path), &content)?;
    tracing::info!(size = meta.size, "File written");
    Ok(())
}
