use std::io::{self, Write};

use anyhow::Result;
use clap::Args as ClapArgs;

use oxdrive_core::{DiskStore, Drive};

use super::normalize_path;

#[derive(ClapArgs)]
pub struct Args {
    /// File path within the drive
    pub file: String,
}

pub fn execute(drive: &Drive<DiskStore>, args: &Args) -> Result<()> {
    let content = drive.read_file(normalize_path(&args.file))?;
    io::stdout().write_all(&content)?;
    Ok(())
}
