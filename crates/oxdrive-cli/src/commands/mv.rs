use anyhow::Result;
use clap::Args as ClapArgs;

use oxdrive_core::{DiskStore, Drive, MetaData};

use super::normalize_path;
use crate::output::format_size;

#[derive(ClapArgs)]
pub struct Args {
    /// Source path
    pub source: String,

    /// Destination path
    pub dest: String,
}

pub fn execute(drive: &Drive<DiskStore>, args: &Args) -> Result<()> {
    let source = normalize_path(&args.source);
    let dest = normalize_path(&args.dest);
    let mut meta = MetaData::file("");
    let reclaimed = drive.rename_file(&source, &dest, &mut meta)?;
    if reclaimed > 0 {
        eprintln!("Replaced {dest}, reclaimed {}", format_size(reclaimed));
    }
    Ok(())
}
