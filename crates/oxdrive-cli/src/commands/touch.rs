use anyhow::Result;
use clap::Args as ClapArgs;

use oxdrive_core::drive::FileContext;
use oxdrive_core::{DiskStore, Drive};

use super::normalize_path;

#[derive(ClapArgs)]
pub struct Args {
    /// File path to create
    pub path: String,
}

/// Create an empty file; an existing entry is left alone.
pub fn execute(drive: &Drive<DiskStore>, args: &Args) -> Result<()> {
    let path = normalize_path(&args.path);
    match drive.get_meta_data(&path) {
        Ok(_) => Ok(()),
        Err(e) if e.is_not_found() => {
            let mut ctx = FileContext::new("", false);
            drive.add_file(&path, &mut ctx)?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
