use anyhow::Result;
use clap::Args as ClapArgs;

use oxdrive_core::drive::DrivePath;
use oxdrive_core::{DiskStore, Drive};

use super::normalize_path;

#[derive(ClapArgs)]
pub struct Args {
    /// Directory path to create
    pub path: String,

    /// Create parent directories as needed
    #[arg(short, long)]
    pub parents: bool,
}

pub fn execute(drive: &Drive<DiskStore>, args: &Args) -> Result<()> {
    let path = normalize_path(&args.path);

    if !args.parents {
        drive.create_directory(&path)?;
        return Ok(());
    }

    let mut current = DrivePath::root();
    for component in DrivePath::new(&path).components() {
        current = current.join(component);
        match drive.get_meta_data(current.as_str()) {
            Ok(meta) if meta.is_directory() => continue,
            Ok(_) => anyhow::bail!("Not a directory: {current}"),
            Err(e) if e.is_not_found() => {
                drive.create_directory(current.as_str())?;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
