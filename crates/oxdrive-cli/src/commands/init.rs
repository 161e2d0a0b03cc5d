use std::path::PathBuf;

use anyhow::Result;
use clap::{Args as ClapArgs, ValueEnum};
use tracing::instrument;

use oxdrive_core::RootLayout;

use crate::session;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum LayoutArg {
    /// Single-user drive with an empty root
    Local,
    /// Owner, Group and World areas at the root
    Network,
}

#[derive(ClapArgs)]
pub struct Args {
    /// Directory to create the drive in
    pub path: PathBuf,

    /// Root layout (default from config, else local)
    #[arg(long, value_enum)]
    pub layout: Option<LayoutArg>,

    /// Let users write below World/ on a network drive
    #[arg(long)]
    pub world_writeable: bool,
}

#[instrument(level = "info", name = "cmd::init", skip_all, fields(path = %args.path.display()))]
pub fn execute(args: &Args, default_layout: Option<&str>) -> Result<()> {
    let layout_arg = match (args.layout, default_layout) {
        (Some(layout), _) => layout,
        (None, Some(name)) => LayoutArg::from_str(name, true)
            .map_err(|e| anyhow::anyhow!("Invalid default layout '{name}' in config: {e}"))?,
        (None, None) => LayoutArg::Local,
    };
    let layout = match layout_arg {
        LayoutArg::Local => RootLayout::Local,
        LayoutArg::Network => RootLayout::Network {
            world_writeable: args.world_writeable,
        },
    };

    let opened = session::create(&args.path, layout)?;
    println!("Created drive at {}", args.path.display());
    println!("Root: {}", opened.drive.drive_root_id().short());
    Ok(())
}
