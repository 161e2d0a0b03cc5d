//! Hidden files - reserved `.ms_hidden` entries used for drive bookkeeping.
//!
//! They never show up in `ls` and ordinary commands refuse them.

use std::io::{self, Write};

use anyhow::Result;
use clap::{Args as ClapArgs, Subcommand};

use oxdrive_core::{DiskStore, Drive};

use super::{normalize_path, read_stdin};

#[derive(ClapArgs)]
pub struct Args {
    #[command(subcommand)]
    pub action: HiddenAction,
}

#[derive(Subcommand)]
pub enum HiddenAction {
    /// Write a hidden file from stdin
    Write {
        /// Path ending in .ms_hidden
        path: String,
        /// Replace an existing hidden file
        #[arg(long)]
        overwrite: bool,
    },
    /// Print a hidden file to stdout
    Read {
        /// Path ending in .ms_hidden
        path: String,
    },
    /// Delete a hidden file
    Rm {
        /// Path ending in .ms_hidden
        path: String,
    },
    /// List hidden files in a directory
    Ls {
        /// Directory path (default: root)
        #[arg(default_value = "/")]
        path: String,
    },
}

pub fn execute(drive: &Drive<DiskStore>, args: &Args) -> Result<()> {
    match &args.action {
        HiddenAction::Write { path, overwrite } => {
            let content = read_stdin()?;
            drive.write_hidden_file(normalize_path(path), &content, *overwrite)?;
        }
        HiddenAction::Read { path } => {
            let content = drive.read_hidden_file(normalize_path(path))?;
            io::stdout().write_all(&content)?;
        }
        HiddenAction::Rm { path } => drive.delete_hidden_file(normalize_path(path))?,
        HiddenAction::Ls { path } => {
            for name in drive.search_hidden_files(normalize_path(path))? {
                println!("{name}");
            }
        }
    }
    Ok(())
}
