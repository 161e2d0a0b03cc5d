use anyhow::Result;
use clap::{Args as ClapArgs, Subcommand};

use oxdrive_core::{DiskStore, Drive};

use super::normalize_path;

#[derive(ClapArgs)]
pub struct Args {
    #[command(subcommand)]
    pub action: NoteAction,
}

#[derive(Subcommand)]
pub enum NoteAction {
    /// Append a note to an entry
    Add {
        /// Path within the drive ("/" for the drive root)
        path: String,
        /// Note text
        text: String,
    },
    /// Print an entry's notes, one per line
    List {
        /// Path within the drive ("/" for the drive root)
        path: String,
    },
}

pub fn execute(drive: &Drive<DiskStore>, args: &Args) -> Result<()> {
    match &args.action {
        NoteAction::Add { path, text } => drive.add_note(normalize_path(path), text.as_str())?,
        NoteAction::List { path } => {
            for note in drive.get_notes(normalize_path(path))? {
                println!("{note}");
            }
        }
    }
    Ok(())
}
