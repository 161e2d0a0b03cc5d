//! Service command - attach other blob stores under the drive root.
//!
//! # Examples
//!
//! ```bash
//! oxdrive service ~/drive add backup /mnt/usb/backup-store
//! oxdrive service ~/drive ls
//! oxdrive service ~/drive rm backup
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args as ClapArgs, Subcommand};
use tracing::instrument;

use crate::output::create_table;
use crate::session::OpenDrive;

#[derive(ClapArgs)]
pub struct Args {
    #[command(subcommand)]
    pub action: ServiceAction,
}

#[derive(Subcommand)]
pub enum ServiceAction {
    /// Attach the store at PATH as /ALIAS (created if missing)
    Add {
        /// Name of the directory the service appears as
        alias: String,
        /// Store directory
        path: PathBuf,
    },
    /// Detach a service and delete its root listing
    Rm {
        alias: String,
    },
    /// List attached services
    Ls,
}

#[instrument(level = "info", name = "cmd::service", skip_all)]
pub fn execute(opened: &mut OpenDrive, args: &Args) -> Result<()> {
    match &args.action {
        ServiceAction::Add { alias, path } => {
            let root_id = opened.add_service(alias, path)?;
            println!("Attached /{alias} (root {})", root_id.short());
        }
        ServiceAction::Rm { alias } => opened.remove_service(alias)?,
        ServiceAction::Ls => {
            if opened.session.services.is_empty() {
                println!("No services attached");
                return Ok(());
            }
            let mut table = create_table();
            table.set_header(vec!["Alias", "Store", "Root"]);
            for (alias, entry) in &opened.session.services {
                table.add_row(vec![
                    format!("/{alias}"),
                    entry.path.display().to_string(),
                    entry.root_id.short(),
                ]);
            }
            println!("{table}");
        }
    }
    Ok(())
}
