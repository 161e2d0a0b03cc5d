//! List command - list directory contents in a drive.
//!
//! # Examples
//!
//! ```bash
//! # List root directory
//! oxdrive ls ~/drive
//!
//! # List with details
//! oxdrive ls ~/drive -l /docs
//!
//! # Output as JSON for scripting
//! oxdrive ls ~/drive --json / | jq '.entries[].name'
//! ```

use anyhow::Result;
use clap::Args as ClapArgs;
use serde::Serialize;
use tracing::instrument;

use oxdrive_core::{DiskStore, Drive, MetaData};

use super::normalize_path;
use crate::output::{create_table, format_entry_type, format_size, format_time};

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Path within the drive (default: root)
    #[arg(default_value = "/")]
    pub path: String,

    /// Show detailed information
    #[arg(short, long)]
    pub long: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// One entry per line (script-friendly)
    #[arg(short = '1')]
    pub one_per_line: bool,
}

#[derive(Serialize)]
struct LsOutput {
    path: String,
    entries: Vec<EntryInfo>,
}

#[derive(Serialize)]
struct EntryInfo {
    name: String,
    #[serde(rename = "type")]
    entry_type: &'static str,
    size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<String>,
}

impl From<&MetaData> for EntryInfo {
    fn from(meta: &MetaData) -> Self {
        EntryInfo {
            name: meta.name.clone(),
            entry_type: meta.file_type.name(),
            size: meta.size,
            target: meta.link_target().map(str::to_string),
        }
    }
}

#[instrument(level = "info", name = "cmd::ls", skip_all, fields(path = %args.path))]
pub fn execute(drive: &Drive<DiskStore>, args: &Args) -> Result<()> {
    let normalized = normalize_path(&args.path);
    let entries = drive.get_directory(&normalized)?;

    if args.json {
        let output = LsOutput {
            path: normalized,
            entries: entries.iter().map(EntryInfo::from).collect(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if args.long {
        print_long_format(&entries);
    } else if args.one_per_line {
        for entry in &entries {
            println!("{}", entry.name);
        }
    } else {
        let names: Vec<String> = entries
            .iter()
            .map(|e| {
                if e.is_directory() {
                    format!("{}/", e.name)
                } else {
                    e.name.clone()
                }
            })
            .collect();
        if !names.is_empty() {
            println!("{}", names.join("  "));
        }
    }

    Ok(())
}

fn print_long_format(entries: &[MetaData]) {
    let mut table = create_table();
    table.set_header(vec!["Type", "Size", "Modified", "Name"]);

    for entry in entries {
        let name = match entry.link_target() {
            Some(target) => format!("{} -> {target}", entry.name),
            None => entry.name.clone(),
        };
        let size = if entry.is_directory() {
            "-".to_string()
        } else {
            format_size(entry.size)
        };
        table.add_row(vec![
            format_entry_type(entry.file_type).to_string(),
            size,
            format_time(entry.last_write_time),
            name,
        ]);
    }

    println!("{table}");
}
