use anyhow::Result;
use clap::Args as ClapArgs;
use serde::Serialize;

use oxdrive_core::{DiskStore, Drive};

use super::normalize_path;
use crate::output::{format_size, format_time};

#[derive(ClapArgs)]
pub struct Args {
    /// Path within the drive
    pub path: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct StatOutput {
    path: String,
    #[serde(rename = "type")]
    entry_type: &'static str,
    size: u64,
    allocated: u64,
    mode: String,
    modified: String,
    accessed: String,
    created: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    directory_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    notes: Vec<String>,
}

pub fn execute(drive: &Drive<DiskStore>, args: &Args) -> Result<()> {
    let path = normalize_path(&args.path);
    let meta = drive.get_meta_data(&path)?;

    let output = StatOutput {
        entry_type: meta.file_type.name(),
        size: meta.size,
        allocated: meta.allocated_size(),
        mode: format!("{:o}", meta.permissions.bits()),
        modified: format_time(meta.last_write_time),
        accessed: format_time(meta.last_access_time),
        created: format_time(meta.creation_time),
        directory_id: meta.directory_id().map(|id| id.to_hex()),
        notes: meta.notes,
        path,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("  Path: {}", output.path);
    println!("  Type: {}", output.entry_type);
    println!("  Size: {} ({})", output.size, format_size(output.size));
    println!("  Mode: {}", output.mode);
    println!("Modify: {}", output.modified);
    println!("Access: {}", output.accessed);
    println!("Create: {}", output.created);
    if let Some(id) = &output.directory_id {
        println!("    Id: {id}");
    }
    for note in &output.notes {
        println!("  Note: {note}");
    }
    Ok(())
}
