#![deny(unsafe_code)]

mod commands;
mod config;
mod exit_code;
mod output;
mod session;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use oxdrive_core::{DriveError, DriveErrorCategory};

use crate::commands::{cat, hidden, init, ls, mkdir, mv, note, rm, service, stat, touch, write};
use crate::config::Config;
use crate::session::OpenDrive;

/// Command-line interface for oxdrive stores
#[derive(Parser)]
#[command(name = "oxdrive")]
#[command(author, version)]
#[command(propagate_version = true)]
#[command(after_help = "EXAMPLES:
    # Create a drive
    oxdrive init ~/drive

    # Copy a file in and list the root
    oxdrive write ~/drive /notes.txt < notes.txt
    oxdrive ls ~/drive -l /

    # Use a drive alias (from ~/.config/oxdrive/config.toml)
    oxdrive ls @work /
")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    // ============ Drive operations (require a drive path) ============
    /// List directory contents
    Ls(DriveCommand<ls::Args>),

    /// Show an entry's metadata
    Stat(DriveCommand<stat::Args>),

    /// Read and output file contents
    Cat(DriveCommand<cat::Args>),

    /// Create a directory
    Mkdir(DriveCommand<mkdir::Args>),

    /// Create an empty file
    Touch(DriveCommand<touch::Args>),

    /// Write stdin to a file
    Write(DriveCommand<write::Args>),

    /// Remove a file, symlink or empty directory
    Rm(DriveCommand<rm::Args>),

    /// Move or rename an entry
    Mv(DriveCommand<mv::Args>),

    /// Read or append entry notes
    Note(DriveCommand<note::Args>),

    /// Manage hidden files
    Hidden(DriveCommand<hidden::Args>),

    /// Attach, detach or list services
    Service(DriveCommand<service::Args>),

    // ============ Standalone commands ============
    /// Create a new drive
    Init(init::Args),
}

/// Wrapper for commands that operate on a drive
#[derive(Parser, Clone)]
pub struct DriveCommand<T: clap::Args> {
    /// Drive directory (or @alias from config)
    #[arg(value_name = "DRIVE")]
    pub drive: String,

    #[command(flatten)]
    pub args: T,
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::from(exit_code::SUCCESS),
        Err(e) => {
            let code = categorize_error(&e);

            let args: Vec<String> = std::env::args().collect();
            let is_quiet = args.iter().any(|a| a == "-q" || a == "--quiet");

            if !is_quiet {
                eprintln!("Error: {e:#}");
            }

            ExitCode::from(code)
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;

    if !cli.quiet {
        let verbose = match cli.verbose {
            0 => config.defaults.verbosity.unwrap_or(0),
            n => n,
        };
        setup_tracing(verbose);
    }

    match cli.command {
        Commands::Init(args) => init::execute(&args, config.defaults.layout.as_deref()),

        Commands::Ls(cmd) => execute_drive_command(&cmd, ls::execute),
        Commands::Stat(cmd) => execute_drive_command(&cmd, stat::execute),
        Commands::Cat(cmd) => execute_drive_command(&cmd, cat::execute),
        Commands::Mkdir(cmd) => execute_drive_command(&cmd, mkdir::execute),
        Commands::Touch(cmd) => execute_drive_command(&cmd, touch::execute),
        Commands::Write(cmd) => execute_drive_command(&cmd, write::execute),
        Commands::Rm(cmd) => execute_drive_command(&cmd, rm::execute),
        Commands::Mv(cmd) => execute_drive_command(&cmd, mv::execute),
        Commands::Note(cmd) => execute_drive_command(&cmd, note::execute),
        Commands::Hidden(cmd) => execute_drive_command(&cmd, hidden::execute),
        Commands::Service(cmd) => {
            let mut opened = open_drive(&cmd.drive)?;
            service::execute(&mut opened, &cmd.args)
        }
    }
}

/// Execute a command against an opened drive
fn execute_drive_command<T, F>(cmd: &DriveCommand<T>, f: F) -> Result<()>
where
    T: clap::Args,
    F: FnOnce(&oxdrive_core::Drive<oxdrive_core::DiskStore>, &T) -> Result<()>,
{
    let opened = open_drive(&cmd.drive)?;
    f(&opened.drive, &cmd.args)
}

/// Resolve the drive directory, handling @alias syntax, and open it
fn open_drive(path_or_alias: &str) -> Result<OpenDrive> {
    let resolved: PathBuf = config::resolve_drive_alias(path_or_alias)?;

    if !resolved.is_dir() {
        anyhow::bail!("Drive path is not a directory: {}", resolved.display());
    }

    session::open(&resolved)
}

/// Set up tracing/logging based on verbosity level
fn setup_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(io::stderr)
        .init();
}

/// Categorize an error into an exit code using typed error downcasting
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if let Some(drive_err) = cause.downcast_ref::<DriveError>() {
            if matches!(drive_err, DriveError::RootNotFound { .. }) {
                return exit_code::DRIVE_INVALID;
            }
            return match DriveErrorCategory::from(drive_err) {
                DriveErrorCategory::NotFound => exit_code::NOT_FOUND,
                DriveErrorCategory::AlreadyExists
                | DriveErrorCategory::NotEmpty
                | DriveErrorCategory::IsDirectory
                | DriveErrorCategory::NotDirectory => exit_code::CONFLICT,
                DriveErrorCategory::PermissionDenied => exit_code::PERMISSION_DENIED,
                DriveErrorCategory::InvalidArgument | DriveErrorCategory::NotSupported => {
                    exit_code::USAGE_ERROR
                }
                DriveErrorCategory::IoError => exit_code::GENERAL_ERROR,
            };
        }

        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            match io_err.kind() {
                io::ErrorKind::PermissionDenied => return exit_code::PERMISSION_DENIED,
                io::ErrorKind::NotFound => return exit_code::NOT_FOUND,
                _ => {}
            }
        }
    }

    let msg = format!("{e:#}").to_lowercase();
    if msg.contains("not an oxdrive directory") || msg.contains("drive path is not a directory") {
        exit_code::DRIVE_INVALID
    } else {
        exit_code::GENERAL_ERROR
    }
}
