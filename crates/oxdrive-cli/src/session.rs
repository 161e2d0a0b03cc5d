//! Per-drive session file.
//!
//! A drive directory holds the blob store under `store/` and a `drive.toml`
//! recording the ids a later invocation needs to take the returning-user path,
//! plus the services attached to the drive.
//!
//! ```toml
//! [options]
//! mount_timeout = 10
//! unique_user_id = "ab12..."
//! root_parent_id = "cd34..."
//!
//! [options.layout]
//! kind = "local"
//!
//! [services.backup]
//! path = "/mnt/usb/backup-store"
//! root_id = "ef56..."
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use oxdrive_core::drive::{DirectoryId, Identity};
use oxdrive_core::{DiskStore, Drive, DriveOptions, RootLayout};

pub const SESSION_FILE: &str = "drive.toml";
pub const STORE_DIR: &str = "store";

#[derive(Debug, Serialize, Deserialize)]
pub struct Session {
    pub options: DriveOptions,

    #[serde(default)]
    pub services: BTreeMap<String, ServiceEntry>,
}

/// A service store attached under an alias
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub path: PathBuf,
    pub root_id: DirectoryId,
}

/// An opened drive with the session it came from.
pub struct OpenDrive {
    pub drive: Drive<DiskStore>,
    pub session: Session,
    dir: PathBuf,
}

fn session_path(dir: &Path) -> PathBuf {
    dir.join(SESSION_FILE)
}

impl Session {
    fn load(dir: &Path) -> Result<Self> {
        let path = session_path(dir);
        if !path.exists() {
            bail!(
                "Not an oxdrive directory: {} (missing {SESSION_FILE}, run `oxdrive init` first)",
                dir.display()
            );
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read session file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse session file: {}", path.display()))
    }

    fn save(&self, dir: &Path) -> Result<()> {
        let path = session_path(dir);
        let content = toml::to_string_pretty(self).context("Failed to serialize session")?;
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write session file: {}", path.display()))?;
        debug!(path = %path.display(), "Saved session");
        Ok(())
    }
}

/// Create a new drive in `dir`, which must not already hold one.
pub fn create(dir: &Path, layout: RootLayout) -> Result<OpenDrive> {
    if session_path(dir).exists() {
        bail!("Drive already exists: {}", dir.display());
    }
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create drive directory: {}", dir.display()))?;

    let store = DiskStore::open(dir.join(STORE_DIR)).context("Failed to open drive store")?;
    let options = DriveOptions {
        unique_user_id: Some(Identity::random()),
        ..DriveOptions::default()
    }
    .with_layout(layout);
    let drive = Drive::new(Arc::new(store), options.clone()).context("Failed to create drive")?;

    let session = Session {
        options: DriveOptions {
            root_parent_id: Some(drive.root_parent_id()),
            ..options
        },
        services: BTreeMap::new(),
    };
    session.save(dir)?;
    info!(dir = %dir.display(), "Created drive");

    Ok(OpenDrive {
        drive,
        session,
        dir: dir.to_path_buf(),
    })
}

/// Open the drive in `dir` and re-attach its services.
pub fn open(dir: &Path) -> Result<OpenDrive> {
    let session = Session::load(dir)?;
    if session.options.root_parent_id.is_none() {
        bail!("Session file has no root_parent_id: {}", session_path(dir).display());
    }

    let store = DiskStore::open(dir.join(STORE_DIR)).context("Failed to open drive store")?;
    let drive = Drive::new(Arc::new(store), session.options.clone())
        .with_context(|| format!("Failed to open drive at {}", dir.display()))?;

    for (alias, entry) in &session.services {
        drive
            .add_service_at(alias, &entry.path, Some(entry.root_id))
            .with_context(|| format!("Failed to attach service '{alias}'"))?;
    }

    Ok(OpenDrive {
        drive,
        session,
        dir: dir.to_path_buf(),
    })
}

impl OpenDrive {
    pub fn add_service(&mut self, alias: &str, path: &Path) -> Result<DirectoryId> {
        let path = std::path::absolute(path)
            .with_context(|| format!("Invalid service path: {}", path.display()))?;
        let existing = self.session.services.get(alias).map(|entry| entry.root_id);
        let root_id = self.drive.add_service_at(alias, &path, existing)?;
        self.session
            .services
            .insert(alias.to_string(), ServiceEntry { path, root_id });
        self.session.save(&self.dir)?;
        Ok(root_id)
    }

    pub fn remove_service(&mut self, alias: &str) -> Result<()> {
        self.drive.remove_service(alias)?;
        self.session.services.remove(alias);
        self.session.save(&self.dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_roundtrip_through_toml() {
        let session = Session {
            options: DriveOptions {
                root_parent_id: Some(Identity::random()),
                ..DriveOptions::default()
            }
            .with_layout(RootLayout::Network {
                world_writeable: true,
            }),
            services: BTreeMap::from([(
                "backup".to_string(),
                ServiceEntry {
                    path: PathBuf::from("/tmp/backup"),
                    root_id: Identity::random(),
                },
            )]),
        };

        let text = toml::to_string_pretty(&session).unwrap();
        let parsed: Session = toml::from_str(&text).unwrap();
        assert_eq!(parsed.options.root_parent_id, session.options.root_parent_id);
        assert_eq!(parsed.options.layout, session.options.layout);
        assert_eq!(
            parsed.services["backup"].root_id,
            session.services["backup"].root_id
        );
    }

    #[test]
    fn test_create_then_open() {
        let dir = tempfile::TempDir::new().unwrap();
        let created = create(dir.path(), RootLayout::Local).unwrap();
        created.drive.create_directory("kept").unwrap();
        let root_id = created.drive.drive_root_id();
        drop(created);

        let opened = open(dir.path()).unwrap();
        assert_eq!(opened.drive.drive_root_id(), root_id);
        assert!(opened.drive.get_meta_data("kept").unwrap().is_directory());
        assert!(create(dir.path(), RootLayout::Local).is_err());
    }
}
