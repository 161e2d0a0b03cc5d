//! Per-entry attributes stored in a parent directory's listing.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use super::HIDDEN_FILE_EXTENSION;
use crate::crypto::DataMap;
use crate::drive::path::{DirectoryId, Identity};

/// Nominal size reported for directories.
#[cfg(not(windows))]
pub const DIRECTORY_SIZE: u64 = 4096;
#[cfg(windows)]
pub const DIRECTORY_SIZE: u64 = 0;

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    RegularFile,
    DirectoryFile,
    SymlinkFile,
    StatusError,
}

impl FileType {
    pub fn name(self) -> &'static str {
        match self {
            FileType::RegularFile => "file",
            FileType::DirectoryFile => "directory",
            FileType::SymlinkFile => "symlink",
            FileType::StatusError => "error",
        }
    }
}

/// POSIX-style permission bits.
///
/// Unknown bits are masked off on construction; nothing here ever rejects a
/// value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub struct Permissions(u32);

impl Permissions {
    pub const OWNER_READ: Self = Self(0o400);
    pub const OWNER_WRITE: Self = Self(0o200);
    pub const OWNER_EXE: Self = Self(0o100);
    pub const GROUP_READ: Self = Self(0o040);
    pub const GROUP_WRITE: Self = Self(0o020);
    pub const GROUP_EXE: Self = Self(0o010);
    pub const OTHERS_READ: Self = Self(0o004);
    pub const OTHERS_WRITE: Self = Self(0o002);
    pub const OTHERS_EXE: Self = Self(0o001);
    pub const SET_UID: Self = Self(0o4000);
    pub const SET_GID: Self = Self(0o2000);
    pub const STICKY: Self = Self(0o1000);

    pub const NONE: Self = Self(0);
    pub const ALL: Self = Self(0o7777);

    pub const DEFAULT_FILE: Self = Self(0o666);
    pub const DEFAULT_DIRECTORY: Self = Self(0o777);

    /// Build from raw mode bits, dropping anything outside [`Permissions::ALL`].
    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits & Self::ALL.0)
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Permissions {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Permissions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Permissions {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl From<u32> for Permissions {
    fn from(bits: u32) -> Self {
        Self::from_bits(bits)
    }
}

impl From<Permissions> for u32 {
    fn from(permissions: Permissions) -> Self {
        permissions.bits()
    }
}

impl fmt::Debug for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Permissions({:#o})", self.0)
    }
}

/// One entry in a [`DirectoryListing`](super::DirectoryListing).
///
/// Files and symlinks carry a data map, directories carry the id of their own
/// listing. The two are never set together; the accessors keep it that way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaData {
    pub name: String,
    pub file_type: FileType,
    pub creation_time: SystemTime,
    pub last_write_time: SystemTime,
    pub last_access_time: SystemTime,
    pub last_status_time: SystemTime,
    pub size: u64,
    pub allocation_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data_map: Option<DataMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    directory_id: Option<DirectoryId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    link_target: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    pub permissions: Permissions,
}

impl MetaData {
    /// Unnamed entry of the given type.
    ///
    /// Directories get a fresh random id, files an empty data map.
    pub fn new(file_type: FileType) -> Self {
        Self::with_name("", file_type)
    }

    pub fn with_name(name: impl Into<String>, file_type: FileType) -> Self {
        let now = SystemTime::now();
        let (data_map, directory_id, size, permissions) = match file_type {
            FileType::DirectoryFile => (
                None,
                Some(Identity::random()),
                DIRECTORY_SIZE,
                Permissions::DEFAULT_DIRECTORY,
            ),
            FileType::RegularFile | FileType::SymlinkFile => {
                (Some(DataMap::new()), None, 0, Permissions::DEFAULT_FILE)
            }
            FileType::StatusError => (None, None, 0, Permissions::NONE),
        };
        MetaData {
            name: name.into(),
            file_type,
            creation_time: now,
            last_write_time: now,
            last_access_time: now,
            last_status_time: now,
            size,
            allocation_size: size,
            data_map,
            directory_id,
            link_target: None,
            notes: Vec::new(),
            permissions,
        }
    }

    pub fn file(name: impl Into<String>) -> Self {
        Self::with_name(name, FileType::RegularFile)
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self::with_name(name, FileType::DirectoryFile)
    }

    pub fn symlink(name: impl Into<String>, target: impl Into<String>) -> Self {
        let mut meta = Self::with_name(name, FileType::SymlinkFile);
        let target = target.into();
        meta.size = target.len() as u64;
        meta.allocation_size = meta.size;
        meta.link_target = Some(target);
        meta
    }

    #[inline]
    pub fn is_directory(&self) -> bool {
        self.file_type == FileType::DirectoryFile
    }

    #[inline]
    pub fn is_file(&self) -> bool {
        self.file_type == FileType::RegularFile
    }

    #[inline]
    pub fn is_symlink(&self) -> bool {
        self.file_type == FileType::SymlinkFile
    }

    /// True if the name carries the reserved hidden-file extension.
    pub fn is_hidden(&self) -> bool {
        is_hidden_name(&self.name)
    }

    pub fn directory_id(&self) -> Option<DirectoryId> {
        self.directory_id
    }

    /// Point a directory entry at an existing listing.
    ///
    /// Ignored for non-directories.
    pub fn set_directory_id(&mut self, id: DirectoryId) {
        if self.is_directory() {
            self.directory_id = Some(id);
        }
    }

    pub fn data_map(&self) -> Option<&DataMap> {
        self.data_map.as_ref()
    }

    /// Replace the content descriptor of a file or symlink.
    ///
    /// Ignored for directories.
    pub fn set_data_map(&mut self, data_map: DataMap) {
        if matches!(self.file_type, FileType::RegularFile | FileType::SymlinkFile) {
            self.data_map = Some(data_map);
        }
    }

    pub fn link_target(&self) -> Option<&str> {
        self.link_target.as_deref()
    }

    /// Check that exactly the payload matching `file_type` is present.
    pub fn is_consistent(&self) -> bool {
        match self.file_type {
            FileType::DirectoryFile => self.directory_id.is_some() && self.data_map.is_none(),
            FileType::RegularFile | FileType::SymlinkFile => {
                self.data_map.is_some() && self.directory_id.is_none()
            }
            FileType::StatusError => self.data_map.is_none() && self.directory_id.is_none(),
        }
    }

    /// Set size and allocation size, touching write, access and status times.
    ///
    /// Only meaningful for file entries.
    pub fn update_size(&mut self, new_size: u64) {
        self.size = new_size;
        self.allocation_size = new_size;
        let now = SystemTime::now();
        self.last_write_time = now;
        self.last_access_time = now;
        self.last_status_time = now;
    }

    pub fn update_last_access_time(&mut self) {
        self.last_access_time = SystemTime::now();
    }

    pub fn update_last_modified_time(&mut self) {
        let now = SystemTime::now();
        self.last_write_time = now;
        self.last_access_time = now;
        self.last_status_time = now;
    }

    pub fn update_last_status_time(&mut self) {
        let now = SystemTime::now();
        self.last_access_time = now;
        self.last_status_time = now;
    }

    /// Space released if this entry were dropped.
    pub fn allocated_size(&self) -> u64 {
        self.allocation_size
    }

    pub fn set_permissions(&mut self, permissions: Permissions) {
        self.permissions = Permissions::from_bits(permissions.bits());
    }

    /// The subset of `requested` that this entry grants.
    ///
    /// Directories also grant the exe bit of every category whose read bit was
    /// requested and is set, so a readable directory is always traversable.
    pub fn get_permissions(&self, requested: Permissions) -> Permissions {
        let requested = Permissions::from_bits(requested.bits());
        let mut granted = requested & self.permissions;
        if self.is_directory() {
            for (read, exe) in [
                (Permissions::OWNER_READ, Permissions::OWNER_EXE),
                (Permissions::GROUP_READ, Permissions::GROUP_EXE),
                (Permissions::OTHERS_READ, Permissions::OTHERS_EXE),
            ] {
                if granted.contains(read) {
                    granted |= exe;
                }
            }
        }
        granted
    }

    /// Exchange every field with `other`.
    pub fn swap(&mut self, other: &mut MetaData) {
        std::mem::swap(self, other);
    }
}

pub(crate) fn is_hidden_name(name: &str) -> bool {
    name.len() > HIDDEN_FILE_EXTENSION.len() && name.ends_with(HIDDEN_FILE_EXTENSION)
}
