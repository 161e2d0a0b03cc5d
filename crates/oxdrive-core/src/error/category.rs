//! Error category mapping for drive errors.
//!
//! OS integration layers need POSIX errno values; the CLI needs exit codes.
//! [`DriveErrorCategory`] is the intermediate classification both derive from.

use std::io;

use crate::crypto::EncryptionError;
use crate::drive::error::DriveError;
use crate::fs::ListingError;
use crate::storage::StorageError;

/// Semantic category for drive errors.
///
/// # Example
///
/// ```
/// use oxdrive_core::{DriveError, DriveErrorCategory};
///
/// let err = DriveError::EmptyPath;
/// let category = DriveErrorCategory::from(&err);
///
/// assert_eq!(category, DriveErrorCategory::InvalidArgument);
/// assert_eq!(category.to_errno(), libc::EINVAL);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveErrorCategory {
    /// Resource not found (ENOENT)
    NotFound,
    /// Resource already exists (EEXIST)
    AlreadyExists,
    /// Directory not empty (ENOTEMPTY)
    NotEmpty,
    /// Expected file but got directory (EISDIR)
    IsDirectory,
    /// Expected directory but got file (ENOTDIR)
    NotDirectory,
    /// Invalid path or argument (EINVAL)
    InvalidArgument,
    /// Storage, encryption or corruption failure (EIO)
    IoError,
    /// Refused by layout policy (EACCES)
    PermissionDenied,
    /// Operation not supported (ENOTSUP)
    NotSupported,
}

impl DriveErrorCategory {
    /// Converts this error category to a POSIX errno value.
    #[inline]
    pub fn to_errno(self) -> i32 {
        match self {
            Self::NotFound => libc::ENOENT,
            Self::AlreadyExists => libc::EEXIST,
            Self::NotEmpty => libc::ENOTEMPTY,
            Self::IsDirectory => libc::EISDIR,
            Self::NotDirectory => libc::ENOTDIR,
            Self::InvalidArgument => libc::EINVAL,
            Self::IoError => libc::EIO,
            Self::PermissionDenied => libc::EACCES,
            Self::NotSupported => libc::ENOTSUP,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::NotFound => "NotFound",
            Self::AlreadyExists => "AlreadyExists",
            Self::NotEmpty => "NotEmpty",
            Self::IsDirectory => "IsDirectory",
            Self::NotDirectory => "NotDirectory",
            Self::InvalidArgument => "InvalidArgument",
            Self::IoError => "IoError",
            Self::PermissionDenied => "PermissionDenied",
            Self::NotSupported => "NotSupported",
        }
    }
}

impl From<&DriveError> for DriveErrorCategory {
    fn from(e: &DriveError) -> Self {
        match e {
            DriveError::PathNotFound { .. } => Self::NotFound,
            DriveError::ServiceNotFound { .. } => Self::NotFound,
            DriveError::RootNotFound { .. } => Self::NotFound,
            DriveError::NotADirectory { .. } => Self::NotDirectory,
            DriveError::IsADirectory { .. } => Self::IsDirectory,
            DriveError::AlreadyExists { .. } => Self::AlreadyExists,
            DriveError::NotEmpty { .. } => Self::NotEmpty,
            DriveError::EmptyPath => Self::InvalidArgument,
            DriveError::InvalidParameter { .. } => Self::InvalidArgument,
            DriveError::PermissionDenied { .. } => Self::PermissionDenied,
            DriveError::Unsupported { .. } => Self::NotSupported,
            DriveError::Listing(e) => Self::from(e),
            DriveError::Storage(e) => Self::from(e),
            DriveError::Encryption(e) => Self::from(e),
            DriveError::Corrupt { .. } => Self::IoError,
        }
    }
}

impl From<DriveError> for DriveErrorCategory {
    fn from(e: DriveError) -> Self {
        Self::from(&e)
    }
}

impl From<&ListingError> for DriveErrorCategory {
    fn from(e: &ListingError) -> Self {
        match e {
            ListingError::AlreadyExists { .. } => Self::AlreadyExists,
            ListingError::RenameTargetExists { .. } => Self::AlreadyExists,
            ListingError::NotFound { .. } => Self::NotFound,
            // A listing that does not parse is corrupt storage, not bad input
            ListingError::Serialization(_)
            | ListingError::UnsupportedVersion { .. }
            | ListingError::IdentityMismatch { .. }
            | ListingError::InconsistentEntry { .. } => Self::IoError,
        }
    }
}

impl From<&StorageError> for DriveErrorCategory {
    fn from(e: &StorageError) -> Self {
        match e {
            // A blob vanishing under a live listing is an I/O failure, not ENOENT
            StorageError::NotFound { .. } => Self::IoError,
            StorageError::Io { source, .. } => io_error_category(source),
            StorageError::Unavailable { .. } => Self::IoError,
        }
    }
}

impl From<&EncryptionError> for DriveErrorCategory {
    fn from(e: &EncryptionError) -> Self {
        match e {
            EncryptionError::OffsetOverflow { .. } => Self::InvalidArgument,
            EncryptionError::Storage(e) => Self::from(e),
            _ => Self::IoError,
        }
    }
}

impl From<&io::Error> for DriveErrorCategory {
    fn from(e: &io::Error) -> Self {
        io_error_category(e)
    }
}

/// Categorizes an I/O error based on its kind.
fn io_error_category(e: &io::Error) -> DriveErrorCategory {
    match e.kind() {
        io::ErrorKind::NotFound => DriveErrorCategory::NotFound,
        io::ErrorKind::PermissionDenied => DriveErrorCategory::PermissionDenied,
        io::ErrorKind::AlreadyExists => DriveErrorCategory::AlreadyExists,
        io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => {
            DriveErrorCategory::InvalidArgument
        }
        io::ErrorKind::Unsupported => DriveErrorCategory::NotSupported,
        _ => DriveErrorCategory::IoError,
    }
}

/// Converts an I/O error to a POSIX errno value, falling back to `EIO`.
#[inline]
pub fn io_error_to_errno(e: &io::Error) -> i32 {
    e.raw_os_error().unwrap_or(libc::EIO)
}
