//! Errors surfaced by the drive facade and the listing handlers.

use std::fmt;

use thiserror::Error;

use super::path::{DirectoryId, DrivePath};
use crate::crypto::EncryptionError;
use crate::fs::ListingError;
use crate::storage::StorageError;

/// Context for drive operations, providing debugging information.
#[derive(Debug, Clone, Default)]
pub struct DriveOpContext {
    /// Drive-relative path being operated on
    pub path: Option<String>,
    /// Entry name within its parent
    pub name: Option<String>,
    /// Listing the operation touched
    pub directory_id: Option<DirectoryId>,
}

impl DriveOpContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path(mut self, path: &DrivePath) -> Self {
        self.path = Some(path.to_string());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_directory_id(mut self, id: DirectoryId) -> Self {
        self.directory_id = Some(id);
        self
    }

    #[inline]
    pub fn into_box(self) -> Box<Self> {
        Box::new(self)
    }
}

impl fmt::Display for DriveOpContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();

        if let Some(ref path) = self.path {
            parts.push(format!("path '{path}'"));
        }
        if let Some(ref name) = self.name {
            parts.push(format!("entry '{name}'"));
        }
        if let Some(ref id) = self.directory_id {
            parts.push(format!("in directory {}...", id.short()));
        }

        if parts.is_empty() {
            write!(f, "(no context)")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

#[derive(Error, Debug)]
pub enum DriveError {
    #[error("Empty path provided")]
    EmptyPath,

    #[error("Invalid parameter for {context}: {reason}")]
    InvalidParameter {
        reason: String,
        context: Box<DriveOpContext>,
    },

    #[error("Path not found: {context}")]
    PathNotFound { context: Box<DriveOpContext> },

    #[error("Expected directory but found file: {context}")]
    NotADirectory { context: Box<DriveOpContext> },

    #[error("Expected file but found directory: {context}")]
    IsADirectory { context: Box<DriveOpContext> },

    #[error("Entry already exists: {context}")]
    AlreadyExists { context: Box<DriveOpContext> },

    #[error("Directory not empty: {context}")]
    NotEmpty { context: Box<DriveOpContext> },

    #[error("Permission denied for {context}: {reason}")]
    PermissionDenied {
        reason: String,
        context: Box<DriveOpContext>,
    },

    /// A returning session named a root that is not in the store.
    #[error("Drive root not found: {context}")]
    RootNotFound {
        #[source]
        source: Option<StorageError>,
        context: Box<DriveOpContext>,
    },

    #[error("No service registered under alias '{alias}'")]
    ServiceNotFound { alias: String },

    #[error("Operation not supported: {operation} ({context})")]
    Unsupported {
        operation: &'static str,
        context: Box<DriveOpContext>,
    },

    #[error("Directory listing error: {0}")]
    Listing(#[from] ListingError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Content encryption error: {0}")]
    Encryption(#[from] EncryptionError),

    /// Stored state contradicts itself, e.g. a directory entry without an id.
    #[error("Corrupt drive structure for {context}: {reason}")]
    Corrupt {
        reason: String,
        context: Box<DriveOpContext>,
    },
}

impl DriveError {
    pub(crate) fn not_found(path: &DrivePath) -> Self {
        DriveError::PathNotFound {
            context: DriveOpContext::new().with_path(path).into_box(),
        }
    }

    pub(crate) fn not_a_directory(path: &DrivePath) -> Self {
        DriveError::NotADirectory {
            context: DriveOpContext::new().with_path(path).into_box(),
        }
    }

    pub(crate) fn is_a_directory(path: &DrivePath) -> Self {
        DriveError::IsADirectory {
            context: DriveOpContext::new().with_path(path).into_box(),
        }
    }

    pub(crate) fn already_exists(path: &DrivePath) -> Self {
        DriveError::AlreadyExists {
            context: DriveOpContext::new().with_path(path).into_box(),
        }
    }

    pub(crate) fn not_empty(path: &DrivePath) -> Self {
        DriveError::NotEmpty {
            context: DriveOpContext::new().with_path(path).into_box(),
        }
    }

    pub(crate) fn invalid(path: &DrivePath, reason: impl Into<String>) -> Self {
        DriveError::InvalidParameter {
            reason: reason.into(),
            context: DriveOpContext::new().with_path(path).into_box(),
        }
    }

    pub(crate) fn denied(path: &DrivePath, reason: impl Into<String>) -> Self {
        DriveError::PermissionDenied {
            reason: reason.into(),
            context: DriveOpContext::new().with_path(path).into_box(),
        }
    }

    pub(crate) fn unsupported(operation: &'static str, path: &DrivePath) -> Self {
        DriveError::Unsupported {
            operation,
            context: DriveOpContext::new().with_path(path).into_box(),
        }
    }

    pub(crate) fn corrupt(path: &DrivePath, reason: impl Into<String>) -> Self {
        DriveError::Corrupt {
            reason: reason.into(),
            context: DriveOpContext::new().with_path(path).into_box(),
        }
    }

    /// True for every flavour of "nothing there", including nested ones.
    pub fn is_not_found(&self) -> bool {
        match self {
            DriveError::PathNotFound { .. } => true,
            DriveError::Listing(ListingError::NotFound { .. }) => true,
            DriveError::Storage(e) => e.is_not_found(),
            _ => false,
        }
    }
}
