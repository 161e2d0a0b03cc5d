//! Type-safe identifiers and paths for the drive.
//!
//! This module provides two distinct types to prevent confusion between:
//! - `Identity`: opaque 64-byte tokens addressing listings and chunks in storage
//! - `DrivePath`: user-facing paths within the drive (e.g., "/Owner/notes.txt")

use rand::RngCore;
use relative_path::{RelativePath, RelativePathBuf};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of an [`Identity`] in bytes.
pub const IDENTITY_SIZE: usize = 64;

/// Opaque fixed-length token used as a directory id and as a chunk address.
///
/// Equality and ordering are byte-wise. The serialized form is lowercase hex.
///
/// # Examples
///
/// ```
/// use oxdrive_core::drive::path::Identity;
///
/// let a = Identity::random();
/// let b = Identity::random();
/// assert_ne!(a, b);
///
/// let parsed = Identity::from_hex(&a.to_hex()).unwrap();
/// assert_eq!(parsed, a);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Identity([u8; IDENTITY_SIZE]);

impl Identity {
    /// Generate a new random identity.
    pub fn random() -> Self {
        let mut bytes = [0u8; IDENTITY_SIZE];
        rand::rng().fill_bytes(&mut bytes);
        Identity(bytes)
    }

    /// Wrap raw bytes.
    #[inline]
    pub const fn from_bytes(bytes: [u8; IDENTITY_SIZE]) -> Self {
        Identity(bytes)
    }

    /// Build an identity from a slice, returning `None` unless it is exactly
    /// [`IDENTITY_SIZE`] bytes long.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; IDENTITY_SIZE]>::try_from(bytes).ok().map(Identity)
    }

    /// Parse the 128-character hex form.
    pub fn from_hex(s: &str) -> Result<Self, IdentityParseError> {
        let bytes = hex::decode(s).map_err(|e| IdentityParseError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes).ok_or(IdentityParseError::InvalidLength {
            expected: IDENTITY_SIZE,
            actual: bytes.len(),
        })
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; IDENTITY_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short prefix for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl AsRef<[u8]> for Identity {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({}..)", self.short())
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<Identity> for String {
    fn from(id: Identity) -> Self {
        id.to_hex()
    }
}

impl TryFrom<String> for Identity {
    type Error = IdentityParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Identity::from_hex(&s)
    }
}

/// Failure to parse an [`Identity`] from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityParseError {
    #[error("invalid hex in identity: {0}")]
    InvalidHex(String),
    #[error("identity must be {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Identifier of a directory listing in storage.
pub type DirectoryId = Identity;

/// User-facing path within the drive.
///
/// Drive paths use `/` as the separator regardless of the host OS. The empty
/// path is the drive root.
///
/// # Examples
///
/// ```
/// use oxdrive_core::drive::path::DrivePath;
///
/// let path = DrivePath::new("/Owner/report.txt");
/// assert_eq!(path.file_name(), Some("report.txt"));
/// assert_eq!(path.parent().unwrap().as_str(), "Owner");
///
/// // Leading slashes are stripped
/// assert_eq!(path, DrivePath::new("Owner/report.txt"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DrivePath(RelativePathBuf);

impl DrivePath {
    /// The root path (empty).
    #[inline]
    pub fn root() -> Self {
        DrivePath(RelativePathBuf::new())
    }

    /// Create a new drive path from a string.
    ///
    /// Leading and trailing slashes are stripped and `.`/`..` segments are
    /// normalized away.
    pub fn new(path: impl AsRef<str>) -> Self {
        let s = path.as_ref().trim_matches('/');
        DrivePath(RelativePath::new(s).normalize())
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.0.as_str().is_empty()
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    #[inline]
    pub fn as_relative_path(&self) -> &RelativePath {
        &self.0
    }

    pub fn join(&self, component: impl AsRef<str>) -> Self {
        DrivePath(self.0.join(component.as_ref()))
    }

    /// Get the parent path. Returns `None` for the root path.
    pub fn parent(&self) -> Option<DrivePath> {
        if self.is_root() {
            return None;
        }
        self.0.parent().map(|p| DrivePath(p.to_relative_path_buf()))
    }

    /// Final component. Returns `None` for the root path.
    pub fn file_name(&self) -> Option<&str> {
        self.0.file_name()
    }

    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.components().map(|c| c.as_str())
    }

    /// Number of components; zero for the root.
    pub fn depth(&self) -> usize {
        self.components().count()
    }

    /// Split into parent directory path and final component.
    ///
    /// Returns `None` for the root path.
    pub fn split(&self) -> Option<(DrivePath, &str)> {
        let parent = self.parent()?;
        let name = self.file_name()?;
        Some((parent, name))
    }

    /// True if `self` equals `base` or lies below it.
    pub fn starts_with(&self, base: &DrivePath) -> bool {
        let mut ours = self.components();
        base.components().all(|b| ours.next() == Some(b))
    }

    /// First component, if any.
    pub fn first(&self) -> Option<&str> {
        self.components().next()
    }

    /// Strip the first component, returning the remainder.
    pub fn strip_first(&self) -> DrivePath {
        let rest: Vec<&str> = self.components().skip(1).collect();
        DrivePath::new(rest.join("/"))
    }

    /// True if the final component carries `extension` (including the dot).
    pub fn has_extension(&self, extension: &str) -> bool {
        self.file_name()
            .is_some_and(|name| name.len() > extension.len() && name.ends_with(extension))
    }
}

impl AsRef<str> for DrivePath {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for DrivePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0)
    }
}

impl From<&str> for DrivePath {
    fn from(s: &str) -> Self {
        DrivePath::new(s)
    }
}

impl From<String> for DrivePath {
    fn from(s: String) -> Self {
        DrivePath::new(s)
    }
}
