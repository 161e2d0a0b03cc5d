//! Directory and metadata engine for a user-space virtual drive.
//!
//! The drive's namespace is a tree of [`DirectoryListing`](fs::DirectoryListing)
//! blobs kept in a content-addressed [`Storage`](storage::Storage) backend. File
//! content is self-encrypted into chunks described by a [`DataMap`](crypto::DataMap).
//!
//! The public surface is [`Drive`](drive::Drive), which the OS integration layer
//! (or the `oxdrive` CLI) calls with drive-relative paths.

pub mod crypto;
pub mod drive;
pub mod error;
pub mod fs;
pub mod storage;

// Re-export commonly used types at crate root
pub use drive::{
    DirectoryListingHandler, Drive, DriveOptions, DrivePath, FileContext, Identity, MountState,
    RootHandler, RootLayout,
};
pub use error::{DriveError, DriveErrorCategory};
pub use fs::{DirectoryListing, FileType, MetaData, Permissions};
pub use storage::{DiskStore, MemoryStore, Storage};
