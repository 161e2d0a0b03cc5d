//! Filesystem metadata model: entries and the listings that hold them.

pub mod listing;
pub mod meta_data;

pub use listing::{DirectoryData, DirectoryListing, LISTING_FORMAT_VERSION, ListingError};
pub use meta_data::{DIRECTORY_SIZE, FileType, MetaData, Permissions};

/// Reserved name suffix for hidden files.
///
/// Entries ending in it are invisible to ordinary lookups and only reachable
/// through the hidden-file operations.
pub const HIDDEN_FILE_EXTENSION: &str = ".ms_hidden";
