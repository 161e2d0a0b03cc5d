//! Error types for the drive crate
//!
//! Each layer owns its error enum; this module gathers them in one place
//! together with the errno classification used by mount integrations.

mod category;

pub use crate::crypto::EncryptionError;
pub use crate::drive::error::{DriveError, DriveOpContext};
pub use crate::drive::path::IdentityParseError;
pub use crate::fs::ListingError;
pub use crate::storage::StorageError;
pub use category::{DriveErrorCategory, io_error_to_errno};
