//! Drive namespace: paths, listing handlers, the root bootstrap and the public facade.

pub mod config;
pub mod error;
pub mod file_context;
pub mod handler;
pub mod mount;
pub mod operations;
pub mod path;
pub mod root;

pub use config::DriveOptions;
pub use error::{DriveError, DriveOpContext};
pub use file_context::FileContext;
pub use handler::{DirectoryListingHandler, ElementIds, ROOT_ENTRY_NAME, RenameOutcome};
pub use mount::{DEFAULT_MOUNT_TIMEOUT, MountStage, MountState};
pub use operations::Drive;
pub use path::{DirectoryId, DrivePath, IDENTITY_SIZE, Identity, IdentityParseError};
pub use root::{RootHandler, RootLayout};
