//! Exit codes for the CLI.
//!
//! These follow common Unix conventions and provide meaningful
//! status information for scripting and automation.

/// Successful execution
pub const SUCCESS: u8 = 0;

/// General/unspecified error
pub const GENERAL_ERROR: u8 = 1;

/// Command-line usage error (bad arguments or paths)
pub const USAGE_ERROR: u8 = 2;

/// Drive directory missing, or its root listings could not be found
pub const DRIVE_INVALID: u8 = 4;

/// Refused by the drive's layout policy
pub const PERMISSION_DENIED: u8 = 5;

/// File or directory not found (within the drive)
pub const NOT_FOUND: u8 = 7;

/// Target already exists or directory is not empty
pub const CONFLICT: u8 = 9;
