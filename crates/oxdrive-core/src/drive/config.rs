//! Construction options for a [`Drive`](super::Drive).

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::mount::{DEFAULT_MOUNT_TIMEOUT, MountState};
use super::path::Identity;
use super::root::RootLayout;

/// Options for opening a drive.
///
/// Deserializes from a config section where every field is optional:
///
/// ```
/// use oxdrive_core::DriveOptions;
///
/// let options: DriveOptions = serde_json::from_str(r#"{"mount_timeout": 3}"#).unwrap();
/// assert_eq!(options.mount_timeout.as_secs(), 3);
/// assert!(options.root_parent_id.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveOptions {
    #[serde(default)]
    pub layout: RootLayout,

    /// Seconds to wait in `wait_until_mounted`.
    #[serde(default = "default_mount_timeout", with = "duration_secs")]
    pub mount_timeout: Duration,

    /// Generated when absent.
    #[serde(default)]
    pub unique_user_id: Option<Identity>,

    /// Present for returning users; absent creates a new root.
    #[serde(default)]
    pub root_parent_id: Option<Identity>,

    /// Shared with the mounting thread. A fresh one is made when absent.
    #[serde(skip)]
    pub mount_state: Option<Arc<MountState>>,
}

impl Default for DriveOptions {
    fn default() -> Self {
        DriveOptions {
            layout: RootLayout::default(),
            mount_timeout: DEFAULT_MOUNT_TIMEOUT,
            unique_user_id: None,
            root_parent_id: None,
            mount_state: None,
        }
    }
}

impl DriveOptions {
    /// Options for a returning user.
    pub fn returning(root_parent_id: Identity) -> Self {
        DriveOptions {
            root_parent_id: Some(root_parent_id),
            ..Self::default()
        }
    }

    pub fn with_layout(mut self, layout: RootLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_mount_state(mut self, state: Arc<MountState>) -> Self {
        self.mount_state = Some(state);
        self
    }

    pub fn with_mount_timeout(mut self, timeout: Duration) -> Self {
        self.mount_timeout = timeout;
        self
    }
}

fn default_mount_timeout() -> Duration {
    DEFAULT_MOUNT_TIMEOUT
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
