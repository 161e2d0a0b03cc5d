//! Mount handshake between the drive and the thread that mounts it.
//!
//! The OS integration layer calls [`MountState::set`] once the filesystem is
//! mounted (and again on unmount); other threads block in the `wait_*`
//! methods. Each signal wakes one waiter.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

/// Default bound for [`MountState::wait_until_mounted`].
pub const DEFAULT_MOUNT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountStage {
    Pending,
    Mounted,
    Unmounted,
}

#[derive(Debug)]
pub struct MountState {
    stage: Mutex<MountStage>,
    cond: Condvar,
}

impl Default for MountState {
    fn default() -> Self {
        Self::new()
    }
}

impl MountState {
    pub fn new() -> Self {
        MountState {
            stage: Mutex::new(MountStage::Pending),
            cond: Condvar::new(),
        }
    }

    pub fn stage(&self) -> MountStage {
        *self.stage.lock()
    }

    /// Record a mount (`true`) or unmount (`false`) and wake one waiter.
    pub fn set(&self, mounted: bool) {
        let mut stage = self.stage.lock();
        *stage = if mounted {
            MountStage::Mounted
        } else {
            MountStage::Unmounted
        };
        debug!(stage = ?*stage, "Mount state changed");
        self.cond.notify_one();
    }

    /// Block until mounted or until `timeout` passes. Returns false on timeout.
    pub fn wait_until_mounted(&self, timeout: Duration) -> bool {
        let mut stage = self.stage.lock();
        let result = self
            .cond
            .wait_while_for(&mut stage, |stage| *stage != MountStage::Mounted, timeout);
        if result.timed_out() && *stage != MountStage::Mounted {
            warn!(timeout_ms = timeout.as_millis(), "Timed out waiting for mount");
            return false;
        }
        true
    }

    /// Block until unmounted. No timeout.
    pub fn wait_until_unmounted(&self) {
        let mut stage = self.stage.lock();
        self.cond
            .wait_while(&mut stage, |stage| *stage != MountStage::Unmounted);
    }
}
