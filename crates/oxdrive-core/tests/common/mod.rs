//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use oxdrive_core::drive::Identity;
use oxdrive_core::storage::StorageError;
use oxdrive_core::{Drive, DriveOptions, MemoryStore, Storage};

/// Route drive logs to the test output. Honors `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Fresh drive over an in-memory store, with the store handed back for inspection.
pub fn memory_drive() -> (Drive<MemoryStore>, Arc<MemoryStore>) {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let drive = Drive::new(Arc::clone(&store), DriveOptions::default()).unwrap();
    (drive, store)
}

/// Memory store whose writes and deletes can be switched off mid-test.
#[derive(Debug, Default)]
pub struct FailingStore {
    inner: MemoryStore,
    limit_writes: AtomicBool,
    write_budget: AtomicUsize,
    fail_deletes: AtomicBool,
    puts: AtomicUsize,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.write_budget.store(0, Ordering::SeqCst);
        self.limit_writes.store(fail, Ordering::SeqCst);
    }

    /// Let the next `count` writes through, then fail the rest.
    pub fn allow_writes(&self, count: usize) {
        self.write_budget.store(count, Ordering::SeqCst);
        self.limit_writes.store(true, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn blob_count(&self) -> usize {
        self.inner.len()
    }
}

impl Storage for FailingStore {
    fn get(&self, id: &Identity) -> Result<Vec<u8>, StorageError> {
        self.inner.get(id)
    }

    fn put(&self, id: &Identity, data: &[u8]) -> Result<(), StorageError> {
        if self.limit_writes.load(Ordering::SeqCst)
            && self
                .write_budget
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_err()
        {
            return Err(StorageError::Unavailable {
                reason: "writes disabled".to_string(),
            });
        }
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(id, data)
    }

    fn delete(&self, id: &Identity) -> Result<(), StorageError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable {
                reason: "deletes disabled".to_string(),
            });
        }
        self.inner.delete(id)
    }
}

/// Standard test file contents
pub mod test_files {
    pub const SMALL_TEXT: &[u8] = b"Hello, World!";

    /// Content of exactly `size` bytes with a repeating pattern.
    pub fn create_sized_content(size: usize) -> Vec<u8> {
        b"0123456789ABCDEF".iter().copied().cycle().take(size).collect()
    }
}
