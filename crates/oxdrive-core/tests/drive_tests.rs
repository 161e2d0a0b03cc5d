//! End-to-end tests of the `Drive` surface over an in-memory store.

mod common;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use common::test_files::{SMALL_TEXT, create_sized_content};
use common::{FailingStore, init_tracing, memory_drive};
use oxdrive_core::drive::{FileContext, MountStage};
use oxdrive_core::{
    Drive, DriveError, DriveErrorCategory, DriveOptions, MemoryStore, MetaData, Storage,
};

fn names(entries: &[MetaData]) -> Vec<&str> {
    entries.iter().map(|m| m.name.as_str()).collect()
}

// =============================================================================
// Structure
// =============================================================================

#[test]
fn test_create_and_delete_directory() {
    let (drive, _) = memory_drive();
    drive.create_directory("a").unwrap();
    drive.create_directory("a/b").unwrap();

    assert_eq!(names(&drive.get_directory("a").unwrap()), ["b"]);
    assert!(drive.get_meta_data("a/b").unwrap().is_directory());

    assert!(!drive.can_remove("a").unwrap());
    let err = drive.remove_file("a").unwrap_err();
    assert!(matches!(err, DriveError::NotEmpty { .. }), "got {err:?}");

    drive.remove_file("a/b").unwrap();
    assert!(drive.can_remove("a").unwrap());
    drive.remove_file("a").unwrap();
    assert!(drive.get_directory("").unwrap().is_empty());
}

#[test]
fn test_add_reports_surrounding_ids() {
    let (drive, _) = memory_drive();
    let docs = drive.create_directory("docs").unwrap();

    let mut ctx = FileContext::new("ignored", false);
    drive.add_file("docs/x.txt", &mut ctx).unwrap();

    assert_eq!(ctx.meta_data.name, "x.txt");
    assert_eq!(ctx.parent_directory_id, docs.directory_id());
    assert_eq!(ctx.grandparent_directory_id, Some(drive.drive_root_id()));
    assert_eq!(ctx.path.as_ref().map(|p| p.as_str()), Some("docs/x.txt"));
}

#[test]
fn test_add_twice_is_already_exists() {
    let (drive, _) = memory_drive();
    drive.create_directory("a").unwrap();
    let err = drive.create_directory("a").unwrap_err();
    assert_eq!(DriveErrorCategory::from(&err), DriveErrorCategory::AlreadyExists);
}

#[test]
fn test_reused_directory_context_keeps_existing_listing() {
    let (drive, _) = memory_drive();
    drive.create_directory("d").unwrap();
    drive.write_file("d/inner.txt", SMALL_TEXT).unwrap();

    let mut ctx = drive.open("d").unwrap();
    let err = drive.add_file("e", &mut ctx).unwrap_err();
    assert_eq!(DriveErrorCategory::from(&err), DriveErrorCategory::AlreadyExists);

    assert_eq!(names(&drive.get_directory("d").unwrap()), ["inner.txt"]);
    assert!(drive.get_meta_data("e").unwrap_err().is_not_found());
}

#[test]
fn test_empty_path_rejected() {
    let (drive, _) = memory_drive();
    assert!(matches!(drive.remove_file("/").unwrap_err(), DriveError::EmptyPath));
    assert!(matches!(drive.create_directory("").unwrap_err(), DriveError::EmptyPath));
}

#[test]
fn test_missing_parent_is_not_found() {
    let (drive, _) = memory_drive();
    let err = drive.create_directory("missing/child").unwrap_err();
    assert!(err.is_not_found(), "got {err:?}");
    assert_eq!(DriveErrorCategory::from(&err).to_errno(), libc::ENOENT);
}

#[test]
fn test_file_as_parent_is_not_a_directory() {
    let (drive, _) = memory_drive();
    drive.write_file("f", SMALL_TEXT).unwrap();
    let err = drive.create_directory("f/child").unwrap_err();
    assert!(matches!(err, DriveError::NotADirectory { .. }), "got {err:?}");
}

#[test]
fn test_root_meta_data() {
    let (drive, _) = memory_drive();
    let root = drive.get_meta_data("").unwrap();
    assert!(root.is_directory());
    assert_eq!(root.directory_id(), Some(drive.drive_root_id()));
}

// =============================================================================
// Rename
// =============================================================================

#[test]
fn test_rename_across_directories() {
    let (drive, _) = memory_drive();
    drive.create_directory("from").unwrap();
    drive.create_directory("to").unwrap();
    drive.write_file("from/f.txt", SMALL_TEXT).unwrap();

    let mut meta = MetaData::file("");
    let reclaimed = drive.rename_file("from/f.txt", "to/g.txt", &mut meta).unwrap();

    assert_eq!(reclaimed, 0);
    assert_eq!(meta.name, "g.txt");
    assert!(drive.get_directory("from").unwrap().is_empty());
    assert_eq!(drive.read_file("to/g.txt").unwrap(), SMALL_TEXT);
}

#[test]
fn test_rename_overwrite_reclaims_and_drops_chunks() {
    let (drive, store) = memory_drive();
    let big = create_sized_content(2 * 1024 * 1024 + 17);
    drive.write_file("victim", &big).unwrap();
    drive.write_file("winner", SMALL_TEXT).unwrap();
    let blobs_with_victim = store.len();

    let mut meta = MetaData::file("");
    let reclaimed = drive.rename_file("winner", "victim", &mut meta).unwrap();

    assert!(reclaimed > 0);
    assert!(store.len() < blobs_with_victim);
    assert_eq!(drive.read_file("victim").unwrap(), SMALL_TEXT);
    assert!(drive.get_meta_data("winner").unwrap_err().is_not_found());
}

#[test]
fn test_moved_directory_keeps_contents() {
    let (drive, _) = memory_drive();
    drive.create_directory("a").unwrap();
    drive.create_directory("a/sub").unwrap();
    drive.write_file("a/sub/f", SMALL_TEXT).unwrap();
    drive.create_directory("b").unwrap();

    let before = drive.get_meta_data("a/sub").unwrap().directory_id();
    let mut meta = MetaData::file("");
    drive.rename_file("a/sub", "b/sub", &mut meta).unwrap();

    assert_eq!(meta.directory_id(), before);
    assert_eq!(drive.read_file("b/sub/f").unwrap(), SMALL_TEXT);
    // The moved listing now points at its new parent
    drive.write_file("b/sub/g", b"more").unwrap();
    assert_eq!(names(&drive.get_directory("b/sub").unwrap()), ["f", "g"]);
}

// =============================================================================
// Content
// =============================================================================

#[test]
fn test_small_file_roundtrip() {
    let (drive, _) = memory_drive();
    let meta = drive.write_file("hello.txt", SMALL_TEXT).unwrap();
    assert_eq!(meta.size, SMALL_TEXT.len() as u64);
    assert_eq!(drive.read_file("hello.txt").unwrap(), SMALL_TEXT);
    assert_eq!(drive.get_meta_data("hello.txt").unwrap().size, SMALL_TEXT.len() as u64);
}

#[test]
fn test_multi_chunk_file_and_partial_read() {
    let (drive, _) = memory_drive();
    let content = create_sized_content(3 * 1024 * 1024 + 5);
    drive.write_file("big.bin", &content).unwrap();

    let mut ctx = drive.open("big.bin").unwrap();
    let offset = 1024 * 1024 - 3;
    let middle = drive.read(&mut ctx, offset as u64, 10).unwrap();
    assert_eq!(middle, &content[offset..offset + 10]);

    let tail = drive.read(&mut ctx, content.len() as u64 - 2, 100).unwrap();
    assert_eq!(tail, &content[content.len() - 2..]);
}

#[test]
fn test_write_flush_updates_parent_listing() {
    let (drive, _) = memory_drive();
    drive.create_directory("d").unwrap();
    let mut ctx = FileContext::new("", false);
    drive.add_file("d/f", &mut ctx).unwrap();

    assert_eq!(drive.write(&mut ctx, 0, b"abc").unwrap(), 3);
    assert_eq!(drive.write(&mut ctx, 3, b"def").unwrap(), 3);
    assert!(ctx.content_changed);
    // Unflushed content is not visible to other handles
    assert_eq!(drive.get_meta_data("d/f").unwrap().size, 0);

    drive.release(ctx).unwrap();
    assert_eq!(drive.get_meta_data("d/f").unwrap().size, 6);
    assert_eq!(drive.read_file("d/f").unwrap(), b"abcdef");
}

#[test]
fn test_overwrite_with_shorter_content_truncates() {
    let (drive, _) = memory_drive();
    drive.write_file("f", b"a long first version").unwrap();
    drive.write_file("f", b"short").unwrap();
    assert_eq!(drive.read_file("f").unwrap(), b"short");
}

#[test]
fn test_truncate_grows_with_zeros() {
    let (drive, _) = memory_drive();
    drive.write_file("f", b"xy").unwrap();
    let mut ctx = drive.open("f").unwrap();
    drive.truncate_file(&mut ctx, 5).unwrap();
    drive.flush(&mut ctx).unwrap();
    assert_eq!(drive.read_file("f").unwrap(), b"xy\0\0\0");
}

#[test]
fn test_read_directory_is_a_directory() {
    let (drive, _) = memory_drive();
    drive.create_directory("d").unwrap();
    let mut ctx = drive.open("d").unwrap();
    let err = drive.read(&mut ctx, 0, 1).unwrap_err();
    assert_eq!(DriveErrorCategory::from(&err), DriveErrorCategory::IsDirectory);
}

#[test]
fn test_remove_file_deletes_chunks() {
    let (drive, store) = memory_drive();
    let baseline = store.len();
    drive.write_file("big", &create_sized_content(2 * 1024 * 1024)).unwrap();
    assert!(store.len() > baseline);

    drive.remove_file("big").unwrap();
    assert_eq!(store.len(), baseline);
}

#[test]
fn test_shared_content_survives_removing_one_copy() {
    let (drive, store) = memory_drive();
    let baseline = store.len();
    let content = create_sized_content(1024 * 1024 + 4096);
    drive.write_file("a.bin", &content).unwrap();
    drive.write_file("b.bin", &content).unwrap();

    drive.remove_file("a.bin").unwrap();
    assert_eq!(drive.read_file("b.bin").unwrap(), content);

    drive.remove_file("b.bin").unwrap();
    assert_eq!(store.len(), baseline);
}

#[test]
fn test_rewrites_release_replaced_chunks() {
    let (drive, store) = memory_drive();
    let baseline = store.len();

    for seed in 0..5u8 {
        drive.write_file("f.bin", &vec![seed; 8 * 1024]).unwrap();
        // One chunk plus its reference counter
        assert_eq!(store.len(), baseline + 2);
    }
    assert_eq!(drive.read_file("f.bin").unwrap(), vec![4u8; 8 * 1024]);

    drive.remove_file("f.bin").unwrap();
    assert_eq!(store.len(), baseline);
}

// =============================================================================
// Symlinks
// =============================================================================

#[test]
fn test_symlink() {
    let (drive, _) = memory_drive();
    let meta = drive.add_symlink("link", "../target").unwrap();
    assert!(meta.is_symlink());
    assert_eq!(drive.read_symlink("link").unwrap(), "../target");

    drive.write_file("plain", SMALL_TEXT).unwrap();
    let err = drive.read_symlink("plain").unwrap_err();
    assert!(matches!(err, DriveError::InvalidParameter { .. }), "got {err:?}");
}

// =============================================================================
// Hidden files
// =============================================================================

#[test]
fn test_hidden_files_are_isolated() {
    let (drive, _) = memory_drive();
    drive.create_directory("d").unwrap();
    drive.write_file("d/visible", SMALL_TEXT).unwrap();
    drive.write_hidden_file("d/state.ms_hidden", b"secret", false).unwrap();

    assert_eq!(names(&drive.get_directory("d").unwrap()), ["visible"]);
    assert!(drive.get_meta_data("d/state.ms_hidden").unwrap_err().is_not_found());
    assert!(drive.open("d/state.ms_hidden").unwrap_err().is_not_found());
    assert!(!drive.can_remove("d/state.ms_hidden").unwrap());

    assert_eq!(drive.search_hidden_files("d").unwrap(), ["state.ms_hidden"]);
    assert_eq!(drive.read_hidden_file("d/state.ms_hidden").unwrap(), b"secret");

    // A directory holding only hidden files is still not empty
    drive.remove_file("d/visible").unwrap();
    assert!(!drive.can_remove("d").unwrap());
    drive.delete_hidden_file("d/state.ms_hidden").unwrap();
    assert!(drive.search_hidden_files("d").unwrap().is_empty());
    drive.remove_file("d").unwrap();
}

#[test]
fn test_hidden_overwrite_flag() {
    let (drive, _) = memory_drive();
    drive.write_hidden_file("x.ms_hidden", b"first version", false).unwrap();

    let err = drive.write_hidden_file("x.ms_hidden", b"second", false).unwrap_err();
    assert!(matches!(err, DriveError::AlreadyExists { .. }), "got {err:?}");
    assert_eq!(drive.read_hidden_file("x.ms_hidden").unwrap(), b"first version");

    drive.write_hidden_file("x.ms_hidden", b"second", true).unwrap();
    assert_eq!(drive.read_hidden_file("x.ms_hidden").unwrap(), b"second");
}

#[test]
fn test_hidden_names_are_reserved() {
    let (drive, _) = memory_drive();
    let err = drive.write_file("sneaky.ms_hidden", SMALL_TEXT).unwrap_err();
    assert!(matches!(err, DriveError::InvalidParameter { .. }), "got {err:?}");

    drive.write_file("plain", SMALL_TEXT).unwrap();
    let mut meta = MetaData::file("");
    assert!(drive.rename_file("plain", "plain.ms_hidden", &mut meta).is_err());

    let err = drive.read_hidden_file("plain").unwrap_err();
    assert!(matches!(err, DriveError::InvalidParameter { .. }), "got {err:?}");
}

// =============================================================================
// Notes
// =============================================================================

#[test]
fn test_notes_on_entries_and_root() {
    let (drive, _) = memory_drive();
    drive.create_directory("d").unwrap();
    drive.add_note("d", "first").unwrap();
    drive.add_note("d", "second").unwrap();
    assert_eq!(drive.get_notes("d").unwrap(), ["first", "second"]);

    drive.add_note("", "root note").unwrap();
    assert_eq!(drive.get_notes("/").unwrap(), ["root note"]);

    assert!(drive.add_note("missing", "x").unwrap_err().is_not_found());
}

// =============================================================================
// Data map transfer
// =============================================================================

#[test]
fn test_data_map_transfer_between_paths() {
    let (drive, _) = memory_drive();
    let content = create_sized_content(1024 * 1024 + 99);
    drive.write_file("src", &content).unwrap();

    let data_map = drive.get_data_map("src").unwrap();
    drive.create_directory("copy").unwrap();
    let meta = drive.insert_data_map("copy/dst", &data_map).unwrap();

    assert_eq!(meta.size, content.len() as u64);
    assert_eq!(drive.read_file("copy/dst").unwrap(), content);
}

#[test]
fn test_inserted_data_map_outlives_source() {
    let (drive, store) = memory_drive();
    let baseline = store.len();
    let content = create_sized_content(3 * 1024 * 1024 + 5);
    drive.write_file("src.bin", &content).unwrap();

    let data_map = drive.get_data_map("src.bin").unwrap();
    drive.insert_data_map("copy.bin", &data_map).unwrap();
    drive.remove_file("src.bin").unwrap();
    assert_eq!(drive.read_file("copy.bin").unwrap(), content);

    drive.remove_file("copy.bin").unwrap();
    assert_eq!(store.len(), baseline);
}

#[test]
fn test_failed_insert_releases_its_reference() {
    let (drive, store) = memory_drive();
    drive.write_file("taken.bin", SMALL_TEXT).unwrap();
    let baseline = store.len();
    drive.write_file("src.bin", &create_sized_content(1024 * 1024 + 1)).unwrap();

    let data_map = drive.get_data_map("src.bin").unwrap();
    let err = drive.insert_data_map("taken.bin", &data_map).unwrap_err();
    assert_eq!(DriveErrorCategory::from(&err), DriveErrorCategory::AlreadyExists);
    assert_eq!(drive.read_file("taken.bin").unwrap(), SMALL_TEXT);

    drive.remove_file("src.bin").unwrap();
    assert_eq!(store.len(), baseline);
}

#[test]
fn test_data_map_of_directory_is_invalid() {
    let (drive, _) = memory_drive();
    drive.create_directory("d").unwrap();
    let err = drive.get_data_map("d").unwrap_err();
    assert_eq!(DriveErrorCategory::from(&err), DriveErrorCategory::InvalidArgument);
    assert!(drive.insert_data_map("f", b"not a data map").is_err());
}

#[test]
fn test_hidden_data_map() {
    let (drive, _) = memory_drive();
    drive.write_hidden_file("h.ms_hidden", SMALL_TEXT, false).unwrap();
    let bytes = drive.get_data_map_hidden("h.ms_hidden").unwrap();
    assert!(!bytes.is_empty());
    assert!(drive.get_data_map("h.ms_hidden").unwrap_err().is_not_found());
}

// =============================================================================
// Services
// =============================================================================

#[test]
fn test_service_lifecycle() {
    let (drive, store) = memory_drive();
    let service_store = Arc::new(MemoryStore::new());
    let id = drive.add_service("svc", service_store.clone(), None).unwrap();

    drive.write_file("svc/data", SMALL_TEXT).unwrap();
    assert_eq!(drive.read_file("svc/data").unwrap(), SMALL_TEXT);
    assert!(service_store.contains(&id).unwrap());
    assert!(!store.contains(&id).unwrap());
    assert_eq!(drive.services(), [("svc".to_string(), id)]);

    // Re-adding with the same root keeps the content
    let again = drive.add_service("svc", service_store.clone(), Some(id)).unwrap();
    assert_eq!(again, id);
    assert_eq!(drive.read_file("svc/data").unwrap(), SMALL_TEXT);

    drive.remove_service("svc").unwrap();
    assert!(drive.services().is_empty());
    assert!(drive.get_meta_data("svc").unwrap_err().is_not_found());

    let err = drive.remove_service("svc").unwrap_err();
    assert!(matches!(err, DriveError::ServiceNotFound { .. }), "got {err:?}");
}

#[test]
fn test_service_root_cannot_be_removed_as_file() {
    let (drive, _) = memory_drive();
    drive.add_service("svc", Arc::new(MemoryStore::new()), None).unwrap();
    assert!(!drive.can_remove("svc").unwrap());
    let err = drive.remove_file("svc").unwrap_err();
    assert_eq!(DriveErrorCategory::from(&err), DriveErrorCategory::PermissionDenied);
}

#[test]
fn test_move_between_stores_unsupported() {
    let (drive, _) = memory_drive();
    drive.add_service("svc", Arc::new(MemoryStore::new()), None).unwrap();
    drive.write_file("local", SMALL_TEXT).unwrap();
    let mut meta = MetaData::file("");
    let err = drive.rename_file("local", "svc/local", &mut meta).unwrap_err();
    assert!(matches!(err, DriveError::Unsupported { .. }), "got {err:?}");
}

// =============================================================================
// Mount lifecycle
// =============================================================================

#[test]
fn test_mount_timeout() {
    init_tracing();
    let options = DriveOptions::default().with_mount_timeout(Duration::from_millis(50));
    let drive = Drive::new(Arc::new(MemoryStore::new()), options).unwrap();

    let start = Instant::now();
    assert!(!drive.wait_until_mounted());
    assert!(start.elapsed() >= Duration::from_millis(50));
}

#[test]
fn test_mount_signal_from_integration_thread() {
    let (drive, _) = memory_drive();
    let state = drive.mount_state();
    let mounter = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        state.set(true);
    });
    assert!(drive.wait_until_mounted());
    mounter.join().unwrap();

    drive.set_mount_state(false);
    drive.wait_until_unmounted();
    assert_eq!(drive.mount_state().stage(), MountStage::Unmounted);
}

// =============================================================================
// Failure handling
// =============================================================================

#[test]
fn test_failed_write_leaves_tree_unchanged() {
    init_tracing();
    let store = Arc::new(FailingStore::new());
    let drive = Drive::new(Arc::clone(&store), DriveOptions::default()).unwrap();
    drive.create_directory("kept").unwrap();

    store.fail_writes(true);
    let err = drive.create_directory("lost").unwrap_err();
    assert_eq!(DriveErrorCategory::from(&err), DriveErrorCategory::IoError);
    store.fail_writes(false);

    assert_eq!(names(&drive.get_directory("").unwrap()), ["kept"]);
}

#[test]
fn test_failed_flush_keeps_committed_content() {
    init_tracing();
    let store = Arc::new(FailingStore::new());
    let drive = Drive::new(Arc::clone(&store), DriveOptions::default()).unwrap();
    let old = vec![1u8; 8 * 1024];
    let new = vec![2u8; 8 * 1024];
    drive.write_file("f.bin", &old).unwrap();
    let blobs = store.blob_count();

    let mut ctx = drive.open("f.bin").unwrap();
    drive.write(&mut ctx, 0, &new).unwrap();
    // The chunk and its counter go through, the listing update does not
    store.allow_writes(2);
    let err = drive.flush(&mut ctx).unwrap_err();
    assert_eq!(DriveErrorCategory::from(&err), DriveErrorCategory::IoError);
    store.fail_writes(false);

    assert_eq!(store.blob_count(), blobs);
    assert_eq!(drive.read_file("f.bin").unwrap(), old);

    drive.flush(&mut ctx).unwrap();
    assert_eq!(drive.read_file("f.bin").unwrap(), new);
    assert_eq!(store.blob_count(), blobs);
}

#[test]
fn test_failed_listing_delete_is_not_fatal() {
    init_tracing();
    let store = Arc::new(FailingStore::new());
    let drive = Drive::new(Arc::clone(&store), DriveOptions::default()).unwrap();
    drive.create_directory("d").unwrap();

    store.fail_deletes(true);
    drive.remove_file("d").unwrap();
    store.fail_deletes(false);

    assert!(drive.get_directory("").unwrap().is_empty());
}

#[test]
fn test_concurrent_adds() {
    let (drive, _) = memory_drive();
    let drive = Arc::new(drive);
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let drive = Arc::clone(&drive);
            thread::spawn(move || {
                for j in 0..10 {
                    drive.create_directory(format!("t{i}-{j}")).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(drive.get_directory("").unwrap().len(), 80);
}
