//! The public drive surface.
//!
//! [`Drive`] is what an OS integration layer (FUSE callbacks, a CLI) talks to.
//! Every method runs under one gate, so structural changes never interleave.
//!
//! # Hidden files
//!
//! Names ending in [`HIDDEN_FILE_EXTENSION`] are reserved. Ordinary lookups do
//! not see them and ordinary creation refuses them; they are managed only
//! through the `*_hidden_*` methods.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use oxdrive_core::{Drive, DriveOptions, MemoryStore};
//!
//! let drive = Drive::new(Arc::new(MemoryStore::new()), DriveOptions::default())?;
//! drive.create_directory("docs")?;
//! drive.write_file("docs/readme.txt", b"hello")?;
//! assert_eq!(drive.read_file("docs/readme.txt")?, b"hello");
//! # Ok::<(), oxdrive_core::DriveError>(())
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use super::config::DriveOptions;
use super::error::DriveError;
use super::file_context::FileContext;
use super::mount::MountState;
use super::path::{DirectoryId, DrivePath, Identity};
use super::root::{RootHandler, RootLayout};
use crate::crypto::{DataMap, SelfEncryptor, chunk_refs};
use crate::fs::{HIDDEN_FILE_EXTENSION, MetaData};
use crate::storage::Storage;

pub struct Drive<S: Storage + 'static> {
    root: Mutex<RootHandler>,
    storage: Arc<S>,
    mount_state: Arc<MountState>,
    mount_timeout: Duration,
}

impl<S: Storage + 'static> std::fmt::Debug for Drive<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Drive")
            .field("root", &*self.root.lock())
            .field("mount_timeout", &self.mount_timeout)
            .finish_non_exhaustive()
    }
}

/// Path naming an entry; the root is not one.
fn entry_path(path: impl AsRef<str>) -> Result<DrivePath, DriveError> {
    let path = DrivePath::new(path);
    if path.is_root() {
        return Err(DriveError::EmptyPath);
    }
    Ok(path)
}

fn is_hidden(path: &DrivePath) -> bool {
    path.has_extension(HIDDEN_FILE_EXTENSION)
}

/// Entry path that must not carry the hidden extension.
fn visible_path(path: impl AsRef<str>) -> Result<DrivePath, DriveError> {
    let path = entry_path(path)?;
    if is_hidden(&path) {
        return Err(DriveError::invalid(&path, "name uses the reserved hidden-file extension"));
    }
    Ok(path)
}

/// Entry path that must carry the hidden extension.
fn hidden_path(path: impl AsRef<str>) -> Result<DrivePath, DriveError> {
    let path = entry_path(path)?;
    if !is_hidden(&path) {
        return Err(DriveError::invalid(
            &path,
            format!("hidden files must end with {HIDDEN_FILE_EXTENSION}"),
        ));
    }
    Ok(path)
}

fn context_path(ctx: &FileContext) -> DrivePath {
    ctx.path
        .clone()
        .unwrap_or_else(|| DrivePath::new(&ctx.meta_data.name))
}

/// Release the chunks behind a removed or replaced entry. Failures only leak space.
fn drop_content(storage: Arc<dyn Storage>, meta_data: &MetaData) {
    if let Some(data_map) = meta_data.data_map() {
        release_chunks(&*storage, &meta_data.name, data_map);
    }
}

fn release_chunks(storage: &dyn Storage, name: &str, data_map: &DataMap) {
    if data_map.chunks.is_empty() {
        return;
    }
    match chunk_refs::release(storage, data_map) {
        Ok(deleted) => debug!(name, deleted, "Released content chunks"),
        Err(e) => warn!(name, error = %e, "Failed to release content chunks"),
    }
}

/// Encryptor of `ctx`, created on first use.
fn encryptor<'c>(
    root: &RootHandler,
    ctx: &'c mut FileContext,
) -> Result<&'c mut SelfEncryptor<dyn Storage>, DriveError> {
    if ctx.is_directory() {
        return Err(DriveError::is_a_directory(&context_path(ctx)));
    }
    let encryptor = match ctx.self_encryptor.take() {
        Some(encryptor) => encryptor,
        None => {
            let path = context_path(ctx);
            let data_map = ctx.meta_data.data_map().cloned().unwrap_or_default();
            SelfEncryptor::new(data_map, root.storage_for(&path))
        }
    };
    Ok(ctx.self_encryptor.insert(encryptor))
}

impl<S: Storage + 'static> Drive<S> {
    /// Open a drive over `storage`.
    ///
    /// Creates a new root unless `options.root_parent_id` names an existing one.
    #[instrument(level = "info", skip_all, fields(returning = options.root_parent_id.is_some()))]
    pub fn new(storage: Arc<S>, options: DriveOptions) -> Result<Self, DriveError> {
        let unique_user_id = options.unique_user_id.unwrap_or_else(Identity::random);
        let shared: Arc<dyn Storage> = Arc::clone(&storage) as Arc<dyn Storage>;
        let root = RootHandler::new(
            shared,
            unique_user_id,
            options.root_parent_id,
            options.layout,
        )?;
        info!(
            root = %root.drive_root_id().short(),
            root_parent = %root.root_parent_id().short(),
            "Drive ready"
        );
        Ok(Drive {
            root: Mutex::new(root),
            storage,
            mount_state: options.mount_state.unwrap_or_default(),
            mount_timeout: options.mount_timeout,
        })
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn drive_root_id(&self) -> DirectoryId {
        self.root.lock().drive_root_id()
    }

    pub fn root_parent_id(&self) -> Identity {
        self.root.lock().root_parent_id()
    }

    pub fn unique_user_id(&self) -> Identity {
        self.root.lock().unique_user_id()
    }

    pub fn layout(&self) -> RootLayout {
        self.root.lock().layout()
    }

    // ---- metadata --------------------------------------------------------

    /// Metadata of the entry at `path`. The root path yields the root's entry.
    #[instrument(level = "debug", skip(self), fields(path = path.as_ref()))]
    pub fn get_meta_data(&self, path: impl AsRef<str>) -> Result<MetaData, DriveError> {
        let path = DrivePath::new(path);
        if is_hidden(&path) {
            return Err(DriveError::not_found(&path));
        }
        Ok(self.root.lock().get_meta_data(&path)?.0)
    }

    /// Visible children of the directory at `path`, in name order.
    #[instrument(level = "debug", skip(self), fields(path = path.as_ref()))]
    pub fn get_directory(&self, path: impl AsRef<str>) -> Result<Vec<MetaData>, DriveError> {
        let path = DrivePath::new(path);
        let data = self.root.lock().get_directory(&path)?;
        let children: Vec<MetaData> = data.listing.visible_children().cloned().collect();
        debug!(count = children.len(), "Listed directory");
        Ok(children)
    }

    // ---- structure -------------------------------------------------------

    fn add_locked(
        root: &RootHandler,
        path: &DrivePath,
        ctx: &mut FileContext,
    ) -> Result<(), DriveError> {
        if let Some(name) = path.file_name() {
            ctx.meta_data.name = name.to_string();
        }
        // The new entry holds its own reference to any content it carries.
        let storage = root.storage_for(path);
        if let Some(data_map) = ctx.meta_data.data_map() {
            chunk_refs::retain(&*storage, data_map)?;
        }
        let ids = match root.add_element(path, ctx.meta_data.clone()) {
            Ok(ids) => ids,
            Err(e) => {
                drop_content(storage, &ctx.meta_data);
                return Err(e);
            }
        };
        ctx.path = Some(path.clone());
        ctx.grandparent_directory_id = Some(ids.grandparent_id);
        ctx.parent_directory_id = Some(ids.parent_id);
        Ok(())
    }

    /// Add the entry described by `ctx` at `path` and record where it went.
    #[instrument(level = "debug", skip(self, ctx), fields(path = path.as_ref()))]
    pub fn add_file(&self, path: impl AsRef<str>, ctx: &mut FileContext) -> Result<(), DriveError> {
        let path = visible_path(path)?;
        Self::add_locked(&self.root.lock(), &path, ctx)
    }

    /// Convenience: add an empty directory.
    pub fn create_directory(&self, path: impl AsRef<str>) -> Result<MetaData, DriveError> {
        let mut ctx = FileContext::new("", true);
        self.add_file(path, &mut ctx)?;
        Ok(ctx.meta_data)
    }

    /// Whether `remove_file` would be allowed for `path`.
    #[instrument(level = "debug", skip(self), fields(path = path.as_ref()))]
    pub fn can_remove(&self, path: impl AsRef<str>) -> Result<bool, DriveError> {
        let path = DrivePath::new(path);
        if is_hidden(&path) {
            return Ok(false);
        }
        self.root.lock().can_delete(&path)
    }

    fn remove_locked(root: &RootHandler, path: &DrivePath) -> Result<MetaData, DriveError> {
        let removed = root.delete_element(path)?;
        drop_content(root.storage_for(path), &removed);
        Ok(removed)
    }

    /// Remove a file or an empty directory, deleting a file's content chunks.
    #[instrument(level = "debug", skip(self), fields(path = path.as_ref()))]
    pub fn remove_file(&self, path: impl AsRef<str>) -> Result<MetaData, DriveError> {
        let path = entry_path(path)?;
        if is_hidden(&path) {
            return Err(DriveError::not_found(&path));
        }
        Self::remove_locked(&self.root.lock(), &path)
    }

    /// Rename or move an entry. `meta_data` receives the entry as stored
    /// afterwards; the return value is the space reclaimed by overwriting.
    #[instrument(
        level = "debug",
        skip(self, old_path, new_path, meta_data),
        fields(from = old_path.as_ref(), to = new_path.as_ref())
    )]
    pub fn rename_file(
        &self,
        old_path: impl AsRef<str>,
        new_path: impl AsRef<str>,
        meta_data: &mut MetaData,
    ) -> Result<u64, DriveError> {
        let old_path = entry_path(old_path)?;
        if is_hidden(&old_path) {
            return Err(DriveError::not_found(&old_path));
        }
        let new_path = visible_path(new_path)?;

        let mut root = self.root.lock();
        let outcome = root.rename_element(&old_path, &new_path)?;
        if let Some(ref replaced) = outcome.replaced {
            drop_content(root.storage_for(&new_path), replaced);
        }
        *meta_data = outcome.meta_data;
        Ok(outcome.reclaimed_size)
    }

    // ---- file content ----------------------------------------------------

    /// Open the entry at `path`.
    #[instrument(level = "debug", skip(self), fields(path = path.as_ref()))]
    pub fn open(&self, path: impl AsRef<str>) -> Result<FileContext, DriveError> {
        let path = entry_path(path)?;
        if is_hidden(&path) {
            return Err(DriveError::not_found(&path));
        }
        let (meta_data, ids) = self.root.lock().get_meta_data(&path)?;
        let mut ctx = FileContext::from_meta_data(meta_data);
        ctx.path = Some(path);
        ctx.grandparent_directory_id = Some(ids.grandparent_id);
        ctx.parent_directory_id = Some(ids.parent_id);
        Ok(ctx)
    }

    #[instrument(level = "trace", skip(self, ctx), fields(name = %ctx.meta_data.name))]
    pub fn read(
        &self,
        ctx: &mut FileContext,
        offset: u64,
        length: usize,
    ) -> Result<Vec<u8>, DriveError> {
        let root = self.root.lock();
        let data = encryptor(&root, ctx)?.read(offset, length)?;
        ctx.meta_data.update_last_access_time();
        Ok(data)
    }

    #[instrument(
        level = "trace",
        skip(self, ctx, data),
        fields(name = %ctx.meta_data.name, len = data.len())
    )]
    pub fn write(
        &self,
        ctx: &mut FileContext,
        offset: u64,
        data: &[u8],
    ) -> Result<usize, DriveError> {
        let root = self.root.lock();
        let encryptor = encryptor(&root, ctx)?;
        encryptor.write(offset, data)?;
        let size = encryptor.size();
        ctx.meta_data.update_size(size);
        ctx.content_changed = true;
        Ok(data.len())
    }

    /// Resize the file's content, zero-filling on growth.
    #[instrument(level = "debug", skip(self, ctx), fields(name = %ctx.meta_data.name))]
    pub fn truncate_file(&self, ctx: &mut FileContext, size: u64) -> Result<(), DriveError> {
        let root = self.root.lock();
        encryptor(&root, ctx)?.truncate(size)?;
        ctx.meta_data.update_size(size);
        ctx.content_changed = true;
        Ok(())
    }

    fn flush_locked(root: &RootHandler, ctx: &mut FileContext) -> Result<(), DriveError> {
        if !ctx.content_changed {
            return Ok(());
        }
        let path = ctx
            .path
            .clone()
            .ok_or_else(|| DriveError::invalid(&context_path(ctx), "file was never added"))?;
        let previous = ctx.meta_data.data_map().cloned();
        let (data_map, size) = {
            let encryptor = encryptor(root, ctx)?;
            (encryptor.flush()?, encryptor.size())
        };
        let storage = root.storage_for(&path);
        let swapped = previous.as_ref() != Some(&data_map);
        if swapped {
            chunk_refs::retain(&*storage, &data_map)?;
        }

        let committed = ctx.meta_data.clone();
        ctx.meta_data.set_data_map(data_map.clone());
        ctx.meta_data.update_size(size);
        let parent = path.parent().unwrap_or_else(DrivePath::root);
        if let Err(e) = root.update_parent_directory_listing(&parent, ctx.meta_data.clone()) {
            if swapped {
                release_chunks(&*storage, path.as_str(), &data_map);
            }
            if let Some(encryptor) = ctx.self_encryptor.as_mut() {
                encryptor.rollback(previous.unwrap_or_default());
            }
            ctx.meta_data = committed;
            return Err(e);
        }

        if swapped && let Some(previous) = previous {
            release_chunks(&*storage, path.as_str(), &previous);
        }
        ctx.content_changed = false;
        debug!(path = %path, size, "Flushed file content");
        Ok(())
    }

    /// Store pending content and update the entry in its parent listing.
    #[instrument(level = "debug", skip(self, ctx), fields(name = %ctx.meta_data.name))]
    pub fn flush(&self, ctx: &mut FileContext) -> Result<(), DriveError> {
        Self::flush_locked(&self.root.lock(), ctx)
    }

    /// Flush and close a handle.
    pub fn release(&self, mut ctx: FileContext) -> Result<(), DriveError> {
        self.flush(&mut ctx)?;
        ctx.self_encryptor = None;
        Ok(())
    }

    /// Convenience: whole-file read.
    pub fn read_file(&self, path: impl AsRef<str>) -> Result<Vec<u8>, DriveError> {
        let mut ctx = self.open(path)?;
        let length = usize::try_from(ctx.meta_data.size).map_err(|_| {
            DriveError::invalid(&context_path(&ctx), "file too large to read at once")
        })?;
        self.read(&mut ctx, 0, length)
    }

    /// Convenience: create or replace a file with `content`.
    pub fn write_file(
        &self,
        path: impl AsRef<str>,
        content: &[u8],
    ) -> Result<MetaData, DriveError> {
        let path = visible_path(path)?;
        let root = self.root.lock();
        let mut ctx = match root.get_meta_data(&path) {
            Ok((meta_data, _)) => {
                let mut ctx = FileContext::from_meta_data(meta_data);
                ctx.path = Some(path.clone());
                ctx
            }
            Err(e) if e.is_not_found() => {
                let mut ctx = FileContext::new("", false);
                Self::add_locked(&root, &path, &mut ctx)?;
                ctx
            }
            Err(e) => return Err(e),
        };
        Self::replace_content_locked(&root, &mut ctx, content)?;
        Ok(ctx.meta_data)
    }

    fn replace_content_locked(
        root: &RootHandler,
        ctx: &mut FileContext,
        content: &[u8],
    ) -> Result<(), DriveError> {
        let encryptor = encryptor(root, ctx)?;
        if encryptor.size() > content.len() as u64 {
            encryptor.truncate(content.len() as u64)?;
        }
        encryptor.write(0, content)?;
        ctx.content_changed = true;
        Self::flush_locked(root, ctx)
    }

    // ---- symlinks --------------------------------------------------------

    #[instrument(level = "debug", skip(self), fields(path = path.as_ref()))]
    pub fn add_symlink(&self, path: impl AsRef<str>, target: &str) -> Result<MetaData, DriveError> {
        let path = visible_path(path)?;
        let mut ctx = FileContext::from_meta_data(MetaData::symlink("", target));
        Self::add_locked(&self.root.lock(), &path, &mut ctx)?;
        Ok(ctx.meta_data)
    }

    #[instrument(level = "debug", skip(self), fields(path = path.as_ref()))]
    pub fn read_symlink(&self, path: impl AsRef<str>) -> Result<String, DriveError> {
        let path = entry_path(path)?;
        let meta_data = self.get_meta_data(path.as_str())?;
        meta_data
            .link_target()
            .map(str::to_string)
            .ok_or_else(|| DriveError::invalid(&path, "not a symlink"))
    }

    // ---- hidden files ----------------------------------------------------

    #[instrument(level = "debug", skip(self), fields(path = path.as_ref()))]
    pub fn read_hidden_file(&self, path: impl AsRef<str>) -> Result<Vec<u8>, DriveError> {
        let path = hidden_path(path)?;
        let root = self.root.lock();
        let (meta_data, _) = root.get_meta_data(&path)?;
        let mut ctx = FileContext::from_meta_data(meta_data);
        ctx.path = Some(path.clone());
        let encryptor = encryptor(&root, &mut ctx)?;
        let length = usize::try_from(encryptor.size())
            .map_err(|_| DriveError::invalid(&path, "hidden file too large"))?;
        Ok(encryptor.read(0, length)?)
    }

    /// Write a hidden file. An existing one is replaced only with `overwrite`.
    #[instrument(
        level = "debug",
        skip(self, content),
        fields(path = path.as_ref(), len = content.len())
    )]
    pub fn write_hidden_file(
        &self,
        path: impl AsRef<str>,
        content: &[u8],
        overwrite: bool,
    ) -> Result<(), DriveError> {
        let path = hidden_path(path)?;
        let root = self.root.lock();
        let mut ctx = match root.get_meta_data(&path) {
            Ok(_) if !overwrite => return Err(DriveError::already_exists(&path)),
            Ok((meta_data, ids)) => {
                let mut ctx = FileContext::from_meta_data(meta_data);
                ctx.path = Some(path.clone());
                ctx.grandparent_directory_id = Some(ids.grandparent_id);
                ctx.parent_directory_id = Some(ids.parent_id);
                ctx
            }
            Err(e) if e.is_not_found() => {
                let mut ctx = FileContext::new("", false);
                Self::add_locked(&root, &path, &mut ctx)?;
                ctx
            }
            Err(e) => return Err(e),
        };
        if ctx.is_directory() {
            return Err(DriveError::is_a_directory(&path));
        }
        Self::replace_content_locked(&root, &mut ctx, content)
    }

    #[instrument(level = "debug", skip(self), fields(path = path.as_ref()))]
    pub fn delete_hidden_file(&self, path: impl AsRef<str>) -> Result<(), DriveError> {
        let path = hidden_path(path)?;
        Self::remove_locked(&self.root.lock(), &path)?;
        Ok(())
    }

    /// Names of hidden files directly inside the directory at `path`.
    #[instrument(level = "debug", skip(self), fields(path = path.as_ref()))]
    pub fn search_hidden_files(&self, path: impl AsRef<str>) -> Result<Vec<String>, DriveError> {
        let path = DrivePath::new(path);
        Ok(self.root.lock().get_directory(&path)?.listing.hidden_child_names())
    }

    // ---- notes -----------------------------------------------------------

    #[instrument(level = "debug", skip(self), fields(path = path.as_ref()))]
    pub fn get_notes(&self, path: impl AsRef<str>) -> Result<Vec<String>, DriveError> {
        Ok(self.get_meta_data(path)?.notes)
    }

    /// Append a note to the entry at `path`.
    #[instrument(level = "debug", skip(self, note), fields(path = path.as_ref()))]
    pub fn add_note(
        &self,
        path: impl AsRef<str>,
        note: impl Into<String>,
    ) -> Result<(), DriveError> {
        let path = DrivePath::new(path);
        if is_hidden(&path) {
            return Err(DriveError::not_found(&path));
        }
        let root = self.root.lock();
        let (mut meta_data, _) = root.get_meta_data(&path)?;
        meta_data.notes.push(note.into());
        match path.parent() {
            Some(parent) => root.update_parent_directory_listing(&parent, meta_data),
            None => root.update_root_entry(meta_data),
        }
    }

    // ---- transfer --------------------------------------------------------

    fn data_map_locked(root: &RootHandler, path: &DrivePath) -> Result<Vec<u8>, DriveError> {
        let (meta_data, _) = root.get_meta_data(path)?;
        let data_map = meta_data
            .data_map()
            .ok_or_else(|| DriveError::invalid(path, "entry has no content"))?;
        Ok(data_map.serialise()?)
    }

    /// Serialized data map of the file at `path`.
    #[instrument(level = "debug", skip(self), fields(path = path.as_ref()))]
    pub fn get_data_map(&self, path: impl AsRef<str>) -> Result<Vec<u8>, DriveError> {
        let path = entry_path(path)?;
        if is_hidden(&path) {
            return Err(DriveError::not_found(&path));
        }
        Self::data_map_locked(&self.root.lock(), &path)
    }

    /// Serialized data map of the hidden file at `path`.
    #[instrument(level = "debug", skip(self), fields(path = path.as_ref()))]
    pub fn get_data_map_hidden(&self, path: impl AsRef<str>) -> Result<Vec<u8>, DriveError> {
        let path = hidden_path(path)?;
        Self::data_map_locked(&self.root.lock(), &path)
    }

    /// Create a file at `path` whose content is described by `serialised_data_map`.
    ///
    /// The chunks must already be in the store; nothing is copied. The new
    /// entry takes its own reference, so the source may be removed afterwards.
    #[instrument(level = "debug", skip(self, serialised_data_map), fields(path = path.as_ref()))]
    pub fn insert_data_map(
        &self,
        path: impl AsRef<str>,
        serialised_data_map: &[u8],
    ) -> Result<MetaData, DriveError> {
        let path = visible_path(path)?;
        let data_map = DataMap::parse(serialised_data_map)?;
        let mut meta_data = MetaData::file("");
        meta_data.update_size(data_map.size());
        meta_data.set_data_map(data_map);
        let mut ctx = FileContext::from_meta_data(meta_data);
        Self::add_locked(&self.root.lock(), &path, &mut ctx)?;
        info!(size = ctx.meta_data.size, "Inserted data map");
        Ok(ctx.meta_data)
    }

    // ---- services --------------------------------------------------------

    pub fn add_service(
        &self,
        alias: &str,
        storage: Arc<dyn Storage>,
        service_root_id: Option<DirectoryId>,
    ) -> Result<DirectoryId, DriveError> {
        self.root.lock().add_service(alias, storage, service_root_id)
    }

    pub fn add_service_at(
        &self,
        alias: &str,
        store_path: &Path,
        service_root_id: Option<DirectoryId>,
    ) -> Result<DirectoryId, DriveError> {
        self.root.lock().add_service_at(alias, store_path, service_root_id)
    }

    pub fn remove_service(&self, alias: &str) -> Result<(), DriveError> {
        self.root.lock().remove_service(alias)
    }

    /// Registered services and their root ids.
    pub fn services(&self) -> Vec<(String, DirectoryId)> {
        self.root
            .lock()
            .services()
            .map(|(alias, id)| (alias.to_string(), id))
            .collect()
    }

    // ---- lifecycle -------------------------------------------------------

    pub fn mount_state(&self) -> Arc<MountState> {
        Arc::clone(&self.mount_state)
    }

    pub fn set_mount_state(&self, mounted: bool) {
        self.mount_state.set(mounted);
    }

    /// Wait up to the configured timeout for the mount. False on timeout.
    pub fn wait_until_mounted(&self) -> bool {
        self.mount_state.wait_until_mounted(self.mount_timeout)
    }

    pub fn wait_until_unmounted(&self) {
        self.mount_state.wait_until_unmounted();
    }
}
