//! Path resolution and structural mutation over one store.
//!
//! A [`DirectoryListingHandler`] owns no listings. Every call loads what it
//! needs into a per-call working set, mutates the listings in memory, and
//! writes each touched listing back before returning. Two references to the
//! same directory within one call therefore always share one in-memory copy.
//!
//! The handler's root directory has its own metadata entry, named
//! [`ROOT_ENTRY_NAME`], in a one-entry listing called the root parent. Service
//! handlers have their root entry in another store and never touch it.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use tracing::{debug, info, instrument, trace, warn};

use super::error::{DriveError, DriveOpContext};
use super::path::{DirectoryId, DrivePath, Identity};
use crate::fs::{DirectoryData, DirectoryListing, ListingError, MetaData};
use crate::storage::{Storage, StorageError};

/// Name of the root directory's entry inside the root parent listing.
pub const ROOT_ENTRY_NAME: &str = "/";

/// Ids of the listings around an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementIds {
    /// Listing that holds the parent directory's own entry.
    pub grandparent_id: DirectoryId,
    /// Listing that holds the entry.
    pub parent_id: DirectoryId,
}

/// Result of a rename or move.
#[derive(Debug, Clone)]
pub struct RenameOutcome {
    /// The entry as stored under its new name.
    pub meta_data: MetaData,
    /// Space released by the operation.
    pub reclaimed_size: u64,
    /// Entry that was overwritten at the destination, if any.
    pub replaced: Option<MetaData>,
}

pub struct DirectoryListingHandler<S: Storage + ?Sized = dyn Storage> {
    storage: Arc<S>,
    root_parent_id: Identity,
    root_id: DirectoryId,
    owns_root_parent: bool,
}

impl<S: Storage + ?Sized> std::fmt::Debug for DirectoryListingHandler<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryListingHandler")
            .field("root_parent_id", &self.root_parent_id)
            .field("root_id", &self.root_id)
            .field("owns_root_parent", &self.owns_root_parent)
            .finish_non_exhaustive()
    }
}

/// Listings loaded during one call, written back in the order they were dirtied.
struct WorkingSet<'a, S: Storage + ?Sized> {
    handler: &'a DirectoryListingHandler<S>,
    loaded: HashMap<DirectoryId, DirectoryData>,
    dirty: Vec<DirectoryId>,
    cosmetic: Vec<DirectoryId>,
}

impl<'a, S: Storage + ?Sized> WorkingSet<'a, S> {
    fn new(handler: &'a DirectoryListingHandler<S>) -> Self {
        WorkingSet {
            handler,
            loaded: HashMap::new(),
            dirty: Vec::new(),
            cosmetic: Vec::new(),
        }
    }

    fn get(&mut self, id: &DirectoryId) -> Result<&mut DirectoryData, DriveError> {
        let handler = self.handler;
        match self.loaded.entry(*id) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => Ok(entry.insert(handler.load(id)?)),
        }
    }

    fn mark_dirty(&mut self, id: DirectoryId) {
        if !self.dirty.contains(&id) {
            self.dirty.push(id);
        }
    }

    fn mark_cosmetic(&mut self, id: DirectoryId) {
        if !self.cosmetic.contains(&id) {
            self.cosmetic.push(id);
        }
    }

    fn take(mut self, id: &DirectoryId) -> Result<DirectoryData, DriveError> {
        self.get(id)?;
        self.loaded
            .remove(id)
            .ok_or_else(|| StorageError::not_found(id).into())
    }

    /// Persist every dirty listing, then best-effort persist cosmetic ones.
    fn commit(self) -> Result<(), DriveError> {
        for id in &self.dirty {
            if let Some(data) = self.loaded.get(id) {
                self.handler.persist(data)?;
            }
        }
        for id in self.cosmetic.iter().filter(|id| !self.dirty.contains(id)) {
            if let Some(data) = self.loaded.get(id)
                && let Err(e) = self.handler.persist(data)
            {
                warn!(directory = %id.short(), error = %e, "Failed to persist timestamp update");
            }
        }
        Ok(())
    }
}

impl<S: Storage + ?Sized> DirectoryListingHandler<S> {
    /// Create a fresh root in `storage`: a root listing and a root parent
    /// listing holding the root's entry.
    #[instrument(level = "info", skip_all)]
    pub fn create(storage: Arc<S>) -> Result<Self, DriveError> {
        let root_parent_id = Identity::random();
        let root_meta = MetaData::directory(ROOT_ENTRY_NAME);
        let root_id = root_meta
            .directory_id()
            .ok_or_else(|| DriveError::corrupt(&DrivePath::root(), "root entry without id"))?;

        let handler = DirectoryListingHandler {
            storage,
            root_parent_id,
            root_id,
            owns_root_parent: true,
        };

        let mut parent_listing = DirectoryListing::new(root_parent_id);
        parent_listing.add_child(root_meta)?;
        handler.persist(&DirectoryData::new(root_parent_id, DirectoryListing::new(root_id)))?;
        handler.persist(&DirectoryData::new(root_parent_id, parent_listing))?;

        info!(root = %root_id.short(), root_parent = %root_parent_id.short(), "Created drive root");
        Ok(handler)
    }

    /// Attach to an existing root through its root parent listing.
    ///
    /// Any missing blob fails with [`DriveError::RootNotFound`]; nothing is
    /// ever re-created.
    #[instrument(level = "info", skip_all, fields(root_parent = %root_parent_id.short()))]
    pub fn open(storage: Arc<S>, root_parent_id: Identity) -> Result<Self, DriveError> {
        let root_not_found = |source: Option<StorageError>, id: Identity| DriveError::RootNotFound {
            source,
            context: DriveOpContext::new().with_directory_id(id).into_box(),
        };

        let parent_bytes = storage.get(&root_parent_id).map_err(|e| {
            if e.is_not_found() {
                root_not_found(Some(e), root_parent_id)
            } else {
                DriveError::Storage(e)
            }
        })?;
        let parent = DirectoryData::parse(&parent_bytes, &root_parent_id)?;
        let root_id = parent
            .listing
            .get_child(ROOT_ENTRY_NAME)
            .ok()
            .and_then(MetaData::directory_id)
            .ok_or_else(|| root_not_found(None, root_parent_id))?;

        let handler = DirectoryListingHandler {
            storage,
            root_parent_id,
            root_id,
            owns_root_parent: true,
        };
        handler.load(&root_id).map_err(|e| match e {
            DriveError::Storage(e) if e.is_not_found() => root_not_found(Some(e), root_id),
            other => other,
        })?;

        info!(root = %root_id.short(), "Opened existing drive root");
        Ok(handler)
    }

    /// Create an empty service root whose entry lives under `parent_id` elsewhere.
    pub fn create_detached(storage: Arc<S>, parent_id: DirectoryId) -> Result<Self, DriveError> {
        let root_id = Identity::random();
        let handler = DirectoryListingHandler {
            storage,
            root_parent_id: parent_id,
            root_id,
            owns_root_parent: false,
        };
        handler.persist(&DirectoryData::new(parent_id, DirectoryListing::new(root_id)))?;
        debug!(root = %root_id.short(), "Created detached root");
        Ok(handler)
    }

    /// Attach to an existing service root, re-parenting it under `parent_id`.
    pub fn open_detached(
        storage: Arc<S>,
        root_id: DirectoryId,
        parent_id: DirectoryId,
    ) -> Result<Self, DriveError> {
        let handler = DirectoryListingHandler {
            storage,
            root_parent_id: parent_id,
            root_id,
            owns_root_parent: false,
        };
        let mut data = handler.load(&root_id).map_err(|e| match e {
            DriveError::Storage(e) if e.is_not_found() => DriveError::RootNotFound {
                source: Some(e),
                context: DriveOpContext::new().with_directory_id(root_id).into_box(),
            },
            other => other,
        })?;
        if data.parent_id != parent_id {
            data.parent_id = parent_id;
            handler.persist(&data)?;
        }
        Ok(handler)
    }

    #[inline]
    pub fn root_id(&self) -> DirectoryId {
        self.root_id
    }

    #[inline]
    pub fn root_parent_id(&self) -> Identity {
        self.root_parent_id
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    fn load(&self, id: &DirectoryId) -> Result<DirectoryData, DriveError> {
        trace!(directory = %id.short(), "Loading listing");
        let bytes = self.storage.get(id)?;
        Ok(DirectoryData::parse(&bytes, id)?)
    }

    fn persist(&self, data: &DirectoryData) -> Result<(), DriveError> {
        trace!(
            directory = %data.directory_id().short(),
            children = data.listing.len(),
            "Persisting listing"
        );
        self.storage.put(&data.directory_id(), &data.serialise()?)?;
        Ok(())
    }

    /// Walk `path` down from the root and return the id of the directory it names.
    fn resolve_directory(
        &self,
        ws: &mut WorkingSet<'_, S>,
        path: &DrivePath,
    ) -> Result<DirectoryId, DriveError> {
        let mut current = self.root_id;
        let mut walked = DrivePath::root();
        for component in path.components() {
            walked = walked.join(component);
            let data = ws.get(&current)?;
            let child = data
                .listing
                .get_child(component)
                .map_err(|_| DriveError::not_found(&walked))?;
            if !child.is_directory() {
                return Err(DriveError::not_a_directory(&walked));
            }
            current = child
                .directory_id()
                .ok_or_else(|| DriveError::corrupt(&walked, "directory entry without id"))?;
        }
        Ok(current)
    }

    /// Split a non-root path into its parent listing id and entry name.
    fn locate<'p>(
        &self,
        ws: &mut WorkingSet<'_, S>,
        path: &'p DrivePath,
    ) -> Result<(DrivePath, DirectoryId, &'p str), DriveError> {
        let (parent_path, name) = path.split().ok_or(DriveError::EmptyPath)?;
        let parent_id = self.resolve_directory(ws, &parent_path)?;
        Ok((parent_path, parent_id, name))
    }

    /// Touch the parent directory's own entry after its contents changed.
    ///
    /// Failures are logged and swallowed.
    fn touch_directory_entry(
        &self,
        ws: &mut WorkingSet<'_, S>,
        directory_path: &DrivePath,
        directory_id: &DirectoryId,
    ) {
        if directory_path.is_root() && !self.owns_root_parent {
            return;
        }
        let name = directory_path.file_name().unwrap_or(ROOT_ENTRY_NAME);
        match Self::touch_entry(ws, directory_id, name) {
            Ok(holder_id) => ws.mark_cosmetic(holder_id),
            Err(e) => {
                warn!(path = %directory_path, error = %e, "Failed to update directory timestamps")
            }
        }
    }

    fn touch_entry(
        ws: &mut WorkingSet<'_, S>,
        directory_id: &DirectoryId,
        name: &str,
    ) -> Result<DirectoryId, DriveError> {
        let holder_id = ws.get(directory_id)?.parent_id;
        let holder = ws.get(&holder_id)?;
        let mut entry = holder.listing.get_child(name)?.clone();
        entry.update_last_modified_time();
        holder.listing.update_child(entry, false)?;
        Ok(holder_id)
    }

    /// Load the listing of the directory at `path`.
    #[instrument(level = "debug", skip(self), fields(path = %path))]
    pub fn get_from_path(&self, path: &DrivePath) -> Result<DirectoryData, DriveError> {
        let mut ws = WorkingSet::new(self);
        let id = self.resolve_directory(&mut ws, path)?;
        let data = ws.take(&id)?;
        debug!(directory = %id.short(), children = data.listing.len(), "Resolved directory");
        Ok(data)
    }

    /// Entry for `path` together with the ids of its surrounding listings.
    #[instrument(level = "debug", skip(self), fields(path = %path))]
    pub fn get_meta_data(&self, path: &DrivePath) -> Result<(MetaData, ElementIds), DriveError> {
        let mut ws = WorkingSet::new(self);
        if path.is_root() {
            if !self.owns_root_parent {
                return Err(DriveError::invalid(path, "root entry is held by another store"));
            }
            let data = ws.get(&self.root_parent_id)?;
            let meta = data.listing.get_child(ROOT_ENTRY_NAME)?.clone();
            let ids = ElementIds {
                grandparent_id: data.parent_id,
                parent_id: self.root_parent_id,
            };
            return Ok((meta, ids));
        }

        let (_, parent_id, name) = self.locate(&mut ws, path)?;
        let data = ws.get(&parent_id)?;
        let meta = data
            .listing
            .get_child(name)
            .map_err(|_| DriveError::not_found(path))?
            .clone();
        Ok((
            meta,
            ElementIds {
                grandparent_id: data.parent_id,
                parent_id,
            },
        ))
    }

    /// Add `meta_data` at `path`, creating an empty listing for directories.
    ///
    /// The entry takes its name from the final path component.
    #[instrument(
        level = "debug",
        skip(self, meta_data),
        fields(path = %path, file_type = meta_data.file_type.name())
    )]
    pub fn add_element(
        &self,
        path: &DrivePath,
        meta_data: MetaData,
    ) -> Result<ElementIds, DriveError> {
        self.insert_element(path, meta_data, true)
    }

    /// Add a directory entry pointing at a listing kept in another store.
    pub(crate) fn add_foreign_element(
        &self,
        path: &DrivePath,
        meta_data: MetaData,
    ) -> Result<ElementIds, DriveError> {
        self.insert_element(path, meta_data, false)
    }

    fn insert_element(
        &self,
        path: &DrivePath,
        mut meta_data: MetaData,
        create_listing: bool,
    ) -> Result<ElementIds, DriveError> {
        if path.is_root() {
            return Err(DriveError::already_exists(path));
        }
        let mut ws = WorkingSet::new(self);
        let (parent_path, parent_id, name) = self.locate(&mut ws, path)?;
        meta_data.name = name.to_string();

        let new_listing = if create_listing && meta_data.is_directory() {
            let id = meta_data
                .directory_id()
                .ok_or_else(|| DriveError::corrupt(path, "directory entry without id"))?;
            // A reused directory entry must not replace a live listing
            if self.storage.contains(&id)? {
                return Err(DriveError::already_exists(path));
            }
            Some(DirectoryData::new(parent_id, DirectoryListing::new(id)))
        } else {
            None
        };

        let parent = ws.get(&parent_id)?;
        let grandparent_id = parent.parent_id;
        parent.listing.add_child(meta_data).map_err(|e| match e {
            ListingError::AlreadyExists { .. } => DriveError::already_exists(path),
            other => other.into(),
        })?;
        ws.mark_dirty(parent_id);
        self.touch_directory_entry(&mut ws, &parent_path, &parent_id);

        // The parent copy in the working set is discarded if this fails
        if let Some(ref data) = new_listing {
            self.persist(data)?;
        }
        if let Err(e) = ws.commit() {
            if let Some(data) = new_listing
                && let Err(cleanup) = self.storage.delete(&data.directory_id())
            {
                warn!(error = %cleanup, "Failed to remove orphaned listing");
            }
            return Err(e);
        }

        debug!(parent = %parent_id.short(), "Element added");
        Ok(ElementIds {
            grandparent_id,
            parent_id,
        })
    }

    /// Remove the entry at `path` and return it. Directories must be empty.
    #[instrument(level = "debug", skip(self), fields(path = %path))]
    pub fn delete_element(&self, path: &DrivePath) -> Result<MetaData, DriveError> {
        self.remove_element(path, true)
    }

    /// Remove an entry whose listing lives in another store, leaving it alone.
    pub(crate) fn remove_foreign_element(&self, path: &DrivePath) -> Result<MetaData, DriveError> {
        self.remove_element(path, false)
    }

    fn remove_element(&self, path: &DrivePath, owns_listing: bool) -> Result<MetaData, DriveError> {
        if path.is_root() {
            return Err(DriveError::invalid(path, "the root cannot be deleted"));
        }
        let mut ws = WorkingSet::new(self);
        let (parent_path, parent_id, name) = self.locate(&mut ws, path)?;
        let meta = ws
            .get(&parent_id)?
            .listing
            .get_child(name)
            .map_err(|_| DriveError::not_found(path))?
            .clone();

        let listing_id = if owns_listing && meta.is_directory() {
            let id = meta
                .directory_id()
                .ok_or_else(|| DriveError::corrupt(path, "directory entry without id"))?;
            if !ws.get(&id)?.listing.is_empty() {
                return Err(DriveError::not_empty(path));
            }
            Some(id)
        } else {
            None
        };

        let removed = ws.get(&parent_id)?.listing.remove_child(name)?;
        ws.mark_dirty(parent_id);
        self.touch_directory_entry(&mut ws, &parent_path, &parent_id);
        ws.commit()?;

        if let Some(id) = listing_id
            && let Err(e) = self.storage.delete(&id)
        {
            warn!(directory = %id.short(), error = %e, "Failed to delete listing blob");
        }
        debug!("Element deleted");
        Ok(removed)
    }

    /// Decide whether `existing` may be replaced by `moving`; returns the
    /// reclaimed size and the listing to drop afterwards.
    fn check_overwrite(
        &self,
        ws: &mut WorkingSet<'_, S>,
        moving: &MetaData,
        existing: &MetaData,
        target: &DrivePath,
    ) -> Result<Option<DirectoryId>, DriveError> {
        match (moving.is_directory(), existing.is_directory()) {
            (true, false) => Err(DriveError::not_a_directory(target)),
            (false, true) => Err(DriveError::is_a_directory(target)),
            (true, true) => {
                let id = existing
                    .directory_id()
                    .ok_or_else(|| DriveError::corrupt(target, "directory entry without id"))?;
                if ws.get(&id)?.listing.is_empty() {
                    Ok(Some(id))
                } else {
                    Err(DriveError::not_empty(target))
                }
            }
            (false, false) => Ok(None),
        }
    }

    /// Rename or move the entry at `old_path` to `new_path`.
    ///
    /// An existing file or empty directory of the same kind at the destination
    /// is replaced and its allocated size reported as reclaimed.
    #[instrument(level = "debug", skip(self), fields(from = %old_path, to = %new_path))]
    pub fn rename_element(
        &self,
        old_path: &DrivePath,
        new_path: &DrivePath,
    ) -> Result<RenameOutcome, DriveError> {
        if old_path.is_root() || new_path.is_root() {
            return Err(DriveError::invalid(old_path, "the root cannot be renamed"));
        }
        let mut ws = WorkingSet::new(self);
        let (old_parent_path, old_parent_id, old_name) = self.locate(&mut ws, old_path)?;
        let mut meta = ws
            .get(&old_parent_id)?
            .listing
            .get_child(old_name)
            .map_err(|_| DriveError::not_found(old_path))?
            .clone();

        if old_path == new_path {
            return Ok(RenameOutcome {
                meta_data: meta,
                reclaimed_size: 0,
                replaced: None,
            });
        }
        if new_path.starts_with(old_path) {
            return Err(DriveError::invalid(new_path, "cannot move a directory into itself"));
        }

        let (new_parent_path, new_parent_id, new_name) = self.locate(&mut ws, new_path)?;

        let mut replaced = None;
        let mut dropped_listing = None;
        let existing = ws.get(&new_parent_id)?.listing.get_child(new_name).ok().cloned();
        if let Some(existing) = existing {
            dropped_listing = self.check_overwrite(&mut ws, &meta, &existing, new_path)?;
            ws.get(&new_parent_id)?.listing.remove_child(new_name)?;
            debug!(replaced = %existing.name, "Overwriting destination");
            replaced = Some(existing);
        }

        if old_parent_id == new_parent_id {
            let parent = ws.get(&old_parent_id)?;
            parent.listing.rename_child(old_name, new_name)?;
            meta = parent.listing.get_child(new_name)?.clone();
            meta.update_last_status_time();
            parent.listing.update_child(meta.clone(), true)?;
            ws.mark_dirty(old_parent_id);
            self.touch_directory_entry(&mut ws, &old_parent_path, &old_parent_id);
        } else {
            meta.name = new_name.to_string();
            meta.update_last_status_time();
            ws.get(&new_parent_id)?.listing.add_child(meta.clone())?;
            ws.mark_dirty(new_parent_id);

            if let Some(moved_id) = meta.directory_id() {
                ws.get(&moved_id)?.parent_id = new_parent_id;
                ws.mark_dirty(moved_id);
            }

            ws.get(&old_parent_id)?.listing.remove_child(old_name)?;
            ws.mark_dirty(old_parent_id);

            self.touch_directory_entry(&mut ws, &new_parent_path, &new_parent_id);
            self.touch_directory_entry(&mut ws, &old_parent_path, &old_parent_id);
        }
        ws.commit()?;

        if let Some(id) = dropped_listing
            && let Err(e) = self.storage.delete(&id)
        {
            warn!(directory = %id.short(), error = %e, "Failed to delete replaced listing blob");
        }

        let reclaimed_size = replaced.as_ref().map_or(0, MetaData::allocated_size);
        debug!(reclaimed_size, "Element renamed");
        Ok(RenameOutcome {
            meta_data: meta,
            reclaimed_size,
            replaced,
        })
    }

    /// Replace an entry of the directory at `parent_path` without resetting
    /// its iteration order. Used for size, timestamp and note updates.
    #[instrument(
        level = "debug",
        skip(self, meta_data),
        fields(parent = %parent_path, name = %meta_data.name)
    )]
    pub fn update_parent_directory_listing(
        &self,
        parent_path: &DrivePath,
        meta_data: MetaData,
    ) -> Result<(), DriveError> {
        let mut ws = WorkingSet::new(self);
        let parent_id = self.resolve_directory(&mut ws, parent_path)?;
        let entry_path = parent_path.join(&meta_data.name);
        ws.get(&parent_id)?
            .listing
            .update_child(meta_data, false)
            .map_err(|e| match e {
                ListingError::NotFound { .. } => DriveError::not_found(&entry_path),
                other => other.into(),
            })?;
        ws.mark_dirty(parent_id);
        ws.commit()
    }

    /// Replace the root's own entry in the root parent listing.
    pub fn update_root_entry(&self, mut meta_data: MetaData) -> Result<(), DriveError> {
        if !self.owns_root_parent {
            return Err(DriveError::invalid(
                &DrivePath::root(),
                "root entry is held by another store",
            ));
        }
        meta_data.name = ROOT_ENTRY_NAME.to_string();
        let mut ws = WorkingSet::new(self);
        ws.get(&self.root_parent_id)?
            .listing
            .update_child(meta_data, false)?;
        ws.mark_dirty(self.root_parent_id);
        ws.commit()
    }

    /// False for the root and for directories with children.
    #[instrument(level = "debug", skip(self), fields(path = %path))]
    pub fn can_delete(&self, path: &DrivePath) -> Result<bool, DriveError> {
        if path.is_root() {
            return Ok(false);
        }
        let (meta, _) = self.get_meta_data(path)?;
        match meta.directory_id() {
            Some(id) => {
                let mut ws = WorkingSet::new(self);
                Ok(ws.get(&id)?.listing.is_empty())
            }
            None => Ok(true),
        }
    }
}
