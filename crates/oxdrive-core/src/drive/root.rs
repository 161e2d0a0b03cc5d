//! Root bootstrap, layout policy and service routing.
//!
//! A [`RootHandler`] is constructed either for a new user, which creates the
//! root hierarchy, or for a returning user, which attaches to the hierarchy
//! named by a root parent id. Services are extra stores mounted under an
//! alias at the drive root; paths below an alias are served by the service's
//! own [`DirectoryListingHandler`].

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::error::DriveError;
use super::handler::{DirectoryListingHandler, ElementIds, RenameOutcome};
use super::path::{DirectoryId, DrivePath, Identity};
use crate::fs::meta_data::is_hidden_name;
use crate::fs::{DirectoryData, MetaData};
use crate::storage::{DiskStore, Storage};

/// How the top of the drive is organised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RootLayout {
    /// A single-user drive with an empty root.
    #[default]
    Local,
    /// Owner, Group and World areas created at the root.
    Network {
        #[serde(default)]
        world_writeable: bool,
    },
}

impl RootLayout {
    /// Directories created with a new root, parents first.
    pub fn default_directories(self) -> &'static [&'static str] {
        match self {
            RootLayout::Local => &[],
            RootLayout::Network { .. } => {
                &["Owner", "Group", "Group/Services", "World", "World/Services"]
            }
        }
    }

    fn is_read_only(self, path: &DrivePath) -> bool {
        match self {
            RootLayout::Local => false,
            RootLayout::Network { world_writeable } => match path.first() {
                Some("Group") => true,
                Some("World") => !world_writeable,
                _ => false,
            },
        }
    }

    /// Whether an entry may be created at `path`.
    pub fn can_add(self, path: &DrivePath) -> bool {
        match self {
            RootLayout::Local => !path.is_root(),
            RootLayout::Network { .. } => path.depth() >= 2 && !self.is_read_only(path),
        }
    }

    /// Whether the entry at `path` may be deleted.
    pub fn can_delete(self, path: &DrivePath) -> bool {
        match self {
            RootLayout::Local => !path.is_root(),
            RootLayout::Network { .. } => {
                path.depth() >= 2
                    && !self.is_read_only(path)
                    && *path != DrivePath::new("World/Services")
            }
        }
    }

    /// Whether the entry at `from` may be renamed or moved to `to`.
    pub fn can_rename(self, from: &DrivePath, to: &DrivePath) -> bool {
        match self {
            RootLayout::Local => !from.is_root() && !to.is_root(),
            RootLayout::Network { .. } => self.can_delete(from) && self.can_add(to),
        }
    }
}

pub struct RootHandler {
    default: DirectoryListingHandler,
    services: BTreeMap<String, DirectoryListingHandler>,
    layout: RootLayout,
    unique_user_id: Identity,
}

impl std::fmt::Debug for RootHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootHandler")
            .field("default", &self.default)
            .field("services", &self.services.keys().collect::<Vec<_>>())
            .field("layout", &self.layout)
            .field("unique_user_id", &self.unique_user_id)
            .finish()
    }
}

impl RootHandler {
    /// Create a new root (`root_parent_id` is `None`) or attach to an existing one.
    #[instrument(level = "info", skip(storage), fields(returning = root_parent_id.is_some()))]
    pub fn new(
        storage: Arc<dyn Storage>,
        unique_user_id: Identity,
        root_parent_id: Option<Identity>,
        layout: RootLayout,
    ) -> Result<Self, DriveError> {
        match root_parent_id {
            Some(id) => Self::init_root(storage, unique_user_id, id, layout),
            None => Self::create_root(storage, unique_user_id, layout),
        }
    }

    fn create_root(
        storage: Arc<dyn Storage>,
        unique_user_id: Identity,
        layout: RootLayout,
    ) -> Result<Self, DriveError> {
        let default = DirectoryListingHandler::create(storage)?;
        for dir in layout.default_directories() {
            default.add_element(&DrivePath::new(dir), MetaData::directory(*dir))?;
        }
        info!(layout = ?layout, "New drive root ready");
        Ok(RootHandler {
            default,
            services: BTreeMap::new(),
            layout,
            unique_user_id,
        })
    }

    fn init_root(
        storage: Arc<dyn Storage>,
        unique_user_id: Identity,
        root_parent_id: Identity,
        layout: RootLayout,
    ) -> Result<Self, DriveError> {
        let default = DirectoryListingHandler::open(storage, root_parent_id)?;
        info!(layout = ?layout, "Existing drive root ready");
        Ok(RootHandler {
            default,
            services: BTreeMap::new(),
            layout,
            unique_user_id,
        })
    }

    #[inline]
    pub fn drive_root_id(&self) -> DirectoryId {
        self.default.root_id()
    }

    #[inline]
    pub fn root_parent_id(&self) -> Identity {
        self.default.root_parent_id()
    }

    #[inline]
    pub fn unique_user_id(&self) -> Identity {
        self.unique_user_id
    }

    #[inline]
    pub fn layout(&self) -> RootLayout {
        self.layout
    }

    /// Registered service aliases with their root ids.
    pub fn services(&self) -> impl Iterator<Item = (&str, DirectoryId)> {
        self.services
            .iter()
            .map(|(alias, handler)| (alias.as_str(), handler.root_id()))
    }

    /// Alias of the service owning `path`, if any. The alias path itself counts.
    fn service_alias<'p>(&self, path: &'p DrivePath) -> Option<&'p str> {
        path.first().filter(|first| self.services.contains_key(*first))
    }

    fn is_service_root(&self, path: &DrivePath) -> bool {
        path.depth() == 1 && self.service_alias(path).is_some()
    }

    /// Handler serving the contents below `path`, and `path` relative to it.
    pub fn handler_for(&self, path: &DrivePath) -> (&DirectoryListingHandler, DrivePath) {
        match self.service_alias(path).and_then(|alias| self.services.get(alias)) {
            Some(handler) => (handler, path.strip_first()),
            None => (&self.default, path.clone()),
        }
    }

    /// Handler holding the entry for `path`. Service roots are entries of the
    /// drive root.
    fn entry_handler_for(&self, path: &DrivePath) -> (&DirectoryListingHandler, DrivePath) {
        if self.is_service_root(path) {
            (&self.default, path.clone())
        } else {
            self.handler_for(path)
        }
    }

    /// Store holding the content of the file at `path`.
    pub fn storage_for(&self, path: &DrivePath) -> Arc<dyn Storage> {
        Arc::clone(self.entry_handler_for(path).0.storage())
    }

    pub fn get_meta_data(&self, path: &DrivePath) -> Result<(MetaData, ElementIds), DriveError> {
        let (handler, relative) = self.entry_handler_for(path);
        handler.get_meta_data(&relative)
    }

    pub fn get_directory(&self, path: &DrivePath) -> Result<DirectoryData, DriveError> {
        let (handler, relative) = self.handler_for(path);
        handler.get_from_path(&relative)
    }

    #[instrument(level = "debug", skip(self, meta_data), fields(path = %path))]
    pub fn add_element(
        &self,
        path: &DrivePath,
        meta_data: MetaData,
    ) -> Result<ElementIds, DriveError> {
        if !self.layout.can_add(path) {
            return Err(DriveError::denied(path, "layout does not allow adding here"));
        }
        if self.is_service_root(path) {
            return Err(DriveError::already_exists(path));
        }
        let (handler, relative) = self.handler_for(path);
        handler.add_element(&relative, meta_data)
    }

    pub fn can_delete(&self, path: &DrivePath) -> Result<bool, DriveError> {
        if !self.layout.can_delete(path) || self.is_service_root(path) {
            return Ok(false);
        }
        let (handler, relative) = self.handler_for(path);
        handler.can_delete(&relative)
    }

    #[instrument(level = "debug", skip(self), fields(path = %path))]
    pub fn delete_element(&self, path: &DrivePath) -> Result<MetaData, DriveError> {
        if !self.layout.can_delete(path) {
            return Err(DriveError::denied(path, "layout does not allow deleting this entry"));
        }
        if self.is_service_root(path) {
            return Err(DriveError::denied(path, "services are removed with remove_service"));
        }
        let (handler, relative) = self.handler_for(path);
        handler.delete_element(&relative)
    }

    /// Rename or move within one store. Renaming a service root re-keys the service.
    #[instrument(level = "debug", skip(self), fields(from = %old_path, to = %new_path))]
    pub fn rename_element(
        &mut self,
        old_path: &DrivePath,
        new_path: &DrivePath,
    ) -> Result<RenameOutcome, DriveError> {
        if !self.layout.can_rename(old_path, new_path) {
            return Err(DriveError::denied(old_path, "layout does not allow this rename"));
        }
        if self.is_service_root(new_path) && old_path != new_path {
            return Err(DriveError::already_exists(new_path));
        }

        if self.is_service_root(old_path) {
            if new_path.depth() != 1 {
                return Err(DriveError::unsupported("move service root", old_path));
            }
            let outcome = self.default.rename_element(old_path, new_path)?;
            if let (Some(old_alias), Some(new_alias)) = (old_path.first(), new_path.first())
                && let Some(handler) = self.services.remove(old_alias)
            {
                info!(from = old_alias, to = new_alias, "Service renamed");
                self.services.insert(new_alias.to_string(), handler);
            }
            return Ok(outcome);
        }

        if self.service_alias(old_path) != self.service_alias(new_path) {
            return Err(DriveError::unsupported("move between stores", old_path));
        }
        let (handler, old_relative) = self.handler_for(old_path);
        let new_relative = self.handler_for(new_path).1;
        handler.rename_element(&old_relative, &new_relative)
    }

    /// Replace the entry called `meta_data.name` in the directory at `parent_path`.
    pub fn update_parent_directory_listing(
        &self,
        parent_path: &DrivePath,
        meta_data: MetaData,
    ) -> Result<(), DriveError> {
        let (handler, relative) = self.handler_for(parent_path);
        handler.update_parent_directory_listing(&relative, meta_data)
    }

    /// Replace the root's own entry.
    pub fn update_root_entry(&self, meta_data: MetaData) -> Result<(), DriveError> {
        self.default.update_root_entry(meta_data)
    }

    /// Mount `storage` under `alias` at the drive root.
    ///
    /// With `service_root_id` the existing service root is loaded; without it
    /// a new one is created. Re-adding a registered alias replaces it.
    /// Returns the service root id.
    #[instrument(level = "info", skip(self, storage), fields(alias = %alias))]
    pub fn add_service(
        &mut self,
        alias: &str,
        storage: Arc<dyn Storage>,
        service_root_id: Option<DirectoryId>,
    ) -> Result<DirectoryId, DriveError> {
        let path = DrivePath::new(alias);
        if matches!(self.layout, RootLayout::Network { .. }) {
            return Err(DriveError::unsupported("services on a network drive", &path));
        }
        if path.depth() != 1 || path.as_str() != alias || is_hidden_name(alias) {
            return Err(DriveError::invalid(&path, "service alias must be a single visible name"));
        }

        // A returning session re-attaches a service whose entry is already in place
        let re_adding = self.services.contains_key(alias)
            || match self.default.get_meta_data(&path) {
                Ok((entry, _)) => {
                    if service_root_id.is_none() || entry.directory_id() != service_root_id {
                        return Err(DriveError::already_exists(&path));
                    }
                    true
                }
                Err(e) if e.is_not_found() => false,
                Err(e) => return Err(e),
            };

        let parent_id = self.drive_root_id();
        let handler = match service_root_id {
            Some(id) => DirectoryListingHandler::open_detached(storage, id, parent_id)?,
            None => DirectoryListingHandler::create_detached(storage, parent_id)?,
        };
        let root_id = handler.root_id();

        if re_adding {
            let (mut entry, _) = self.default.get_meta_data(&path)?;
            entry.set_directory_id(root_id);
            entry.update_last_status_time();
            self.default
                .update_parent_directory_listing(&DrivePath::root(), entry)?;
            debug!("Replaced existing service");
        } else {
            let mut entry = MetaData::directory(alias);
            entry.set_directory_id(root_id);
            self.default.add_foreign_element(&path, entry)?;
        }

        self.services.insert(alias.to_string(), handler);
        info!(root = %root_id.short(), "Service added");
        Ok(root_id)
    }

    /// Open a disk store at `store_path` and mount it under `alias`.
    pub fn add_service_at(
        &mut self,
        alias: &str,
        store_path: &Path,
        service_root_id: Option<DirectoryId>,
    ) -> Result<DirectoryId, DriveError> {
        let store = DiskStore::open(store_path)?;
        self.add_service(alias, Arc::new(store), service_root_id)
    }

    /// Unmount the service under `alias` and delete its root listing.
    #[instrument(level = "info", skip(self), fields(alias = %alias))]
    pub fn remove_service(&mut self, alias: &str) -> Result<(), DriveError> {
        if matches!(self.layout, RootLayout::Network { .. }) {
            return Err(DriveError::unsupported(
                "services on a network drive",
                &DrivePath::new(alias),
            ));
        }
        let handler = self
            .services
            .remove(alias)
            .ok_or_else(|| DriveError::ServiceNotFound {
                alias: alias.to_string(),
            })?;

        if let Err(e) = self.default.remove_foreign_element(&DrivePath::new(alias)) {
            self.services.insert(alias.to_string(), handler);
            return Err(e);
        }
        if let Err(e) = handler.storage().delete(&handler.root_id()) {
            warn!(error = %e, "Failed to delete service root listing");
        }
        info!("Service removed");
        Ok(())
    }
}
