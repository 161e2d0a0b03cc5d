//! Directory listings: the serialized child set of one directory.
//!
//! A listing is addressed in storage by its `directory_id`. Children are kept
//! sorted by name, which makes both iteration order and the serialized form
//! canonical: two listings holding the same children serialize identically no
//! matter the insertion order.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

use super::meta_data::{MetaData, is_hidden_name};
use crate::drive::path::{DirectoryId, Identity};

/// Format version written into every serialized listing.
pub const LISTING_FORMAT_VERSION: u32 = 1;

/// Errors from in-memory listing operations and (de)serialization.
#[derive(Error, Debug)]
pub enum ListingError {
    #[error("'{name}' already exists in directory {}", .directory_id.short())]
    AlreadyExists {
        name: String,
        directory_id: Box<DirectoryId>,
    },

    #[error("'{name}' not found in directory {}", .directory_id.short())]
    NotFound {
        name: String,
        directory_id: Box<DirectoryId>,
    },

    /// The rename target name is taken. Carries a copy of the colliding entry.
    #[error("Cannot rename to '{}': an entry with that name exists", .existing.name)]
    RenameTargetExists { existing: Box<MetaData> },

    #[error("Listing serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unsupported listing format version {found} (expected {LISTING_FORMAT_VERSION})")]
    UnsupportedVersion { found: u32 },

    #[error("Listing stored under {} claims id {}", .expected.short(), .found.short())]
    IdentityMismatch {
        expected: Box<DirectoryId>,
        found: Box<DirectoryId>,
    },

    #[error("Entry '{name}' has a payload that does not match its type")]
    InconsistentEntry { name: String },
}

/// The ordered children of one directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryListing {
    directory_id: DirectoryId,
    children: Vec<MetaData>,
    #[serde(skip)]
    cursor: usize,
}

/// Equality ignores the iteration cursor.
impl PartialEq for DirectoryListing {
    fn eq(&self, other: &Self) -> bool {
        self.directory_id == other.directory_id && self.children == other.children
    }
}

impl Eq for DirectoryListing {}

#[derive(Serialize)]
struct ListingRecordRef<'a> {
    version: u32,
    listing: &'a DirectoryListing,
}

#[derive(Deserialize)]
struct ListingRecord {
    version: u32,
    listing: DirectoryListing,
}

impl DirectoryListing {
    pub fn new(directory_id: DirectoryId) -> Self {
        DirectoryListing {
            directory_id,
            children: Vec::new(),
            cursor: 0,
        }
    }

    #[inline]
    pub fn directory_id(&self) -> DirectoryId {
        self.directory_id
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// All children in name order.
    pub fn children(&self) -> &[MetaData] {
        &self.children
    }

    fn position(&self, name: &str) -> Result<usize, usize> {
        self.children
            .binary_search_by(|child| child.name.as_str().cmp(name))
    }

    fn not_found(&self, name: &str) -> ListingError {
        ListingError::NotFound {
            name: name.to_string(),
            directory_id: Box::new(self.directory_id),
        }
    }

    pub fn has_child(&self, name: &str) -> bool {
        self.position(name).is_ok()
    }

    pub fn get_child(&self, name: &str) -> Result<&MetaData, ListingError> {
        self.position(name)
            .map(|index| &self.children[index])
            .map_err(|_| self.not_found(name))
    }

    /// Insert a new child, keeping name order.
    pub fn add_child(&mut self, meta_data: MetaData) -> Result<(), ListingError> {
        match self.position(&meta_data.name) {
            Ok(_) => Err(ListingError::AlreadyExists {
                name: meta_data.name,
                directory_id: Box::new(self.directory_id),
            }),
            Err(index) => {
                trace!(name = %meta_data.name, "Adding child");
                self.children.insert(index, meta_data);
                self.reset_children_iterator();
                Ok(())
            }
        }
    }

    /// Remove the child called `name` and return it.
    pub fn remove_child(&mut self, name: &str) -> Result<MetaData, ListingError> {
        let index = self.position(name).map_err(|_| self.not_found(name))?;
        let removed = self.children.remove(index);
        self.reset_children_iterator();
        Ok(removed)
    }

    /// Replace the stored entry with the same name.
    ///
    /// `reset_cursor` decides whether the change counts as structural.
    pub fn update_child(
        &mut self,
        meta_data: MetaData,
        reset_cursor: bool,
    ) -> Result<(), ListingError> {
        let index = self
            .position(&meta_data.name)
            .map_err(|_| self.not_found(&meta_data.name))?;
        self.children[index] = meta_data;
        if reset_cursor {
            self.reset_children_iterator();
        }
        Ok(())
    }

    /// Rename a child in place.
    ///
    /// Fails with [`ListingError::RenameTargetExists`] (carrying the colliding
    /// entry) if `new_name` is taken, or [`ListingError::NotFound`] if
    /// `old_name` is absent. Returns the renamed entry.
    pub fn rename_child(
        &mut self,
        old_name: &str,
        new_name: &str,
    ) -> Result<&MetaData, ListingError> {
        if let Ok(existing) = self.position(new_name) {
            return Err(ListingError::RenameTargetExists {
                existing: Box::new(self.children[existing].clone()),
            });
        }
        let index = self.position(old_name).map_err(|_| self.not_found(old_name))?;
        let mut entry = self.children.remove(index);
        entry.name = new_name.to_string();
        let insert_at = self.position(new_name).unwrap_or_else(|at| at);
        self.children.insert(insert_at, entry);
        self.reset_children_iterator();
        Ok(&self.children[insert_at])
    }

    /// Next child in name order, advancing the cursor. `None` at the end.
    pub fn next_child(&mut self) -> Option<MetaData> {
        let child = self.children.get(self.cursor).cloned()?;
        self.cursor += 1;
        Some(child)
    }

    pub fn reset_children_iterator(&mut self) {
        self.cursor = 0;
    }

    /// Names of children that carry the hidden-file extension.
    pub fn hidden_child_names(&self) -> Vec<String> {
        self.children
            .iter()
            .filter(|child| is_hidden_name(&child.name))
            .map(|child| child.name.clone())
            .collect()
    }

    /// Children without the hidden-file extension, in name order.
    pub fn visible_children(&self) -> impl Iterator<Item = &MetaData> {
        self.children.iter().filter(|child| !is_hidden_name(&child.name))
    }

    pub fn serialise(&self) -> Result<Vec<u8>, ListingError> {
        let record = ListingRecordRef {
            version: LISTING_FORMAT_VERSION,
            listing: self,
        };
        Ok(serde_json::to_vec(&record)?)
    }

    /// Parse bytes produced by [`serialise`](Self::serialise).
    ///
    /// Rejects unknown versions, unsorted or duplicate names, and entries
    /// whose payload contradicts their type.
    pub fn parse(bytes: &[u8]) -> Result<Self, ListingError> {
        let record: ListingRecord = serde_json::from_slice(bytes)?;
        if record.version != LISTING_FORMAT_VERSION {
            return Err(ListingError::UnsupportedVersion {
                found: record.version,
            });
        }
        record.listing.validated()
    }

    fn validated(self) -> Result<Self, ListingError> {
        if let Some(child) = self.children.iter().find(|child| !child.is_consistent()) {
            return Err(ListingError::InconsistentEntry {
                name: child.name.clone(),
            });
        }
        if let Some(pair) = self
            .children
            .windows(2)
            .find(|pair| pair[0].name >= pair[1].name)
        {
            return Err(ListingError::AlreadyExists {
                name: pair[1].name.clone(),
                directory_id: Box::new(self.directory_id),
            });
        }
        Ok(self)
    }
}

/// A listing together with the id of the directory that contains it.
///
/// This is the unit stored under a directory's id, so a loaded directory
/// always knows its parent without walking the tree again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryData {
    pub parent_id: Identity,
    pub listing: DirectoryListing,
}

#[derive(Serialize)]
struct StoredDirectoryRef<'a> {
    version: u32,
    parent_id: &'a Identity,
    listing: &'a DirectoryListing,
}

#[derive(Deserialize)]
struct StoredDirectory {
    version: u32,
    parent_id: Identity,
    listing: DirectoryListing,
}

impl DirectoryData {
    pub fn new(parent_id: Identity, listing: DirectoryListing) -> Self {
        DirectoryData { parent_id, listing }
    }

    #[inline]
    pub fn directory_id(&self) -> DirectoryId {
        self.listing.directory_id()
    }

    pub fn serialise(&self) -> Result<Vec<u8>, ListingError> {
        let stored = StoredDirectoryRef {
            version: LISTING_FORMAT_VERSION,
            parent_id: &self.parent_id,
            listing: &self.listing,
        };
        Ok(serde_json::to_vec(&stored)?)
    }

    /// Parse a stored directory and check it is the one stored under `expected_id`.
    pub fn parse(bytes: &[u8], expected_id: &DirectoryId) -> Result<Self, ListingError> {
        let stored: StoredDirectory = serde_json::from_slice(bytes)?;
        if stored.version != LISTING_FORMAT_VERSION {
            return Err(ListingError::UnsupportedVersion {
                found: stored.version,
            });
        }
        let listing = stored.listing.validated()?;
        if listing.directory_id() != *expected_id {
            return Err(ListingError::IdentityMismatch {
                expected: Box::new(*expected_id),
                found: Box::new(listing.directory_id()),
            });
        }
        Ok(DirectoryData {
            parent_id: stored.parent_id,
            listing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::FileType;

    fn listing_with(names: &[&str]) -> DirectoryListing {
        let mut listing = DirectoryListing::new(Identity::random());
        for name in names {
            listing.add_child(MetaData::file(*name)).unwrap();
        }
        listing
    }

    fn drain_names(listing: &mut DirectoryListing) -> Vec<String> {
        std::iter::from_fn(|| listing.next_child()).map(|m| m.name).collect()
    }

    #[test]
    fn test_add_keeps_name_order() {
        let mut listing = listing_with(&["c", "a", "b"]);
        assert_eq!(drain_names(&mut listing), vec!["a", "b", "c"]);
        assert!(listing.next_child().is_none());
    }

    #[test]
    fn test_duplicate_add_fails() {
        let mut listing = listing_with(&["a"]);
        let err = listing.add_child(MetaData::directory("a")).unwrap_err();
        assert!(matches!(err, ListingError::AlreadyExists { ref name, .. } if name == "a"));
        assert_eq!(listing.len(), 1);
    }

    #[test]
    fn test_names_are_case_sensitive() {
        let mut listing = listing_with(&["a"]);
        listing.add_child(MetaData::file("A")).unwrap();
        assert_eq!(listing.len(), 2);
    }

    #[test]
    fn test_remove_and_get_missing() {
        let mut listing = listing_with(&["a", "b"]);
        let removed = listing.remove_child("a").unwrap();
        assert_eq!(removed.name, "a");
        assert!(matches!(listing.remove_child("a"), Err(ListingError::NotFound { .. })));
        assert!(matches!(listing.get_child("a"), Err(ListingError::NotFound { .. })));
        assert!(listing.has_child("b"));
    }

    #[test]
    fn test_update_child_replaces() {
        let mut listing = listing_with(&["a"]);
        let mut updated = listing.get_child("a").unwrap().clone();
        updated.update_size(99);
        listing.update_child(updated, false).unwrap();
        assert_eq!(listing.get_child("a").unwrap().size, 99);

        let missing = MetaData::file("zz");
        assert!(matches!(
            listing.update_child(missing, true),
            Err(ListingError::NotFound { .. })
        ));
    }

    #[test]
    fn test_cursor_reset_rules() {
        let mut listing = listing_with(&["a", "b", "c"]);
        assert_eq!(listing.next_child().unwrap().name, "a");

        // Queries and failed mutations keep the cursor
        assert!(listing.has_child("c"));
        let _ = listing.get_child("b");
        let _ = listing.add_child(MetaData::file("a"));
        let _ = listing.remove_child("nope");
        assert_eq!(listing.next_child().unwrap().name, "b");

        // Cosmetic update keeps it, structural update resets it
        let b = listing.get_child("b").unwrap().clone();
        listing.update_child(b.clone(), false).unwrap();
        assert_eq!(listing.next_child().unwrap().name, "c");
        listing.update_child(b, true).unwrap();
        assert_eq!(listing.next_child().unwrap().name, "a");

        // Successful add resets
        listing.next_child();
        listing.add_child(MetaData::file("d")).unwrap();
        assert_eq!(listing.next_child().unwrap().name, "a");

        // Rename resets
        listing.next_child();
        listing.rename_child("d", "0").unwrap();
        assert_eq!(listing.next_child().unwrap().name, "0");

        // Remove resets
        listing.next_child();
        listing.remove_child("0").unwrap();
        assert_eq!(listing.next_child().unwrap().name, "a");
    }

    #[test]
    fn test_rename_collision_reports_existing() {
        let mut listing = DirectoryListing::new(Identity::random());
        listing.add_child(MetaData::file("a")).unwrap();
        let mut b = MetaData::file("b");
        b.update_size(7);
        listing.add_child(b.clone()).unwrap();

        match listing.rename_child("a", "b") {
            Err(ListingError::RenameTargetExists { existing }) => assert_eq!(*existing, b),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(matches!(
            listing.rename_child("missing", "c"),
            Err(ListingError::NotFound { .. })
        ));
        // Nothing changed
        assert_eq!(listing.get_child("b").unwrap(), &b);
        assert!(listing.has_child("a"));
    }

    #[test]
    fn test_rename_reorders() {
        let mut listing = listing_with(&["a", "m"]);
        let renamed = listing.rename_child("a", "z").unwrap().clone();
        assert_eq!(renamed.name, "z");
        assert_eq!(drain_names(&mut listing), vec!["m", "z"]);
    }

    #[test]
    fn test_hidden_child_names() {
        let listing = listing_with(&["a.ms_hidden", "b.txt", "c.ms_hidden"]);
        assert_eq!(listing.hidden_child_names(), vec!["a.ms_hidden", "c.ms_hidden"]);
        let visible: Vec<_> = listing.visible_children().map(|m| m.name.as_str()).collect();
        assert_eq!(visible, vec!["b.txt"]);
    }

    #[test]
    fn test_serialise_is_canonical() {
        let id = Identity::random();
        let a = MetaData::file("a");
        let b = MetaData::directory("b");

        let mut first = DirectoryListing::new(id);
        first.add_child(a.clone()).unwrap();
        first.add_child(b.clone()).unwrap();
        let mut second = DirectoryListing::new(id);
        second.add_child(b).unwrap();
        second.add_child(a).unwrap();

        assert_eq!(first.serialise().unwrap(), second.serialise().unwrap());
    }

    #[test]
    fn test_parse_roundtrip_empty_and_full() {
        let empty = DirectoryListing::new(Identity::random());
        assert_eq!(DirectoryListing::parse(&empty.serialise().unwrap()).unwrap(), empty);

        let mut full = listing_with(&["x", "y"]);
        let mut dir = MetaData::directory("sub");
        dir.notes.push("first".into());
        full.add_child(dir).unwrap();
        full.add_child(MetaData::symlink("link", "/x")).unwrap();
        full.add_child(MetaData::new(FileType::StatusError)).unwrap();
        let parsed = DirectoryListing::parse(&full.serialise().unwrap()).unwrap();
        assert_eq!(parsed, full);
        assert_eq!(parsed.children(), full.children());
    }

    #[test]
    fn test_parse_rejects_corrupt_input() {
        let bytes = listing_with(&["a"]).serialise().unwrap();
        assert!(matches!(
            DirectoryListing::parse(&bytes[..bytes.len() / 2]),
            Err(ListingError::Serialization(_))
        ));
        assert!(matches!(
            DirectoryListing::parse(b"\x00\x01garbage"),
            Err(ListingError::Serialization(_))
        ));
    }

    #[test]
    fn test_parse_rejects_unknown_version() {
        let bytes = listing_with(&["a"]).serialise().unwrap();
        let mut value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        value["version"] = serde_json::json!(99);
        let tampered = serde_json::to_vec(&value).unwrap();
        assert!(matches!(
            DirectoryListing::parse(&tampered),
            Err(ListingError::UnsupportedVersion { found: 99 })
        ));
    }

    #[test]
    fn test_parse_rejects_duplicate_names() {
        let bytes = listing_with(&["a", "b"]).serialise().unwrap();
        let mut value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        value["listing"]["children"][1]["name"] = serde_json::json!("a");
        let tampered = serde_json::to_vec(&value).unwrap();
        assert!(matches!(
            DirectoryListing::parse(&tampered),
            Err(ListingError::AlreadyExists { .. })
        ));
    }

    #[test]
    fn test_directory_data_checks_identity() {
        let data =
            DirectoryData::new(Identity::random(), DirectoryListing::new(Identity::random()));
        let bytes = data.serialise().unwrap();
        assert_eq!(DirectoryData::parse(&bytes, &data.directory_id()).unwrap(), data);
        assert!(matches!(
            DirectoryData::parse(&bytes, &Identity::random()),
            Err(ListingError::IdentityMismatch { .. })
        ));
    }
}
