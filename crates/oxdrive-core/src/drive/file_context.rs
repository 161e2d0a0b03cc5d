use crate::crypto::SelfEncryptor;
use crate::drive::path::{DirectoryId, DrivePath};
use crate::fs::{FileType, MetaData};
use crate::storage::Storage;

/// State of one open file handle.
///
/// The encryptor is created on first content access and dropped on release.
#[derive(Debug)]
pub struct FileContext {
    pub meta_data: MetaData,
    /// Where the entry was opened or added; `None` until then.
    pub path: Option<DrivePath>,
    pub self_encryptor: Option<SelfEncryptor<dyn Storage>>,
    pub content_changed: bool,
    pub grandparent_directory_id: Option<DirectoryId>,
    pub parent_directory_id: Option<DirectoryId>,
}

impl FileContext {
    /// Context for a new, not yet added entry.
    pub fn new(name: impl Into<String>, is_directory: bool) -> Self {
        let file_type = if is_directory {
            FileType::DirectoryFile
        } else {
            FileType::RegularFile
        };
        Self::from_meta_data(MetaData::with_name(name, file_type))
    }

    pub fn from_meta_data(meta_data: MetaData) -> Self {
        FileContext {
            meta_data,
            path: None,
            self_encryptor: None,
            content_changed: false,
            grandparent_directory_id: None,
            parent_directory_id: None,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.meta_data.is_directory()
    }
}
