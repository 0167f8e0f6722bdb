//! Contract between the acquisition pipeline and the hierarchical file store.
//!
//! A store exposes named storages (one of them the default), folders nested
//! inside them and files with store-assigned uids. The pipeline only needs
//! lookups, single-segment folder creation and a single-file put.

use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::error::ImageError;

pub mod directory;
pub mod index;

pub use directory::{DirectoryStore, StorageRoot};
pub use index::{FileIndex, IndexEntry};

/// Selects a storage by uid; uid 0 (or nothing) means the default storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageSelector {
    #[default]
    Default,
    Uid(u32),
}

impl StorageSelector {
    pub fn from_wire(value: Option<u32>) -> Self {
        match value {
            None | Some(0) => Self::Default,
            Some(uid) => Self::Uid(uid),
        }
    }
}

impl fmt::Display for StorageSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("default"),
            Self::Uid(uid) => write!(f, "{uid}"),
        }
    }
}

/// Normalized slash-delimited folder path relative to a storage root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FolderPath {
    segments: Vec<String>,
}

impl FolderPath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Empty input and `/` both resolve to the storage root.
    pub fn parse(raw: &str) -> Result<Self, ImageError> {
        if raw.contains('\\') {
            return Err(ImageError::validation(format!(
                "Invalid folder path '{raw}'"
            )));
        }
        let mut segments = Vec::new();
        for segment in raw.split('/').map(str::trim).filter(|s| !s.is_empty()) {
            validate_file_name(segment)
                .map_err(|_| ImageError::validation(format!("Invalid folder path '{raw}'")))?;
            segments.push(segment.to_string());
        }
        Ok(Self { segments })
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn join(&self, name: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Self { segments }
    }

    /// Store identifier form: `/`, `/user_upload/`, `/a/b/`.
    pub fn identifier(&self) -> String {
        if self.segments.is_empty() {
            return "/".to_string();
        }
        format!("/{}/", self.segments.join("/"))
    }

    pub fn file_identifier(&self, filename: &str) -> String {
        format!("{}{filename}", self.identifier())
    }
}

impl fmt::Display for FolderPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identifier())
    }
}

/// Accepts only leaf names: no separators, no `.`/`..`, no control characters.
pub fn validate_file_name(name: &str) -> Result<&str, ImageError> {
    let trimmed = name.trim();
    let invalid = trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || trimmed.contains(['/', '\\'])
        || trimmed.chars().any(char::is_control);
    if invalid {
        return Err(ImageError::validation(format!("Invalid file name '{name}'")));
    }
    Ok(trimmed)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageInfo {
    pub uid: u32,
    pub name: String,
    pub is_default: bool,
    pub online: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderHandle {
    pub storage_uid: u32,
    pub path: FolderPath,
}

impl FolderHandle {
    pub fn combined_identifier(&self) -> String {
        format!("{}:{}", self.storage_uid, self.path.identifier())
    }
}

/// Where a commit lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageTarget {
    pub selector: StorageSelector,
    pub folder: FolderPath,
    pub filename: String,
}

impl StorageTarget {
    pub fn new(selector: StorageSelector, folder: &str, filename: &str) -> Result<Self, ImageError> {
        Ok(Self {
            selector,
            folder: FolderPath::parse(folder)?,
            filename: validate_file_name(filename)?.to_string(),
        })
    }
}

/// What to do when the target folder already holds a file with the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicationPolicy {
    /// Overwrite the existing file in place; its uid is kept.
    Replace,
    /// Store under the next free `<stem>_NN.<ext>` name.
    Rename,
    /// Fail with `StoreWrite`.
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommittedFile {
    pub uid: u64,
    pub storage_uid: u32,
    pub identifier: String,
    pub sha256: String,
    pub size: u64,
}

pub trait FileStore: Send + Sync {
    fn storages(&self) -> Result<Vec<StorageInfo>, ImageError>;

    fn storage(&self, uid: u32) -> Result<Option<StorageInfo>, ImageError> {
        Ok(self.storages()?.into_iter().find(|storage| storage.uid == uid))
    }

    fn default_storage(&self) -> Result<Option<StorageInfo>, ImageError> {
        Ok(self
            .storages()?
            .into_iter()
            .find(|storage| storage.is_default))
    }

    fn root_folder(&self, storage: &StorageInfo) -> Result<FolderHandle, ImageError>;

    /// Direct lookup; `None` when any segment is missing.
    fn folder(
        &self,
        storage: &StorageInfo,
        path: &FolderPath,
    ) -> Result<Option<FolderHandle>, ImageError>;

    fn subfolder(&self, parent: &FolderHandle, name: &str)
        -> Result<Option<FolderHandle>, ImageError>;

    /// Creates `name` under `parent`. A folder that already exists (for
    /// example created by a concurrent writer) is returned as-is.
    fn create_folder(&self, parent: &FolderHandle, name: &str) -> Result<FolderHandle, ImageError>;

    fn subfolders(&self, folder: &FolderHandle) -> Result<Vec<FolderHandle>, ImageError>;

    /// Copies `source` into `folder`. The uid is only returned once the bytes
    /// are durably in place.
    fn put_file(
        &self,
        source: &Path,
        folder: &FolderHandle,
        filename: &str,
        policy: DuplicationPolicy,
    ) -> Result<CommittedFile, ImageError>;
}

#[cfg(test)]
mod tests {
    use super::{validate_file_name, FolderPath, StorageSelector, StorageTarget};

    #[test]
    fn folder_path_normalizes_slashes() -> anyhow::Result<()> {
        let path = FolderPath::parse("user_upload/")?;
        assert_eq!(path.segments(), ["user_upload".to_string()]);
        assert_eq!(path.identifier(), "/user_upload/");

        let nested = FolderPath::parse("//a/ b /c//")?;
        assert_eq!(nested.depth(), 3);
        assert_eq!(nested.identifier(), "/a/b/c/");
        assert_eq!(nested.file_identifier("x.png"), "/a/b/c/x.png");
        Ok(())
    }

    #[test]
    fn empty_and_slash_are_root() -> anyhow::Result<()> {
        assert!(FolderPath::parse("")?.is_root());
        assert!(FolderPath::parse("/")?.is_root());
        assert_eq!(FolderPath::root().identifier(), "/");
        Ok(())
    }

    #[test]
    fn traversal_segments_are_rejected() {
        assert!(FolderPath::parse("a/../b").is_err());
        assert!(FolderPath::parse("./a").is_err());
        assert!(FolderPath::parse("a\\b").is_err());
    }

    #[test]
    fn file_names_must_be_leaves() {
        assert_eq!(validate_file_name(" bike.png ").ok(), Some("bike.png"));
        assert!(validate_file_name("").is_err());
        assert!(validate_file_name("..").is_err());
        assert!(validate_file_name("a/b.png").is_err());
        assert!(validate_file_name("a\\b.png").is_err());
    }

    #[test]
    fn zero_selector_means_default() -> anyhow::Result<()> {
        assert_eq!(StorageSelector::from_wire(None), StorageSelector::Default);
        assert_eq!(StorageSelector::from_wire(Some(0)), StorageSelector::Default);
        assert_eq!(StorageSelector::from_wire(Some(7)), StorageSelector::Uid(7));

        let target = StorageTarget::new(StorageSelector::Uid(2), "a/b", "c.png")?;
        assert_eq!(target.folder.identifier(), "/a/b/");
        assert_eq!(target.filename, "c.png");
        Ok(())
    }
}
