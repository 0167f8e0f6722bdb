//! Download → stage → resolve → commit, with scratch cleanup on every path.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use artgen_contracts::storage::{
    CommittedFile, DuplicationPolicy, FileStore, FolderHandle, FolderPath, StorageInfo,
    StorageSelector, StorageTarget,
};
use artgen_contracts::ImageError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Serialize;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::fetch::{FetchedImage, ImageFetcher};

/// Deepest folder level reported by [`AcquisitionPipeline::list_folders`].
pub const MAX_FOLDER_DEPTH: usize = 8;

const SCRATCH_DIR_PREFIX: &str = "commit-";
const FALLBACK_MIME: &str = "image/png";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineImage {
    pub data_uri: String,
    pub source_url: String,
    pub mime_type: String,
    pub byte_len: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderEntry {
    pub name: String,
    pub path: String,
    pub full_path: String,
}

/// Downloaded bytes parked in a scratch directory unique to one commit call.
struct StagedImage {
    dir: TempDir,
    path: PathBuf,
}

impl StagedImage {
    fn write(scratch_root: &Path, filename: &str, bytes: &[u8]) -> Result<Self, ImageError> {
        fs::create_dir_all(scratch_root).map_err(|err| {
            ImageError::unexpected(format!(
                "failed to prepare scratch area {}: {err}",
                scratch_root.display()
            ))
        })?;
        let dir = tempfile::Builder::new()
            .prefix(SCRATCH_DIR_PREFIX)
            .tempdir_in(scratch_root)
            .map_err(|err| ImageError::unexpected(format!("failed to create scratch dir: {err}")))?;
        let path = dir.path().join(filename);
        fs::write(&path, bytes).map_err(|err| {
            ImageError::unexpected(format!("failed to stage {}: {err}", path.display()))
        })?;
        Ok(Self { dir, path })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn discard(self) {
        let location = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => debug!(scratch = %location.display(), "scratch removed"),
            Err(err) => warn!(
                scratch = %location.display(),
                error = %err,
                "failed to remove scratch directory"
            ),
        }
    }
}

pub struct AcquisitionPipeline {
    fetcher: Arc<dyn ImageFetcher>,
    store: Arc<dyn FileStore>,
    scratch_root: PathBuf,
}

impl AcquisitionPipeline {
    pub fn new(
        fetcher: Arc<dyn ImageFetcher>,
        store: Arc<dyn FileStore>,
        scratch_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            fetcher,
            store,
            scratch_root: scratch_root.into(),
        }
    }

    pub fn scratch_root(&self) -> &Path {
        &self.scratch_root
    }

    /// Downloads `source_url` and returns it as a data URI. Nothing is stored
    /// or cached; a later commit fetches the URL again.
    pub fn preview(&self, source_url: &str) -> Result<InlineImage, ImageError> {
        let fetched = self.fetcher.fetch(source_url)?;
        let mime_type = detect_mime(&fetched);
        Ok(InlineImage {
            data_uri: format!("data:{mime_type};base64,{}", BASE64.encode(&fetched.bytes)),
            source_url: source_url.to_string(),
            mime_type,
            byte_len: fetched.bytes.len(),
        })
    }

    /// Downloads `source_url` and stores it at `target`, replacing a file of
    /// the same name. The scratch copy is gone when this returns.
    pub fn commit(
        &self,
        source_url: &str,
        target: &StorageTarget,
    ) -> Result<CommittedFile, ImageError> {
        let outcome = self.fetch_and_store(source_url, target);
        match &outcome {
            Ok(file) => info!(
                file_uid = file.uid,
                storage_uid = file.storage_uid,
                identifier = %file.identifier,
                size = file.size,
                "image committed"
            ),
            Err(err) => warn!(
                storage = %target.selector,
                folder = %target.folder,
                filename = %target.filename,
                kind = %err.kind(),
                error = %err,
                "image commit failed"
            ),
        }
        outcome
    }

    fn fetch_and_store(
        &self,
        source_url: &str,
        target: &StorageTarget,
    ) -> Result<CommittedFile, ImageError> {
        let fetched = self.fetcher.fetch(source_url)?;
        let staged = StagedImage::write(&self.scratch_root, &target.filename, &fetched.bytes)?;
        let outcome = self.store_staged(&staged, target);
        staged.discard();
        outcome
    }

    fn store_staged(
        &self,
        staged: &StagedImage,
        target: &StorageTarget,
    ) -> Result<CommittedFile, ImageError> {
        let storage = self.resolve_storage(target.selector)?;
        let folder = self.resolve_folder(&storage, &target.folder)?;
        self.store.put_file(
            staged.path(),
            &folder,
            &target.filename,
            DuplicationPolicy::Replace,
        )
    }

    /// Offline storages are treated as missing so nothing is written to them.
    pub fn resolve_storage(&self, selector: StorageSelector) -> Result<StorageInfo, ImageError> {
        let storage = match selector {
            StorageSelector::Default => self
                .store
                .default_storage()?
                .ok_or_else(|| ImageError::StorageNotFound("No default storage found".to_string()))?,
            StorageSelector::Uid(uid) => self.store.storage(uid)?.ok_or_else(|| {
                ImageError::StorageNotFound(format!("Storage with UID {uid} not found"))
            })?,
        };
        if !storage.online {
            return Err(ImageError::StorageNotFound(format!(
                "Storage with UID {} is offline",
                storage.uid
            )));
        }
        Ok(storage)
    }

    /// Direct lookup first, then a walk from the root that creates whatever
    /// segment is missing. Existing segments are reused.
    pub fn resolve_folder(
        &self,
        storage: &StorageInfo,
        path: &FolderPath,
    ) -> Result<FolderHandle, ImageError> {
        if path.is_root() {
            return self.store.root_folder(storage);
        }
        if let Some(folder) = self.store.folder(storage, path)? {
            return Ok(folder);
        }

        let mut current = self.store.root_folder(storage)?;
        for segment in path.segments() {
            current = match self.store.subfolder(&current, segment)? {
                Some(existing) => existing,
                None => {
                    debug!(
                        storage_uid = storage.uid,
                        parent = %current.path,
                        folder = %segment,
                        "creating missing folder"
                    );
                    self.store.create_folder(&current, segment)?
                }
            };
        }
        Ok(current)
    }

    pub fn list_storages(&self) -> Result<Vec<StorageInfo>, ImageError> {
        Ok(self
            .store
            .storages()?
            .into_iter()
            .filter(|storage| storage.online)
            .collect())
    }

    /// All folders of a storage, depth-first, at most [`MAX_FOLDER_DEPTH`]
    /// levels below the root.
    pub fn list_folders(&self, selector: StorageSelector) -> Result<Vec<FolderEntry>, ImageError> {
        let storage = self.resolve_storage(selector)?;
        let root = self.store.root_folder(&storage)?;
        let mut entries = Vec::new();
        self.collect_folders(&root, 1, &mut entries)?;
        Ok(entries)
    }

    fn collect_folders(
        &self,
        folder: &FolderHandle,
        depth: usize,
        out: &mut Vec<FolderEntry>,
    ) -> Result<(), ImageError> {
        if depth > MAX_FOLDER_DEPTH {
            return Ok(());
        }
        for child in self.store.subfolders(folder)? {
            out.push(FolderEntry {
                name: child.path.name().unwrap_or_default().to_string(),
                path: child.path.identifier().trim_start_matches('/').to_string(),
                full_path: child.combined_identifier(),
            });
            self.collect_folders(&child, depth + 1, out)?;
        }
        Ok(())
    }
}

fn detect_mime(fetched: &FetchedImage) -> String {
    let declared = fetched
        .mime_type
        .as_deref()
        .and_then(|value| value.split(';').next())
        .map(|value| value.trim().to_ascii_lowercase())
        .filter(|value| value.starts_with("image/"));
    if let Some(mime) = declared {
        return mime;
    }
    image::guess_format(&fetched.bytes)
        .map(|format| format.to_mime_type().to_string())
        .unwrap_or_else(|_| FALLBACK_MIME.to_string())
}
