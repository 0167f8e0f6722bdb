//! Directory-backed reference implementation of [`FileStore`].
//!
//! Each configured storage maps onto a directory; folders are directories and
//! files are written next to a hidden temp file and renamed into place. Uids
//! come from a shared [`FileIndex`].

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Deserialize;
use sha2::{Digest, Sha256};

use super::{
    validate_file_name, CommittedFile, DuplicationPolicy, FileIndex, FileStore, FolderHandle,
    FolderPath, StorageInfo,
};
use crate::error::ImageError;

const UPLOAD_TEMP_PREFIX: &str = ".artgen-upload-";
const MAX_RENAME_ATTEMPTS: u32 = 99;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StorageRoot {
    pub uid: u32,
    pub name: String,
    pub path: PathBuf,
    #[serde(default)]
    pub default: bool,
    #[serde(default = "default_online")]
    pub online: bool,
}

fn default_online() -> bool {
    true
}

#[derive(Debug)]
pub struct DirectoryStore {
    roots: Vec<StorageRoot>,
    index: Mutex<FileIndex>,
}

impl DirectoryStore {
    pub fn new(roots: Vec<StorageRoot>, index_path: impl Into<PathBuf>) -> Self {
        Self {
            roots,
            index: Mutex::new(FileIndex::new(index_path)),
        }
    }

    fn root(&self, storage_uid: u32) -> Result<&StorageRoot, ImageError> {
        self.roots
            .iter()
            .find(|root| root.uid == storage_uid)
            .ok_or_else(|| {
                ImageError::StorageNotFound(format!("Storage with UID {storage_uid} not found"))
            })
    }

    fn dir_for(&self, storage_uid: u32, path: &FolderPath) -> Result<PathBuf, ImageError> {
        let mut dir = self.root(storage_uid)?.path.clone();
        for segment in path.segments() {
            dir.push(segment);
        }
        Ok(dir)
    }

    fn record(
        &self,
        storage_uid: u32,
        identifier: &str,
        sha256: &str,
        size: u64,
    ) -> Result<u64, ImageError> {
        let mut index = self
            .index
            .lock()
            .map_err(|_| ImageError::store_write("file index lock poisoned"))?;
        index
            .record(storage_uid, identifier, sha256, size)
            .map_err(|err| ImageError::store_write(format!("failed to index {identifier}: {err:#}")))
    }
}

impl FileStore for DirectoryStore {
    fn storages(&self) -> Result<Vec<StorageInfo>, ImageError> {
        Ok(self
            .roots
            .iter()
            .map(|root| StorageInfo {
                uid: root.uid,
                name: root.name.clone(),
                is_default: root.default,
                online: root.online && root.path.is_dir(),
            })
            .collect())
    }

    fn root_folder(&self, storage: &StorageInfo) -> Result<FolderHandle, ImageError> {
        self.root(storage.uid)?;
        Ok(FolderHandle {
            storage_uid: storage.uid,
            path: FolderPath::root(),
        })
    }

    fn folder(
        &self,
        storage: &StorageInfo,
        path: &FolderPath,
    ) -> Result<Option<FolderHandle>, ImageError> {
        let dir = self.dir_for(storage.uid, path)?;
        Ok(dir.is_dir().then(|| FolderHandle {
            storage_uid: storage.uid,
            path: path.clone(),
        }))
    }

    fn subfolder(
        &self,
        parent: &FolderHandle,
        name: &str,
    ) -> Result<Option<FolderHandle>, ImageError> {
        let name = validate_file_name(name)?;
        let path = parent.path.join(name);
        let dir = self.dir_for(parent.storage_uid, &path)?;
        Ok(dir.is_dir().then(|| FolderHandle {
            storage_uid: parent.storage_uid,
            path,
        }))
    }

    fn create_folder(&self, parent: &FolderHandle, name: &str) -> Result<FolderHandle, ImageError> {
        let name = validate_file_name(name)?;
        let path = parent.path.join(name);
        let dir = self.dir_for(parent.storage_uid, &path)?;
        match fs::create_dir(&dir) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::AlreadyExists && dir.is_dir() => {}
            Err(err) => {
                return Err(ImageError::store_write(format!(
                    "failed to create folder {}: {err}",
                    path.identifier()
                )))
            }
        }
        Ok(FolderHandle {
            storage_uid: parent.storage_uid,
            path,
        })
    }

    fn subfolders(&self, folder: &FolderHandle) -> Result<Vec<FolderHandle>, ImageError> {
        let dir = self.dir_for(folder.storage_uid, &folder.path)?;
        let entries = fs::read_dir(&dir).map_err(|err| {
            ImageError::unexpected(format!("failed to list {}: {err}", folder.path))
        })?;
        let mut names = Vec::new();
        for entry in entries.flatten() {
            let is_dir = entry.file_type().map(|kind| kind.is_dir()).unwrap_or(false);
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if is_dir && !name.starts_with('.') {
                names.push(name);
            }
        }
        names.sort();
        Ok(names
            .into_iter()
            .map(|name| FolderHandle {
                storage_uid: folder.storage_uid,
                path: folder.path.join(&name),
            })
            .collect())
    }

    fn put_file(
        &self,
        source: &Path,
        folder: &FolderHandle,
        filename: &str,
        policy: DuplicationPolicy,
    ) -> Result<CommittedFile, ImageError> {
        let filename = validate_file_name(filename)?;
        let dir = self.dir_for(folder.storage_uid, &folder.path)?;
        if !dir.is_dir() {
            return Err(ImageError::store_write(format!(
                "Target folder {} does not exist",
                folder.combined_identifier()
            )));
        }

        let bytes = fs::read(source).map_err(|err| {
            ImageError::store_write(format!("failed reading {}: {err}", source.display()))
        })?;
        let sha256 = hex::encode(Sha256::digest(&bytes));
        let write_err = |err: std::io::Error| {
            ImageError::store_write(format!("failed writing into {}: {err}", folder.path))
        };
        let mut temp = tempfile::Builder::new()
            .prefix(UPLOAD_TEMP_PREFIX)
            .tempfile_in(&dir)
            .map_err(write_err)?;
        temp.write_all(&bytes).map_err(write_err)?;
        temp.as_file().sync_all().map_err(write_err)?;

        let stored_name = match policy {
            DuplicationPolicy::Replace => {
                temp.persist(dir.join(filename))
                    .map_err(|err| write_err(err.error))?;
                filename.to_string()
            }
            DuplicationPolicy::Cancel => {
                temp.persist_noclobber(dir.join(filename)).map_err(|err| {
                    if err.error.kind() == ErrorKind::AlreadyExists {
                        ImageError::store_write(format!(
                            "File {} already exists",
                            folder.path.file_identifier(filename)
                        ))
                    } else {
                        write_err(err.error)
                    }
                })?;
                filename.to_string()
            }
            DuplicationPolicy::Rename => {
                let mut pending = temp;
                let mut stored = None;
                for attempt in 0..=MAX_RENAME_ATTEMPTS {
                    let candidate = numbered_name(filename, attempt);
                    match pending.persist_noclobber(dir.join(&candidate)) {
                        Ok(_) => {
                            stored = Some(candidate);
                            break;
                        }
                        Err(err) if err.error.kind() == ErrorKind::AlreadyExists => {
                            pending = err.file;
                        }
                        Err(err) => return Err(write_err(err.error)),
                    }
                }
                stored.ok_or_else(|| {
                    ImageError::store_write(format!("no free name left for {filename}"))
                })?
            }
        };

        let identifier = folder.path.file_identifier(&stored_name);
        let size = bytes.len() as u64;
        let uid = self.record(folder.storage_uid, &identifier, &sha256, size)?;
        Ok(CommittedFile {
            uid,
            storage_uid: folder.storage_uid,
            identifier,
            sha256,
            size,
        })
    }
}

fn numbered_name(filename: &str, attempt: u32) -> String {
    if attempt == 0 {
        return filename.to_string();
    }
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}_{attempt:02}.{ext}"),
        _ => format!("{filename}_{attempt:02}"),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use super::{numbered_name, DirectoryStore, StorageRoot};
    use crate::storage::{DuplicationPolicy, FileStore, FolderPath};

    fn store_in(base: &Path) -> anyhow::Result<DirectoryStore> {
        fs::create_dir_all(base.join("fileadmin"))?;
        fs::create_dir_all(base.join("archive"))?;
        Ok(DirectoryStore::new(
            vec![
                StorageRoot {
                    uid: 1,
                    name: "fileadmin".to_string(),
                    path: base.join("fileadmin"),
                    default: true,
                    online: true,
                },
                StorageRoot {
                    uid: 2,
                    name: "archive".to_string(),
                    path: base.join("archive"),
                    default: false,
                    online: false,
                },
                StorageRoot {
                    uid: 3,
                    name: "missing".to_string(),
                    path: base.join("not-mounted"),
                    default: false,
                    online: true,
                },
            ],
            base.join("index.json"),
        ))
    }

    fn staged(base: &Path, bytes: &[u8]) -> anyhow::Result<std::path::PathBuf> {
        let path = base.join("staged.bin");
        fs::write(&path, bytes)?;
        Ok(path)
    }

    #[test]
    fn storages_report_online_state() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = store_in(temp.path())?;
        let storages = store.storages()?;
        assert_eq!(storages.len(), 3);
        assert!(storages[0].online && storages[0].is_default);
        assert!(!storages[1].online);
        assert!(!storages[2].online);
        assert_eq!(store.default_storage()?.map(|s| s.uid), Some(1));
        assert!(store.storage(42)?.is_none());
        Ok(())
    }

    #[test]
    fn create_folder_is_idempotent() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = store_in(temp.path())?;
        let storage = store.storage(1)?.unwrap_or_else(|| panic!("storage"));
        let root = store.root_folder(&storage)?;
        let first = store.create_folder(&root, "user_upload")?;
        let second = store.create_folder(&root, "user_upload")?;
        assert_eq!(first, second);
        assert_eq!(store.subfolders(&root)?.len(), 1);
        assert!(store.subfolder(&root, "user_upload")?.is_some());
        assert!(store
            .folder(&storage, &FolderPath::parse("user_upload")?)?
            .is_some());
        Ok(())
    }

    #[test]
    fn replace_overwrites_and_keeps_uid() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = store_in(temp.path())?;
        let storage = store.storage(1)?.unwrap_or_else(|| panic!("storage"));
        let root = store.root_folder(&storage)?;

        let first = store.put_file(
            &staged(temp.path(), b"one")?,
            &root,
            "bike.png",
            DuplicationPolicy::Replace,
        )?;
        let second = store.put_file(
            &staged(temp.path(), b"two!")?,
            &root,
            "bike.png",
            DuplicationPolicy::Replace,
        )?;

        assert_eq!(first.uid, second.uid);
        assert_eq!(second.identifier, "/bike.png");
        assert_eq!(second.size, 4);
        assert_eq!(fs::read(temp.path().join("fileadmin/bike.png"))?, b"two!");
        let leftovers = fs::read_dir(temp.path().join("fileadmin"))?.count();
        assert_eq!(leftovers, 1);
        Ok(())
    }

    #[test]
    fn cancel_refuses_existing_file() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = store_in(temp.path())?;
        let storage = store.storage(1)?.unwrap_or_else(|| panic!("storage"));
        let root = store.root_folder(&storage)?;
        let source = staged(temp.path(), b"one")?;
        store.put_file(&source, &root, "a.png", DuplicationPolicy::Cancel)?;
        let err = store
            .put_file(&source, &root, "a.png", DuplicationPolicy::Cancel)
            .err()
            .unwrap_or_else(|| panic!("expected failure"));
        assert!(err.to_string().contains("already exists"));
        assert_eq!(fs::read_dir(temp.path().join("fileadmin"))?.count(), 1);
        Ok(())
    }

    #[test]
    fn rename_picks_next_free_name() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = store_in(temp.path())?;
        let storage = store.storage(1)?.unwrap_or_else(|| panic!("storage"));
        let root = store.root_folder(&storage)?;
        let source = staged(temp.path(), b"one")?;
        let a = store.put_file(&source, &root, "a.png", DuplicationPolicy::Rename)?;
        let b = store.put_file(&source, &root, "a.png", DuplicationPolicy::Rename)?;
        assert_eq!(a.identifier, "/a.png");
        assert_eq!(b.identifier, "/a_01.png");
        assert_ne!(a.uid, b.uid);
        Ok(())
    }

    #[test]
    fn put_into_missing_folder_fails() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = store_in(temp.path())?;
        let storage = store.storage(1)?.unwrap_or_else(|| panic!("storage"));
        let folder = store.root_folder(&storage)?;
        let missing = crate::storage::FolderHandle {
            path: folder.path.join("nope"),
            ..folder
        };
        let result = store.put_file(
            &staged(temp.path(), b"x")?,
            &missing,
            "a.png",
            DuplicationPolicy::Replace,
        );
        assert!(matches!(result, Err(crate::ImageError::StoreWrite(_))));
        Ok(())
    }

    #[test]
    fn numbered_names() {
        assert_eq!(numbered_name("a.png", 0), "a.png");
        assert_eq!(numbered_name("a.png", 3), "a_03.png");
        assert_eq!(numbered_name("README", 1), "README_01");
        assert_eq!(numbered_name(".hidden", 2), ".hidden_02");
    }
}
