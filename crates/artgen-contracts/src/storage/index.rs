use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub uid: u64,
    pub sha256: String,
    pub size: u64,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct IndexPayload {
    #[serde(default)]
    next_uid: u64,
    #[serde(default)]
    files: BTreeMap<String, IndexEntry>,
}

/// JSON-backed map from `<storage>:<identifier>` to the uid the store handed
/// out for that path. Every read and write starts from the file on disk, so
/// several processes sharing one index never hand out the same uid or drop
/// each other's entries.
#[derive(Debug, Clone)]
pub struct FileIndex {
    path: PathBuf,
    payload: Option<IndexPayload>,
}

impl FileIndex {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            payload: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&mut self, storage_uid: u32, identifier: &str) -> Option<IndexEntry> {
        self.ensure_loaded(true)
            .files
            .get(&entry_key(storage_uid, identifier))
            .cloned()
    }

    pub fn len(&mut self) -> usize {
        self.ensure_loaded(true).files.len()
    }

    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }

    /// Records a write and returns its uid. A path that is already indexed
    /// keeps its uid; new paths get the next free one. Only this entry is
    /// merged into the freshly read file before it is rewritten.
    pub fn record(
        &mut self,
        storage_uid: u32,
        identifier: &str,
        sha256: &str,
        size: u64,
    ) -> anyhow::Result<u64> {
        let payload = self.ensure_loaded(true);
        let key = entry_key(storage_uid, identifier);
        let uid = match payload.files.get(&key) {
            Some(existing) => existing.uid,
            None => {
                let uid = payload.next_free_uid();
                payload.next_uid = uid + 1;
                uid
            }
        };
        payload.files.insert(
            key,
            IndexEntry {
                uid,
                sha256: sha256.to_string(),
                size,
                updated_at: chrono::Utc::now().to_rfc3339(),
            },
        );
        self.flush()?;
        Ok(uid)
    }

    fn flush(&self) -> anyhow::Result<()> {
        let Some(payload) = &self.payload else {
            return Ok(());
        };
        let parent = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
        let mut temp = tempfile::NamedTempFile::new_in(parent)?;
        temp.write_all(serde_json::to_string_pretty(payload)?.as_bytes())?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }

    fn ensure_loaded(&mut self, refresh: bool) -> &mut IndexPayload {
        if refresh || self.payload.is_none() {
            self.payload = Some(read_payload(&self.path).unwrap_or_default());
        }
        self.payload.get_or_insert_with(IndexPayload::default)
    }
}

impl IndexPayload {
    /// Never below 1 and never at or below a uid already in the file, even if
    /// `next_uid` was edited by hand or lost.
    fn next_free_uid(&self) -> u64 {
        let highest = self.files.values().map(|entry| entry.uid).max().unwrap_or(0);
        self.next_uid.max(highest + 1).max(1)
    }
}

fn entry_key(storage_uid: u32, identifier: &str) -> String {
    format!("{storage_uid}:{identifier}")
}

fn read_payload(path: &Path) -> Option<IndexPayload> {
    let raw = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&raw).ok()
}
