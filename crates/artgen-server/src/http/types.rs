//! Wire shapes of the `/ai-images` routes. Field names are camelCase on the
//! wire.

use artgen_contracts::storage::StorageInfo;
use artgen_engine::FolderEntry;
use serde::{Deserialize, Serialize};

use crate::config::FieldConfig;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateImageRequest {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub size: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateImageResponse {
    pub success: bool,
    /// Inline data URI for display.
    pub url: String,
    /// Provider URL, sent back with a later save.
    pub original_url: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revised_prompt: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveImageRequest {
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub storage: Option<u32>,
    #[serde(default)]
    pub folder: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveImageResponse {
    pub success: bool,
    pub file_uid: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageSummary {
    pub uid: u32,
    pub name: String,
    pub is_default: bool,
}

impl From<StorageInfo> for StorageSummary {
    fn from(info: StorageInfo) -> Self {
        Self {
            uid: info.uid,
            name: info.name,
            is_default: info.is_default,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StoragesResponse {
    pub success: bool,
    pub storages: Vec<StorageSummary>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FoldersQuery {
    #[serde(default)]
    pub storage: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderSummary {
    pub name: String,
    pub path: String,
    pub full_path: String,
}

impl From<FolderEntry> for FolderSummary {
    fn from(entry: FolderEntry) -> Self {
        Self {
            name: entry.name,
            path: entry.path,
            full_path: entry.full_path,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FoldersResponse {
    pub success: bool,
    pub folders: Vec<FolderSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldsResponse {
    pub success: bool,
    pub fields: Vec<FieldConfig>,
}
