//! Handlers for the `/ai-images` routes. Engine calls block, so each one runs
//! on tokio's blocking pool.

use artgen_contracts::events::{new_request_id, ActivityFields, ActivityKind};
use artgen_contracts::storage::{StorageSelector, StorageTarget};
use artgen_contracts::ImageError;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::Json;
use serde_json::json;
use tracing::{debug, info};

use super::error::ApiError;
use super::types::{
    FieldsResponse, FoldersQuery, FoldersResponse, GenerateImageRequest, GenerateImageResponse,
    SaveImageRequest, SaveImageResponse, StoragesResponse,
};
use crate::state::AppState;

async fn run_blocking<T, F>(task: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ImageError> + Send + 'static,
    T: Send + 'static,
{
    let joined = tokio::task::spawn_blocking(task)
        .await
        .map_err(|err| ImageError::unexpected(format!("worker task failed: {err}")))?;
    Ok(joined?)
}

pub fn default_filename() -> String {
    format!("ai_generated_{}.png", chrono::Utc::now().timestamp())
}

fn activity_fields(value: serde_json::Value) -> ActivityFields {
    match value {
        serde_json::Value::Object(map) => map,
        _ => ActivityFields::new(),
    }
}

/// POST /ai-images/generate
///
/// Generates one image and returns it inline together with the provider URL.
/// Nothing is written to a storage.
pub(crate) async fn generate_image(
    State(state): State<AppState>,
    payload: Result<Json<GenerateImageRequest>, JsonRejection>,
) -> Result<Json<GenerateImageResponse>, ApiError> {
    let Json(request) = payload?;
    let request_id = new_request_id();
    debug!(
        request_id = %request_id,
        prompt_len = request.prompt.len(),
        size = ?request.size,
        "generate request"
    );

    let services = state.clone();
    let (generated, inline) = run_blocking(move || {
        let generated = services
            .generator()
            .generate(&request.prompt, request.size.as_deref())?;
        let inline = services.pipeline().preview(&generated.source_url)?;
        Ok((generated, inline))
    })
    .await?;

    state.record(
        ActivityKind::ImageGenerated,
        &request_id,
        activity_fields(json!({
            "provider": state.generator().provider_name(),
            "prompt": generated.prompt,
            "mime_type": inline.mime_type,
            "bytes": inline.byte_len,
        })),
    );
    info!(request_id = %request_id, bytes = inline.byte_len, "image generated");

    Ok(Json(GenerateImageResponse {
        success: true,
        url: inline.data_uri,
        original_url: generated.source_url,
        prompt: generated.prompt,
        revised_prompt: generated.revised_prompt,
    }))
}

/// POST /ai-images/save
///
/// Downloads `imageUrl` again and stores it. Missing filename, folder and
/// storage fall back to `ai_generated_<unix>.png`, the configured default
/// folder and the default storage.
pub(crate) async fn save_image(
    State(state): State<AppState>,
    payload: Result<Json<SaveImageRequest>, JsonRejection>,
) -> Result<Json<SaveImageResponse>, ApiError> {
    let Json(request) = payload?;
    let image_url = request.image_url.trim().to_string();
    if image_url.is_empty() {
        return Err(ImageError::validation("Image URL is required").into());
    }
    let filename = request
        .filename
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(default_filename);
    let folder = request
        .folder
        .unwrap_or_else(|| state.default_folder().to_string());
    let target = StorageTarget::new(StorageSelector::from_wire(request.storage), &folder, &filename)?;

    let request_id = new_request_id();
    let services = state.clone();
    let commit_target = target.clone();
    let source_url = image_url.clone();
    let outcome =
        run_blocking(move || services.pipeline().commit(&source_url, &commit_target)).await;

    match outcome {
        Ok(file) => {
            state.record(
                ActivityKind::ImageCommitted,
                &request_id,
                activity_fields(json!({
                    "source_url": image_url,
                    "file_uid": file.uid,
                    "storage_uid": file.storage_uid,
                    "identifier": file.identifier,
                    "sha256": file.sha256,
                    "size": file.size,
                })),
            );
            Ok(Json(SaveImageResponse {
                success: true,
                file_uid: file.uid,
            }))
        }
        Err(err) => {
            state.record(
                ActivityKind::CommitFailed,
                &request_id,
                activity_fields(json!({
                    "source_url": image_url,
                    "storage": target.selector.to_string(),
                    "folder": target.folder.identifier(),
                    "filename": target.filename,
                    "kind": err.0.kind().as_str(),
                    "error": err.0.to_string(),
                })),
            );
            Err(err)
        }
    }
}

/// GET /ai-images/storages
pub(crate) async fn list_storages(
    State(state): State<AppState>,
) -> Result<Json<StoragesResponse>, ApiError> {
    let services = state.clone();
    let storages = run_blocking(move || services.pipeline().list_storages()).await?;
    Ok(Json(StoragesResponse {
        success: true,
        storages: storages.into_iter().map(Into::into).collect(),
    }))
}

/// GET /ai-images/folders?storage=N
///
/// `storage` may be omitted or 0 for the default storage.
pub(crate) async fn list_folders(
    State(state): State<AppState>,
    query: Result<Query<FoldersQuery>, QueryRejection>,
) -> Result<Json<FoldersResponse>, ApiError> {
    let Query(query) = query?;
    let selector = StorageSelector::from_wire(query.storage);
    let services = state.clone();
    let folders = run_blocking(move || services.pipeline().list_folders(selector)).await?;
    Ok(Json(FoldersResponse {
        success: true,
        folders: folders.into_iter().map(Into::into).collect(),
    }))
}

/// GET /ai-images/fields
pub(crate) async fn list_fields(State(state): State<AppState>) -> Json<FieldsResponse> {
    Json(FieldsResponse {
        success: true,
        fields: state.fields().to_vec(),
    })
}
