use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use tokio_util::io::ReaderStream;

use super::{form_page, load_form};
use crate::audit::{self, AuditBuilder};
use crate::auth::Caller;
use crate::forms::FormMetadata;
use crate::media::{MediaStorageError, file_name_parts};
use crate::server::AppState;
use crate::server::dto::DeleteParams;
use crate::server::request::RequestMeta;
use crate::server::response::{ApiError, StoreOptionExt, StoreResultExt};
use crate::types::{AuditAction, AuditEntry, Form, Metadata, MetadataKind, User};

type MetadataPath = (String, String, i64);

/// Streams a stored metadata file as an attachment.
async fn file_response(state: &AppState, meta: &Metadata, path: &str) -> Result<Response, ApiError> {
    let (reader, size) = match state.media.get(path).await {
        Ok(found) => found,
        Err(MediaStorageError::NotFound | MediaStorageError::InvalidPath) => {
            return Err(ApiError::not_found("File not found"));
        }
        Err(e) => {
            tracing::warn!("Media storage error: {e}");
            return Err(ApiError::internal("Storage error"));
        }
    };

    let (stem, ext) = file_name_parts(path);
    let file_name = if ext.is_empty() { stem } else { format!("{stem}.{ext}") };
    let content_type = meta
        .data_file_type
        .clone()
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let body = Body::from_stream(ReaderStream::new(reader));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, size)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", file_name.replace('"', "")),
        )
        .header("X-Content-Type-Options", "nosniff")
        .body(body)
        .map_err(|_| ApiError::internal("Failed to build response"))
}

fn display_name(path: &str) -> String {
    let (stem, ext) = file_name_parts(path);
    format!("{stem}.{ext}")
}

fn load_metadata(
    state: &AppState,
    owner: &User,
    form: &Form,
    data_id: i64,
) -> Result<Metadata, ApiError> {
    FormMetadata::new(state.store.as_ref(), &state.media, form, &owner.username)
        .get(data_id)
        .map_err(|_| ApiError::internal("Failed to get metadata"))?
        .or_not_found("Metadata not found")
}

fn audit_entry(
    caller: &Caller,
    request: &RequestMeta,
    owner: &User,
    form: &Form,
    message: String,
) -> AuditEntry {
    AuditBuilder::new(AuditAction::FormUpdated, caller.username(), &owner.username, message)
        .xform(&form.id_string)
        .client_ip(request.client_ip.clone())
        .build()
}

/// Downloads a supporting document or source file. Owner or shared form only.
pub async fn download_metadata(
    caller: Caller,
    request: RequestMeta,
    State(state): State<Arc<AppState>>,
    Path((username, id_string, data_id)): Path<MetadataPath>,
) -> Result<Response, ApiError> {
    let (owner, form) = load_form(&state, &username, &id_string)?;
    if !(caller.is_user(&owner.username) || form.shared) {
        return Err(ApiError::forbidden("Permission denied."));
    }

    let meta = load_metadata(&state, &owner, &form, data_id)?;
    let path = meta
        .data_file
        .clone()
        .filter(|p| !p.is_empty())
        .or_not_found("File not found")?;

    let response = file_response(&state, &meta, &path).await?;
    let entry = audit_entry(
        &caller,
        &request,
        &owner,
        &form,
        format!(
            "Document '{}' for '{}' downloaded.",
            display_name(&path),
            form.id_string
        ),
    );
    audit::record(state.store.as_ref(), &entry).api_err("Failed to write audit log")?;
    Ok(response)
}

/// Deletes a document (`del=true`) or a map layer (`map_name_del=true`).
/// Owner only.
pub async fn delete_metadata(
    caller: Caller,
    request: RequestMeta,
    State(state): State<Arc<AppState>>,
    Path((username, id_string, data_id)): Path<MetadataPath>,
    Query(params): Query<DeleteParams>,
) -> Result<Response, ApiError> {
    let (owner, form) = load_form(&state, &username, &id_string)?;
    if !params.is_delete() || !caller.is_user(&owner.username) {
        return Err(ApiError::forbidden("Permission denied."));
    }

    let meta = load_metadata(&state, &owner, &form, data_id)?;
    let accessor = FormMetadata::new(state.store.as_ref(), &state.media, &form, &owner.username);

    if params.del.as_deref() == Some("true") {
        let entry = audit_entry(
            &caller,
            &request,
            &owner,
            &form,
            format!(
                "Document '{}' deleted from '{}'.",
                meta.file_name().unwrap_or_default(),
                form.id_string
            ),
        );
        if let Err(e) = accessor.audited(&entry).remove(&meta).await {
            tracing::error!("Failed to delete document {data_id}: {e}");
            return Err(ApiError::internal("Failed to delete document"));
        }
    } else {
        let entry = audit_entry(
            &caller,
            &request,
            &owner,
            &form,
            format!("Map layer deleted from '{}'.", form.id_string),
        );
        if let Err(e) = accessor.audited(&entry).delete_record(&meta) {
            tracing::error!("Failed to delete map layer {data_id}: {e}");
            return Err(ApiError::internal("Failed to delete map layer"));
        }
    }

    Ok(Redirect::to(&form_page(&owner, &form)).into_response())
}

/// Serves a media item. URL-only media redirect to the URL; `del=true`
/// deletes the item (owner only).
pub async fn download_media_data(
    caller: Caller,
    request: RequestMeta,
    State(state): State<Arc<AppState>>,
    Path((username, id_string, data_id)): Path<MetadataPath>,
    Query(params): Query<DeleteParams>,
) -> Result<Response, ApiError> {
    let (owner, form) = load_form(&state, &username, &id_string)?;
    let meta = load_metadata(&state, &owner, &form, data_id)?;

    if params.del.as_deref() == Some("true") {
        if !caller.is_user(&owner.username) {
            return Err(ApiError::forbidden("Permission denied."));
        }
        let entry = audit_entry(
            &caller,
            &request,
            &owner,
            &form,
            format!(
                "Media download '{}' deleted from '{}'.",
                meta.file_name()
                    .or(meta.data_value.as_deref())
                    .unwrap_or_default(),
                form.id_string
            ),
        );
        let accessor = FormMetadata::new(state.store.as_ref(), &state.media, &form, &owner.username);
        if let Err(e) = accessor.audited(&entry).remove(&meta).await {
            tracing::error!("Failed to delete media {data_id}: {e}");
            return Err(ApiError::internal("Failed to delete media"));
        }
        return Ok(Redirect::to(&form_page(&owner, &form)).into_response());
    }

    let Some(path) = meta.data_file.clone().filter(|p| !p.is_empty()) else {
        return match meta.data_value.as_deref() {
            Some(url) if meta.kind == MetadataKind::Media => Ok(Redirect::to(url).into_response()),
            _ => Err(ApiError::not_found("File not found")),
        };
    };

    let response = file_response(&state, &meta, &path).await?;
    let entry = audit_entry(
        &caller,
        &request,
        &owner,
        &form,
        format!(
            "Media '{}' downloaded from '{}'.",
            display_name(&path),
            form.id_string
        ),
    );
    audit::record(state.store.as_ref(), &entry).api_err("Failed to write audit log")?;
    Ok(response)
}
