use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use super::load_form;
use super::show::preview_url;
use crate::auth::RequireUser;
use crate::forms::{FormAccess, PublishOutcome, Publisher, Upload};
use crate::server::AppState;
use crate::server::request::{FormFields, RequestMeta};
use crate::server::response::{ApiError, StoreResultExt};

const DEFINITION_FIELD: &str = "xls_file";
const TEXT_DEFINITION_FIELD: &str = "text_xls_form";

fn outcome_response(outcome: PublishOutcome, created: bool) -> impl IntoResponse {
    let status = match (outcome.is_success(), created) {
        (true, true) => StatusCode::CREATED,
        (true, false) => StatusCode::OK,
        (false, _) => StatusCode::BAD_REQUEST,
    };
    (status, Json(outcome))
}

/// Picks the uploaded definition: the `xls_file` upload, any other file, or
/// the `text_xls_form` field.
fn definition_upload(body: &FormFields) -> Result<Upload<'_>, ApiError> {
    if let Some(file) = body
        .file(DEFINITION_FIELD)
        .or_else(|| body.files.first().map(|(_, f)| f))
    {
        return Ok(Upload {
            file_name: &file.file_name,
            data: &file.data,
        });
    }
    if let Some(text) = body.get(TEXT_DEFINITION_FIELD) {
        return Ok(Upload {
            file_name: "form",
            data: text.as_bytes(),
        });
    }
    Err(ApiError::bad_request("No form definition uploaded"))
}

pub async fn publish_form(
    auth: RequireUser,
    meta: RequestMeta,
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
    body: FormFields,
) -> Result<impl IntoResponse, ApiError> {
    if !auth.user.username.eq_ignore_ascii_case(&username) {
        return Err(ApiError::forbidden("Permission denied."));
    }

    let publisher = Publisher {
        store: state.store.as_ref(),
        media: &state.media,
        client_ip: meta.client_ip.clone(),
    };

    let mut outcome = publisher
        .publish(&auth.user, &auth.user.username, definition_upload(&body)?)
        .await
        .api_err("Failed to publish form")?;

    if let Some(form) = &outcome.form {
        outcome.preview_url = Some(preview_url(
            &state.config.enketo_preview_url,
            &meta.base_url,
            &auth.user.username,
            &form.id_string,
        ));
    }

    Ok(outcome_response(outcome, true))
}

pub async fn update_form(
    auth: RequireUser,
    meta: RequestMeta,
    State(state): State<Arc<AppState>>,
    Path((username, id_string)): Path<(String, String)>,
    body: FormFields,
) -> Result<impl IntoResponse, ApiError> {
    let (owner, form) = load_form(&state, &username, &id_string)?;
    if owner.id != auth.user.id {
        return Err(ApiError::forbidden("Permission denied."));
    }

    let publisher = Publisher {
        store: state.store.as_ref(),
        media: &state.media,
        client_ip: meta.client_ip,
    };

    let outcome = publisher
        .update(&owner, &auth.user.username, &form, definition_upload(&body)?)
        .await
        .api_err("Failed to update form")?;

    Ok(outcome_response(outcome, false))
}

/// Copies a shared form (fields `username`, `id_string`) into the caller's
/// account.
pub async fn clone_form(
    auth: RequireUser,
    meta: RequestMeta,
    State(state): State<Arc<AppState>>,
    Path(_username): Path<String>,
    body: FormFields,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(source_owner), Some(id_string)) = (body.get("username"), body.get("id_string")) else {
        return Err(ApiError::bad_request("username and id_string are required"));
    };

    let (_, source) = load_form(&state, source_owner, id_string)?;
    let access = FormAccess::resolve(state.store.as_ref(), &source, Some(&auth.user))
        .api_err("Failed to check access")?;
    if !(source.shared || access.is_owner) {
        return Err(ApiError::forbidden("Form is not shared."));
    }

    let publisher = Publisher {
        store: state.store.as_ref(),
        media: &state.media,
        client_ip: meta.client_ip,
    };

    let outcome = publisher
        .clone_form(&auth.user, &source)
        .await
        .api_err("Failed to clone form")?;

    Ok(outcome_response(outcome, true))
}
