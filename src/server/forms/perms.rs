use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
};
use serde_json::{Value, json};

use super::load_form;
use crate::auth::Caller;
use crate::forms::{FormAccess, PermissionChange, PermissionError, PermissionManager};
use crate::server::AppState;
use crate::server::request::{FormFields, RequestMeta};
use crate::server::response::{ApiError, ApiResponse, StoreResultExt};

impl From<PermissionError> for ApiError {
    fn from(e: PermissionError) -> Self {
        match e {
            PermissionError::Forbidden => ApiError::forbidden(e.to_string()),
            PermissionError::MissingParameter
            | PermissionError::UnknownPermission(_)
            | PermissionError::UnknownLinkAction(_) => ApiError::bad_request(e.to_string()),
            PermissionError::UnknownUser(_) => ApiError::not_found(e.to_string()),
            PermissionError::Store(_) | PermissionError::Metadata(_) => {
                tracing::error!("Permission update failed: {e}");
                ApiError::internal("Failed to update permissions")
            }
        }
    }
}

/// Grants or revokes a capability (`perm_type`, `for_user`), or switches the
/// public link.
pub async fn set_perm(
    caller: Caller,
    meta: RequestMeta,
    State(state): State<Arc<AppState>>,
    Path((username, id_string)): Path<(String, String)>,
    body: FormFields,
) -> Result<Json<ApiResponse<Value>>, ApiError> {
    let (owner, form) = load_form(&state, &username, &id_string)?;
    let access = FormAccess::resolve(state.store.as_ref(), &form, caller.user())
        .api_err("Failed to check access")?;

    let manager = PermissionManager {
        store: state.store.as_ref(),
        media: &state.media,
        client_ip: meta.client_ip,
    };

    let change = manager.apply(
        &form,
        &owner,
        caller.username(),
        access,
        body.fields.get("perm_type").map(String::as_str),
        body.fields.get("for_user").map(String::as_str),
    )?;

    let data = match change {
        PermissionChange::Granted(cap) => json!({ "granted": cap.to_strings() }),
        PermissionChange::Unchanged => json!({ "granted": [] }),
        PermissionChange::RemovedAll => json!({ "removed": "all" }),
        PermissionChange::PublicLink(enabled) => json!({ "public_link": enabled }),
    };

    Ok(Json(ApiResponse::success(data)))
}
