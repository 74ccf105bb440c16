use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    response::Response,
};
use serde_json::Value;

use crate::audit;
use crate::auth::Caller;
use crate::query::DocumentQuery;
use crate::server::AppState;
use crate::server::dto::DocumentQueryParams;
use crate::server::response::{ApiError, StoreOptionExt, StoreResultExt, json_or_jsonp};

/// Queries the audit log of an account. Owner only.
pub async fn activity_api(
    caller: Caller,
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
    Query(params): Query<DocumentQueryParams>,
) -> Result<Response, ApiError> {
    let owner = state
        .store
        .get_user_by_username(&username)
        .api_err("Failed to get user")?
        .or_not_found("User not found")?;
    if !caller.is_user(&owner.username) {
        return Err(ApiError::forbidden("Permission denied."));
    }

    let query = DocumentQuery::parse(&params.query_params())?;
    let docs: Vec<Value> = state
        .store
        .list_audit_for_account(&owner.username)
        .api_err("Failed to list activity")?
        .iter()
        .map(audit::to_document)
        .collect();

    json_or_jsonp(&query.apply(docs), params.callback.as_deref())
}

pub async fn activity_fields() -> Json<Value> {
    Json(audit::activity_fields())
}
