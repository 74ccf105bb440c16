use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
};

use crate::auth::{Caller, RequireUser};
use crate::server::AppState;
use crate::server::dto::{PaginationParams, UsernameQuery};
use crate::server::response::{
    ApiError, DEFAULT_PAGE_SIZE, PaginatedResponse, StoreResultExt, paginate,
};
use crate::types::User;

const USERNAME_LIST_LIMIT: i32 = 50;

/// All members. Staff and admin tokens only.
pub async fn members_list(
    caller: Caller,
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<PaginatedResponse<User>>, ApiError> {
    if !caller.is_staff() {
        return Err(ApiError::forbidden("Forbidden."));
    }

    let cursor = params.cursor.as_deref().unwrap_or("");
    let users = state
        .store
        .list_users(cursor, DEFAULT_PAGE_SIZE + 1)
        .api_err("Failed to list users")?;

    let (users, next_cursor, has_more) =
        paginate(users, DEFAULT_PAGE_SIZE as usize, |u| u.username.clone());

    Ok(Json(PaginatedResponse::new(users, next_cursor, has_more)))
}

/// Active usernames starting with `query`; empty without a query.
pub async fn username_list(
    _auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<UsernameQuery>,
) -> Result<Json<Vec<String>>, ApiError> {
    let prefix = params.query.trim();
    if prefix.is_empty() {
        return Ok(Json(Vec::new()));
    }

    let names = state
        .store
        .list_active_usernames(prefix, USERNAME_LIST_LIMIT)
        .api_err("Failed to list usernames")?;
    Ok(Json(names))
}
