use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::audit::{self, AuditBuilder};
use crate::auth::RequireUser;
use crate::server::AppState;
use crate::server::admin::issue_user_token;
use crate::server::dto::{CreateTokenResponse, TokenResponse};
use crate::server::request::RequestMeta;
use crate::server::response::{ApiError, ApiResponse, StoreResultExt};
use crate::types::AuditAction;

fn require_self(auth: &RequireUser, username: &str) -> Result<(), ApiError> {
    if auth.user.username.eq_ignore_ascii_case(username) {
        Ok(())
    } else {
        Err(ApiError::forbidden("Permission denied."))
    }
}

/// Token metadata for the caller's own account. Raw values are never
/// shown again after issue.
pub async fn list_tokens(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> impl IntoResponse {
    require_self(&auth, &username)?;

    let tokens = state
        .store
        .list_user_tokens(&auth.user.id)
        .api_err("Failed to list tokens")?;
    let responses: Vec<TokenResponse> = tokens.into_iter().map(TokenResponse::from).collect();

    Ok::<_, ApiError>(Json(ApiResponse::success(responses)))
}

pub async fn create_token(
    auth: RequireUser,
    meta: RequestMeta,
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> impl IntoResponse {
    require_self(&auth, &username)?;

    let (token, raw_token) = issue_user_token(&state, &auth.user.id, None)?;

    let entry = AuditBuilder::new(
        AuditAction::ApiTokenIssued,
        &auth.user.username,
        &auth.user.username,
        "API token issued.",
    )
    .context("token_id", token.id.clone().into())
    .client_ip(meta.client_ip)
    .build();
    audit::record(state.store.as_ref(), &entry).api_err("Failed to write audit log")?;

    Ok::<_, ApiError>((
        StatusCode::CREATED,
        Json(ApiResponse::success(CreateTokenResponse {
            token: raw_token,
            metadata: TokenResponse::from(token),
        })),
    ))
}
