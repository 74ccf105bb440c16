use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    response::{IntoResponse, Redirect, Response},
};

use crate::audit::{self, AuditBuilder};
use crate::auth::{Caller, RequireUser};
use crate::server::AppState;
use crate::server::dto::{Dashboard, ProfileSettings, PublicProfile};
use crate::server::request::{FormFields, RequestMeta};
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};
use crate::server::validation::validate_profile_field;
use crate::types::{AuditAction, User, UserProfile};

const PROFILE_TEXT_FIELDS: &[&str] = &[
    "name",
    "city",
    "country",
    "organization",
    "home_page",
    "twitter",
    "description",
];

fn load_user(state: &AppState, username: &str) -> Result<User, ApiError> {
    state
        .store
        .get_user_by_username(username)
        .api_err("Failed to get user")?
        .or_not_found("User not found")
}

fn load_profile(state: &AppState, user: &User) -> Result<UserProfile, ApiError> {
    let profile = state
        .store
        .get_profile(&user.id)
        .api_err("Failed to get profile")?;
    Ok(profile.unwrap_or_else(|| UserProfile {
        user_id: user.id.clone(),
        ..UserProfile::default()
    }))
}

fn public_profile_data(
    state: &AppState,
    user: User,
    is_owner: bool,
) -> Result<PublicProfile, ApiError> {
    let profile = load_profile(state, &user)?;
    let shared_forms = state
        .store
        .list_user_forms(&user.id)
        .api_err("Failed to list forms")?
        .into_iter()
        .filter(|f| f.shared)
        .collect();

    Ok(PublicProfile {
        username: user.username,
        is_owner,
        profile,
        shared_forms,
    })
}

/// The user's own dashboard, or the public profile for anyone else.
pub async fn profile(
    caller: Caller,
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> Result<Response, ApiError> {
    let content_user = load_user(&state, &username)?;

    if !caller.is_user(&content_user.username) {
        let data = public_profile_data(&state, content_user, false)?;
        return Ok(Json(ApiResponse::success(data)).into_response());
    }

    let store = state.store.as_ref();
    let forms = store
        .list_user_forms(&content_user.id)
        .api_err("Failed to list forms")?;
    let shared_with_me = store
        .list_forms_granted_to(&content_user.id)
        .api_err("Failed to list shared forms")?;
    let all_forms = forms.iter().chain(shared_with_me.iter()).cloned().collect();

    let dashboard = Dashboard {
        profile: load_profile(&state, &content_user)?,
        user: content_user,
        forms,
        shared_with_me,
        all_forms,
    };
    Ok(Json(ApiResponse::success(dashboard)).into_response())
}

pub async fn public_profile(
    caller: Caller,
    meta: RequestMeta,
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> Result<Json<ApiResponse<PublicProfile>>, ApiError> {
    let content_user = load_user(&state, &username)?;
    let is_owner = caller.is_user(&content_user.username);

    let entry = AuditBuilder::new(
        AuditAction::PublicProfileAccessed,
        caller.username(),
        &content_user.username,
        "Public profile accessed.",
    )
    .client_ip(meta.client_ip)
    .build();
    audit::record(state.store.as_ref(), &entry).api_err("Failed to write audit log")?;

    let data = public_profile_data(&state, content_user, is_owner)?;
    Ok(Json(ApiResponse::success(data)))
}

fn require_self(auth: &RequireUser, username: &str) -> Result<(), ApiError> {
    if auth.user.username.eq_ignore_ascii_case(username) {
        Ok(())
    } else {
        Err(ApiError::forbidden("Permission denied."))
    }
}

pub async fn get_settings(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> Result<Json<ApiResponse<ProfileSettings>>, ApiError> {
    require_self(&auth, &username)?;
    let profile = load_profile(&state, &auth.user)?;

    Ok(Json(ApiResponse::success(ProfileSettings {
        username: auth.user.username.clone(),
        email: auth.user.email.clone(),
        profile,
    })))
}

/// Replaces the profile with the submitted values and redirects to the
/// public profile.
pub async fn update_settings(
    auth: RequireUser,
    meta: RequestMeta,
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
    body: FormFields,
) -> Result<Response, ApiError> {
    require_self(&auth, &username)?;

    let mut profile = load_profile(&state, &auth.user)?;
    for field in PROFILE_TEXT_FIELDS {
        let value = body
            .fields
            .get(*field)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        if let Some(value) = &value {
            validate_profile_field(field, value)?;
        }
        let slot = match *field {
            "name" => &mut profile.name,
            "city" => &mut profile.city,
            "country" => &mut profile.country,
            "organization" => &mut profile.organization,
            "home_page" => &mut profile.home_page,
            "twitter" => &mut profile.twitter,
            _ => &mut profile.description,
        };
        *slot = value;
    }
    profile.require_auth = matches!(
        body.get("require_auth").map(str::to_ascii_lowercase).as_deref(),
        Some("true" | "on" | "1")
    );

    state
        .store
        .upsert_profile(&profile)
        .api_err("Failed to save profile")?;

    let entry = AuditBuilder::new(
        AuditAction::ProfileSettingsUpdated,
        &auth.user.username,
        &auth.user.username,
        "Profile settings updated.",
    )
    .client_ip(meta.client_ip)
    .build();
    audit::record(state.store.as_ref(), &entry).api_err("Failed to write audit log")?;

    Ok(Redirect::to(&format!("/{}/profile", auth.user.username)).into_response())
}
