use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    response::{IntoResponse, Redirect, Response},
};

use super::{form_page, load_form};
use crate::auth::Caller;
use crate::forms::{CLONE_SUFFIX, FormAccess, FormMetadata, MetadataError};
use crate::server::AppState;
use crate::server::dto::{
    FormPayload, GalleryForm, GalleryResponse, PublicFormInfo, SmsSettings, UserPermissions,
};
use crate::server::request::RequestMeta;
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};
use crate::types::{Form, MetadataKind, User};

const PUBLIC_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn has_cloned(state: &AppState, caller: &Caller, form: &Form) -> Result<bool, ApiError> {
    let Some(user) = caller.user() else {
        return Ok(false);
    };
    let cloned = state
        .store
        .get_form_by_id_string(&user.id, &format!("{}{CLONE_SUFFIX}", form.id_string))
        .api_err("Failed to check cloned form")?;
    Ok(cloned.is_some())
}

fn build_payload(
    state: &AppState,
    owner: &User,
    form: Form,
    caller: &Caller,
    access: FormAccess,
) -> Result<FormPayload, ApiError> {
    let store = state.store.as_ref();
    let metadata = FormMetadata::new(store, &state.media, &form, &owner.username);
    let meta_err = |_: MetadataError| ApiError::internal("Failed to load form metadata");

    let license = |kind: MetadataKind| -> Result<Option<String>, ApiError> {
        Ok(metadata
            .single(kind)
            .map_err(meta_err)?
            .and_then(|m| m.data_value))
    };

    let (users_with_perms, sms) = if access.is_owner {
        let grants = store
            .list_form_grants(&form.id)
            .api_err("Failed to list permissions")?;
        let mut users = Vec::with_capacity(grants.len());
        for grant in grants {
            let Some(user) = store.get_user(&grant.user_id).api_err("Failed to get user")? else {
                continue;
            };
            users.push(UserPermissions {
                user: user.username,
                permissions: grant.capabilities.labels().join(" | "),
            });
        }
        let sms = SmsSettings {
            allows_sms: form.allows_sms,
            sms_id_string: form.sms_id_string.clone(),
        };
        (Some(users), Some(sms))
    } else {
        (None, None)
    };

    let payload = FormPayload {
        content_user: owner.username.clone(),
        is_owner: access.is_owner,
        can_edit: access.can_edit(),
        can_view: access.can_view(),
        can_delete_data: access.can_delete_data(),
        public_link: metadata.public_link().map_err(meta_err)?,
        cloned: has_cloned(state, caller, &form)?,
        submission_count: store
            .count_submissions(&form.id)
            .api_err("Failed to count submissions")?,
        form_license: license(MetadataKind::FormLicense)?,
        data_license: license(MetadataKind::DataLicense)?,
        source: metadata.single(MetadataKind::Source).map_err(meta_err)?,
        supporting_docs: metadata
            .list(MetadataKind::SupportingDoc)
            .map_err(meta_err)?,
        media: metadata.list(MetadataKind::Media).map_err(meta_err)?,
        users_with_perms,
        sms,
        media_upload_types: None,
        form: form.clone(),
    };

    Ok(payload)
}

fn resolve_access(state: &AppState, form: &Form, caller: &Caller) -> Result<FormAccess, ApiError> {
    FormAccess::resolve(state.store.as_ref(), form, caller.user()).api_err("Failed to check access")
}

pub async fn show_form(
    caller: Caller,
    State(state): State<Arc<AppState>>,
    Path((username, id_string)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let (owner, form) = load_form(&state, &username, &id_string)?;
    let access = resolve_access(&state, &form, &caller)?;

    if !(form.shared || access.can_view()) {
        return Ok(Redirect::to("/").into_response());
    }

    let payload = build_payload(&state, &owner, form, &caller, access)?;
    Ok(Json(ApiResponse::success(payload)).into_response())
}

pub async fn form_settings(
    caller: Caller,
    State(state): State<Arc<AppState>>,
    Path((username, id_string)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let (owner, form) = load_form(&state, &username, &id_string)?;
    let access = resolve_access(&state, &form, &caller)?;

    if !(form.shared || access.can_view()) {
        return Ok(Redirect::to("/").into_response());
    }

    let mut payload = build_payload(&state, &owner, form, &caller, access)?;
    payload.media_upload_types = Some(state.config.media_upload_accept());
    Ok(Json(ApiResponse::success(payload)).into_response())
}

/// Anyone holding the uuid may view the form while its public link is on.
pub async fn public_link(
    caller: Caller,
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
) -> Result<Response, ApiError> {
    let form = state
        .store
        .get_form_by_uuid(&uuid)
        .api_err("Failed to get form")?
        .or_not_found("Form not found")?;
    let owner = state
        .store
        .get_user(&form.user_id)
        .api_err("Failed to get user")?
        .or_not_found("User not found")?;

    let enabled = FormMetadata::new(state.store.as_ref(), &state.media, &form, &owner.username)
        .public_link()
        .map_err(|_| ApiError::internal("Failed to load form metadata"))?;

    if !enabled {
        return Ok(Redirect::to(&form_page(&owner, &form)).into_response());
    }

    let mut access = resolve_access(&state, &form, &caller)?;
    if !access.can_view() {
        access = FormAccess::public_link();
    }

    let payload = build_payload(&state, &owner, form, &caller, access)?;
    Ok(Json(ApiResponse::success(payload)).into_response())
}

pub async fn public_api(
    State(state): State<Arc<AppState>>,
    Path((username, id_string)): Path<(String, String)>,
) -> Result<Json<PublicFormInfo>, ApiError> {
    let (owner, form) = load_form(&state, &username, &id_string)?;

    Ok(Json(PublicFormInfo {
        username: owner.username,
        id_string: form.id_string,
        shared: form.shared,
        shared_data: form.shared_data,
        downloadable: form.downloadable,
        title: form.title,
        date_created: form.created_at.format(PUBLIC_DATETIME_FORMAT).to_string(),
        date_modified: form.updated_at.format(PUBLIC_DATETIME_FORMAT).to_string(),
        uuid: form.uuid,
    }))
}

#[must_use]
pub fn preview_url(preview_base: &str, base_url: &str, owner: &str, id_string: &str) -> String {
    let profile_url = format!("{base_url}/{owner}");
    format!(
        "{preview_base}?server={}&id={}",
        urlencoding::encode(&profile_url),
        urlencoding::encode(id_string)
    )
}

pub async fn enketo_preview(
    caller: Caller,
    meta: RequestMeta,
    State(state): State<Arc<AppState>>,
    Path((username, id_string)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let (owner, form) = load_form(&state, &username, &id_string)?;
    let access = resolve_access(&state, &form, &caller)?;

    if !(form.shared || access.can_view()) {
        return Err(ApiError::forbidden("Not shared."));
    }

    let url = preview_url(
        &state.config.enketo_preview_url,
        &meta.base_url,
        &owner.username,
        &form.id_string,
    );
    Ok(Redirect::to(&url).into_response())
}

pub async fn form_gallery(
    caller: Caller,
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<GalleryResponse>>, ApiError> {
    let store = state.store.as_ref();
    let shared = store
        .list_shared_forms()
        .api_err("Failed to list shared forms")?;

    let cloned = match caller.user() {
        Some(user) => {
            let mine = store.list_user_forms(&user.id).api_err("Failed to list forms")?;
            shared
                .iter()
                .filter(|f| {
                    let cloned_id = format!("{}{CLONE_SUFFIX}", f.id_string);
                    mine.iter().any(|m| m.id_string == cloned_id)
                })
                .map(|f| f.id_string.clone())
                .collect()
        }
        None => Vec::new(),
    };

    let mut usernames: HashMap<String, String> = HashMap::new();
    let mut shared_forms = Vec::with_capacity(shared.len());
    for form in shared {
        let username = match usernames.get(&form.user_id) {
            Some(name) => name.clone(),
            None => {
                let Some(user) = store.get_user(&form.user_id).api_err("Failed to get user")? else {
                    continue;
                };
                usernames.insert(form.user_id.clone(), user.username.clone());
                user.username
            }
        };
        shared_forms.push(GalleryForm { username, form });
    }

    Ok(Json(ApiResponse::success(GalleryResponse {
        shared_forms,
        cloned,
    })))
}
