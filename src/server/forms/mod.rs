mod data;
mod edit;
mod metadata;
mod perms;
pub mod publish;
mod show;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use crate::server::AppState;
use crate::server::response::{ApiError, StoreOptionExt, StoreResultExt};
use crate::types::{Form, User};

const FORM_PATH: &str = "/{username}/forms/{id_string}";

fn form_route(suffix: &str) -> String {
    format!("{FORM_PATH}{suffix}")
}

pub fn forms_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/{username}/clone", post(publish::clone_form))
        .route("/forms/gallery", get(show::form_gallery))
        .route("/forms/{uuid}", get(show::public_link))
        .route(FORM_PATH, get(show::show_form))
        .route(&form_route("/form_settings"), get(show::form_settings))
        .route(&form_route("/public_api"), get(show::public_api))
        .route(&form_route("/preview"), get(show::enketo_preview))
        .route(&form_route("/edit"), post(edit::edit_form))
        .route(&form_route("/perms"), post(perms::set_perm))
        .route(&form_route("/update"), post(publish::update_form))
        .route(
            &form_route("/formid-media/{data_id}"),
            get(metadata::download_media_data),
        )
        .route(&form_route("/doc/{data_id}"), get(metadata::download_metadata))
        .route(
            &form_route("/delete-doc/{data_id}"),
            get(metadata::delete_metadata),
        )
        .route(&form_route("/submissions"), post(data::submit_data))
        .route(&form_route("/delete_data"), post(data::delete_data))
}

/// Routes that carry CORS headers.
pub fn data_api_router() -> Router<Arc<AppState>> {
    Router::new().route(
        &form_route("/api"),
        get(data::data_api).options(data::data_api_options),
    )
}

/// Loads the owner (case-insensitive) and the form they own.
fn load_form(state: &AppState, username: &str, id_string: &str) -> Result<(User, Form), ApiError> {
    let owner = state
        .store
        .get_user_by_username(username)
        .api_err("Failed to get user")?
        .or_not_found("User not found")?;

    let form = state
        .store
        .get_form_by_id_string(&owner.id, id_string)
        .api_err("Failed to get form")?
        .or_not_found("Form not found")?;

    Ok((owner, form))
}

#[must_use]
fn form_page(owner: &User, form: &Form) -> String {
    format!("/{}/forms/{}", owner.username, form.id_string)
}
