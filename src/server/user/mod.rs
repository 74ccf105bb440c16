mod activity;
mod directory;
mod profile;
mod tokens;

use std::sync::Arc;

use axum::{Router, routing::get};

use crate::server::AppState;
use crate::server::forms::publish::publish_form;

pub fn user_router() -> Router<Arc<AppState>> {
    Router::new()
        // Directory
        .route("/people", get(directory::members_list))
        .route("/users", get(directory::username_list))
        .route("/activity/fields", get(activity::activity_fields))
        // Profiles; POST on the profile publishes a form
        .route("/{username}", get(profile::profile).post(publish_form))
        .route("/{username}/profile", get(profile::public_profile))
        .route(
            "/{username}/settings",
            get(profile::get_settings).post(profile::update_settings),
        )
        .route(
            "/{username}/api-token",
            get(tokens::list_tokens).post(tokens::create_token),
        )
        .route("/{username}/activity", get(activity::activity_api))
}
