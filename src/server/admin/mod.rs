mod tokens;
mod users;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use crate::server::AppState;

pub(crate) use tokens::issue_user_token;

pub fn admin_router() -> Router<Arc<AppState>> {
    Router::new()
        // User routes
        .route("/users", post(users::create_user).get(users::list_users))
        .route("/users/{id}", get(users::get_user))
        .route(
            "/users/{id}/tokens",
            post(users::create_user_token).get(users::list_user_tokens),
        )
        // Token routes
        .route(
            "/tokens/{id}",
            get(tokens::get_token).delete(tokens::delete_token),
        )
}
