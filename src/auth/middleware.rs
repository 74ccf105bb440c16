use std::sync::Arc;

use axum::{
    Json,
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::{HeaderValue, StatusCode, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use serde_json::json;

use super::helpers::{TokenValidationError, ValidatedToken, extract_token_from_header, validate_token};
use crate::server::AppState;
use crate::types::{Token, User};

/// Username recorded for unauthenticated callers.
pub const ANONYMOUS: &str = "anonymous";

/// Whoever made the request. Missing credentials resolve to `Anonymous`;
/// present but invalid credentials are rejected.
#[derive(Debug, Clone)]
pub enum Caller {
    Anonymous,
    User(User),
    Admin(Token),
}

impl Caller {
    #[must_use]
    pub fn user(&self) -> Option<&User> {
        match self {
            Caller::User(user) => Some(user),
            _ => None,
        }
    }

    /// Name used in audit entries.
    #[must_use]
    pub fn username(&self) -> &str {
        match self {
            Caller::User(user) => &user.username,
            Caller::Admin(_) => "admin",
            Caller::Anonymous => ANONYMOUS,
        }
    }

    #[must_use]
    pub fn is_user(&self, username: &str) -> bool {
        self.user()
            .is_some_and(|u| u.username.eq_ignore_ascii_case(username))
    }

    #[must_use]
    pub fn is_staff(&self) -> bool {
        match self {
            Caller::Admin(_) => true,
            Caller::User(user) => user.is_staff,
            Caller::Anonymous => false,
        }
    }
}

/// Extractor that requires an admin token.
pub struct RequireAdmin(pub Token);

/// Extractor that requires a user token.
pub struct RequireUser {
    pub token: Token,
    pub user: User,
}

#[derive(Debug)]
pub enum AuthError {
    MissingAuth,
    InvalidScheme,
    InvalidToken,
    TokenExpired,
    InactiveUser,
    NotAdmin,
    NotUser,
    InternalError,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingAuth => (StatusCode::UNAUTHORIZED, "Authentication required"),
            AuthError::InvalidScheme => (StatusCode::UNAUTHORIZED, "Invalid authorization scheme"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid token"),
            AuthError::TokenExpired => (StatusCode::UNAUTHORIZED, "Token expired"),
            AuthError::InactiveUser => (StatusCode::FORBIDDEN, "Account is inactive"),
            AuthError::NotAdmin => (StatusCode::FORBIDDEN, "Admin access required"),
            AuthError::NotUser => (
                StatusCode::FORBIDDEN,
                "User token required for this operation",
            ),
            AuthError::InternalError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = json!({ "data": null, "error": message });

        let mut response = (status, Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                "WWW-Authenticate",
                HeaderValue::from_static("Bearer realm=\"formdesk\""),
            );
        }

        response
    }
}

impl From<TokenValidationError> for AuthError {
    fn from(e: TokenValidationError) -> Self {
        match e {
            TokenValidationError::InvalidScheme => AuthError::InvalidScheme,
            TokenValidationError::InvalidToken => AuthError::InvalidToken,
            TokenValidationError::TokenExpired => AuthError::TokenExpired,
            TokenValidationError::InactiveUser => AuthError::InactiveUser,
            TokenValidationError::InternalError => AuthError::InternalError,
        }
    }
}

fn extract_and_validate_token(
    parts: &Parts,
    state: &Arc<AppState>,
) -> Result<Option<ValidatedToken>, AuthError> {
    let auth_header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    match extract_token_from_header(auth_header)? {
        Some(raw_token) => Ok(Some(validate_token(state, &raw_token)?)),
        None => Ok(None),
    }
}

impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(match extract_and_validate_token(parts, state)? {
            None => Caller::Anonymous,
            Some(ValidatedToken {
                user: Some(user), ..
            }) => Caller::User(user),
            Some(ValidatedToken { token, user: None }) if token.is_admin => Caller::Admin(token),
            Some(_) => return Err(AuthError::InvalidToken),
        })
    }
}

impl FromRequestParts<Arc<AppState>> for RequireAdmin {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let validated = extract_and_validate_token(parts, state)?.ok_or(AuthError::MissingAuth)?;

        if !validated.token.is_admin {
            return Err(AuthError::NotAdmin);
        }

        Ok(RequireAdmin(validated.token))
    }
}

impl FromRequestParts<Arc<AppState>> for RequireUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let validated = extract_and_validate_token(parts, state)?.ok_or(AuthError::MissingAuth)?;

        if validated.token.is_admin {
            return Err(AuthError::NotUser);
        }

        let user = validated.user.ok_or(AuthError::NotUser)?;

        Ok(RequireUser {
            token: validated.token,
            user,
        })
    }
}

impl OptionalFromRequestParts<Arc<AppState>> for RequireUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Option<Self>, Self::Rejection> {
        match <Caller as FromRequestParts<Arc<AppState>>>::from_request_parts(parts, state).await? {
            Caller::User(user) => {
                let token = extract_and_validate_token(parts, state)?
                    .map(|v| v.token)
                    .ok_or(AuthError::InternalError)?;
                Ok(Some(RequireUser { token, user }))
            }
            _ => Ok(None),
        }
    }
}
