use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::query::QueryParams;
use crate::types::{Form, Metadata, Token};

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub is_staff: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateUserTokenRequest {
    #[serde(default)]
    pub expires_in_seconds: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PaginationParams {
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub id: String,
    pub is_admin: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

impl From<Token> for TokenResponse {
    fn from(token: Token) -> Self {
        Self {
            id: token.id,
            is_admin: token.is_admin,
            user_id: token.user_id,
            created_at: token.created_at,
            expires_at: token.expires_at,
            last_used_at: token.last_used_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateTokenResponse {
    pub token: String,
    pub metadata: TokenResponse,
}

/// Query string accepted by the data and activity APIs.
#[derive(Debug, Default, Deserialize)]
pub struct DocumentQueryParams {
    pub query: Option<String>,
    pub fields: Option<String>,
    pub sort: Option<String>,
    pub start: Option<String>,
    pub limit: Option<String>,
    pub count: Option<String>,
    pub callback: Option<String>,
}

impl DocumentQueryParams {
    #[must_use]
    pub fn query_params(&self) -> QueryParams {
        QueryParams {
            query: self.query.clone(),
            fields: self.fields.clone(),
            sort: self.sort.clone(),
            start: self.start.clone(),
            limit: self.limit.clone(),
            count: self.count.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub callback: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteParams {
    pub del: Option<String>,
    pub map_name_del: Option<String>,
}

impl DeleteParams {
    #[must_use]
    pub fn is_delete(&self) -> bool {
        self.del.as_deref() == Some("true") || self.map_name_del.as_deref() == Some("true")
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UsernameQuery {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct UserPermissions {
    pub user: String,
    pub permissions: String,
}

#[derive(Debug, Serialize)]
pub struct SmsSettings {
    pub allows_sms: bool,
    pub sms_id_string: String,
}

/// Everything the form page shows.
#[derive(Debug, Serialize)]
pub struct FormPayload {
    pub form: Form,
    pub content_user: String,
    pub is_owner: bool,
    pub can_edit: bool,
    pub can_view: bool,
    pub can_delete_data: bool,
    pub public_link: bool,
    pub cloned: bool,
    pub submission_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form_license: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_license: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Metadata>,
    pub supporting_docs: Vec<Metadata>,
    pub media: Vec<Metadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub users_with_perms: Option<Vec<UserPermissions>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sms: Option<SmsSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_upload_types: Option<String>,
}

/// Form summary served by the public API.
#[derive(Debug, Serialize)]
pub struct PublicFormInfo {
    pub username: String,
    pub id_string: String,
    pub shared: bool,
    pub shared_data: bool,
    pub downloadable: bool,
    pub title: String,
    pub date_created: String,
    pub date_modified: String,
    pub uuid: String,
}

#[derive(Debug, Serialize)]
pub struct GalleryResponse {
    pub shared_forms: Vec<GalleryForm>,
    /// id_strings of shared forms the caller already cloned.
    pub cloned: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct GalleryForm {
    pub username: String,
    #[serde(flatten)]
    pub form: Form,
}

#[derive(Debug, Serialize)]
pub struct Dashboard {
    pub user: crate::types::User,
    pub profile: crate::types::UserProfile,
    pub forms: Vec<Form>,
    pub shared_with_me: Vec<Form>,
    /// Every form the user can reach: owned plus granted.
    pub all_forms: Vec<Form>,
}

#[derive(Debug, Serialize)]
pub struct PublicProfile {
    pub username: String,
    pub is_owner: bool,
    pub profile: crate::types::UserProfile,
    pub shared_forms: Vec<Form>,
}

#[derive(Debug, Serialize)]
pub struct ProfileSettings {
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub profile: crate::types::UserProfile,
}
