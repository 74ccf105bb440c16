use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use serde_json::json;

use super::{form_page, load_form};
use crate::audit::{self, AuditBuilder};
use crate::auth::Caller;
use crate::error::Error;
use crate::forms::{FormAccess, FormMetadata, MetadataError};
use crate::server::AppState;
use crate::server::request::{FormFields, RequestMeta};
use crate::server::response::{ApiError, StoreResultExt};
use crate::types::{AuditAction, Form, MetadataKind, User};

fn shared_label(shared: bool) -> &'static str {
    if shared { "shared" } else { "not shared" }
}

fn metadata_error(e: MetadataError) -> ApiError {
    match e {
        MetadataError::ForbiddenUrl(_) => ApiError::forbidden(e.to_string()),
        MetadataError::UnsupportedMediaType(_) => ApiError::bad_request(e.to_string()),
        other => {
            tracing::error!("Metadata update failed: {other}");
            ApiError::internal("Failed to update form metadata")
        }
    }
}

fn is_truthy(value: Option<&str>) -> bool {
    matches!(
        value.map(str::to_ascii_lowercase).as_deref(),
        Some("true" | "on" | "1" | "yes")
    )
}

/// Applies one settings change to a form. The first recognised field wins.
pub async fn edit_form(
    caller: Caller,
    meta: RequestMeta,
    State(state): State<Arc<AppState>>,
    Path((username, id_string)): Path<(String, String)>,
    mut body: FormFields,
) -> Result<Response, ApiError> {
    let (owner, mut form) = load_form(&state, &username, &id_string)?;
    let access = FormAccess::resolve(state.store.as_ref(), &form, caller.user())
        .api_err("Failed to check access")?;
    if !access.can_edit() {
        return Err(ApiError::forbidden("Update failed."));
    }

    let actor = caller.username().to_string();
    let store = state.store.as_ref();
    let metadata = || FormMetadata::new(store, &state.media, &form, &owner.username);
    let event = |action: AuditAction, message: String| {
        AuditBuilder::new(action, actor.as_str(), owner.username.as_str(), message)
            .xform(&id_string)
            .client_ip(meta.client_ip.clone())
            .build()
    };

    let mut entries = Vec::new();
    let mut updated = form.clone();

    if let Some(description) = body.get("description") {
        entries.push(event(
            AuditAction::FormUpdated,
            format!(
                "Description for '{}' updated from '{}' to '{}'.",
                form.id_string,
                form.description.as_deref().unwrap_or_default(),
                description
            ),
        ));
        updated.description = Some(description.to_string());
    } else if let Some(title) = body.get("title") {
        entries.push(event(
            AuditAction::FormUpdated,
            format!(
                "Title for '{}' updated from '{}' to '{}'.",
                form.id_string, form.title, title
            ),
        ));
        updated.title = title.to_string();
    } else if let Some(toggle) = body.get("toggle_shared") {
        let (label, flag) = match toggle {
            "data" => ("Data sharing updated for", &mut updated.shared_data),
            "form" => ("Form sharing for", &mut updated.shared),
            "active" => ("Active status for", &mut updated.downloadable),
            other => return Err(ApiError::bad_request(format!("Unknown toggle {other}"))),
        };
        let old = *flag;
        *flag = !old;
        let verb = if toggle == "data" { "from" } else { "updated from" };
        entries.push(event(
            AuditAction::FormUpdated,
            format!(
                "{label} '{}' {verb} '{}' to '{}'.",
                form.id_string,
                shared_label(old),
                shared_label(!old)
            ),
        ));
    } else if let Some(license) = body.get("form-license") {
        let entry = event(
            AuditAction::FormUpdated,
            format!("Form License for '{}' updated to '{license}'.", form.id_string),
        );
        metadata()
            .audited(&entry)
            .set_license(MetadataKind::FormLicense, license)
            .map_err(metadata_error)?;
    } else if let Some(license) = body.get("data-license") {
        let entry = event(
            AuditAction::FormUpdated,
            format!("Data license for '{}' updated to '{license}'.", form.id_string),
        );
        metadata()
            .audited(&entry)
            .set_license(MetadataKind::DataLicense, license)
            .map_err(metadata_error)?;
    } else if body.get("source").is_some() || body.file("source").is_some() {
        let source = body.get("source").map(str::to_string);
        let file = body.take_file("source");
        let entry = event(
            AuditAction::FormUpdated,
            format!(
                "Source for '{}' updated to '{}'.",
                form.id_string,
                source.as_deref().unwrap_or("None")
            ),
        );
        metadata()
            .audited(&entry)
            .set_source(source.as_deref(), file)
            .await
            .map_err(metadata_error)?;
    } else if body.has("enable_sms_support_trigger") {
        let enabled = is_truthy(body.get("enable_sms_support"));
        let (action, message) = if enabled {
            (AuditAction::SmsSupportActivated, "SMS Support Activated on")
        } else {
            (AuditAction::SmsSupportDeactivated, "SMS Support Deactivated on")
        };
        entries.push(event(action, format!("{message} '{}'.", form.id_string)));
        updated.allows_sms = enabled;
        if let Some(sms_id) = body.get("sms_id_string") {
            updated.sms_id_string = sms_id.to_string();
        }
    } else if let Some(url) = body.get("media_url") {
        metadata().add_media_url(url).map_err(metadata_error)?;
    } else if body.file("media").is_some() {
        let files: Vec<_> = body.files_named("media").cloned().collect();
        let count = files.len();
        let entry = event(
            AuditAction::FormUpdated,
            format!("Media added to '{}'.", form.id_string),
        );
        // The entry is written with the last file.
        for (i, file) in files.into_iter().enumerate() {
            let accessor = if i + 1 == count {
                metadata().audited(&entry)
            } else {
                metadata()
            };
            accessor
                .add_media_file(file, &state.config.supported_media_upload_types)
                .await
                .map_err(metadata_error)?;
        }
    } else if let Some(file) = body.take_file("doc") {
        let entry = event(
            AuditAction::FormUpdated,
            format!("Supporting document added to '{}'.", form.id_string),
        );
        metadata()
            .audited(&entry)
            .add_supporting_doc(file)
            .await
            .map_err(metadata_error)?;
    }

    if has_form_changes(&form, &updated) {
        updated.updated_at = Utc::now();
        match store.update_form(&updated, &entries) {
            Ok(()) => {
                entries.iter().for_each(audit::trace);
                form = updated;
            }
            Err(Error::AlreadyExists) if updated.allows_sms != form.allows_sms
                || updated.sms_id_string != form.sms_id_string =>
            {
                tracing::warn!(
                    "SMS keyword '{}' already used by {}; keeping previous SMS settings",
                    updated.sms_id_string,
                    owner.username
                );
            }
            Err(Error::AlreadyExists) => {
                return Err(ApiError::conflict("Form settings conflict with another form"));
            }
            Err(e) => {
                tracing::error!("Failed to update form {}: {e}", form.id_string);
                return Err(ApiError::internal("Failed to update form"));
            }
        }
    }

    Ok(edit_response(&meta, &owner, &form))
}

fn has_form_changes(before: &Form, after: &Form) -> bool {
    before.title != after.title
        || before.description != after.description
        || before.shared != after.shared
        || before.shared_data != after.shared_data
        || before.downloadable != after.downloadable
        || before.allows_sms != after.allows_sms
        || before.sms_id_string != after.sms_id_string
}

fn edit_response(meta: &RequestMeta, owner: &User, form: &Form) -> Response {
    if meta.is_xhr {
        return Json(json!({ "status": "Updated succeeded." })).into_response();
    }
    let target = meta
        .referer
        .clone()
        .unwrap_or_else(|| form_page(owner, form));
    Redirect::to(&target).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthy_values() {
        assert!(is_truthy(Some("on")));
        assert!(is_truthy(Some("True")));
        assert!(!is_truthy(Some("off")));
        assert!(!is_truthy(None));
    }
}
