use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde_json::{Value, json};
use uuid::Uuid;

use super::load_form;
use crate::audit::{self, AuditBuilder};
use crate::auth::Caller;
use crate::forms::FormAccess;
use crate::query::DocumentQuery;
use crate::server::AppState;
use crate::server::dto::{CallbackParams, DocumentQueryParams};
use crate::server::request::{FormFields, RequestMeta};
use crate::server::response::{ApiError, ApiResponse, StoreResultExt, json_or_jsonp};
use crate::types::{AuditAction, Submission};

const SUBMISSION_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Flattens a submission into the document shape the query engine sees.
fn submission_document(submission: Submission) -> Value {
    let mut doc = match submission.data {
        Value::Object(map) => map,
        other => {
            let mut map = serde_json::Map::new();
            map.insert("data".to_string(), other);
            map
        }
    };
    doc.insert("_id".to_string(), json!(submission.id));
    doc.insert("_uuid".to_string(), json!(submission.uuid));
    doc.insert(
        "_submission_time".to_string(),
        json!(submission.created_at.format(SUBMISSION_TIME_FORMAT).to_string()),
    );
    Value::Object(doc)
}

/// Queries the submissions of a form.
pub async fn data_api(
    caller: Caller,
    State(state): State<Arc<AppState>>,
    Path((username, id_string)): Path<(String, String)>,
    Query(params): Query<DocumentQueryParams>,
) -> Result<Response, ApiError> {
    let (_, form) = load_form(&state, &username, &id_string)?;
    let access = FormAccess::resolve(state.store.as_ref(), &form, caller.user())
        .api_err("Failed to check access")?;
    if !access.can_read_data(&form) {
        return Err(ApiError::forbidden("Not shared."));
    }

    let query = DocumentQuery::parse(&params.query_params())?;
    let docs: Vec<Value> = state
        .store
        .list_submissions(&form.id)
        .api_err("Failed to list submissions")?
        .into_iter()
        .map(submission_document)
        .collect();

    tracing::debug!("Data API query on {}/{}: {} documents", username, id_string, docs.len());
    json_or_jsonp(&query.apply(docs), params.callback.as_deref())
}

/// Preflight; the CORS layer adds the headers.
pub async fn data_api_options() -> StatusCode {
    StatusCode::OK
}

pub async fn submit_data(
    caller: Caller,
    meta: RequestMeta,
    State(state): State<Arc<AppState>>,
    Path((username, id_string)): Path<(String, String)>,
    Json(data): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let (owner, form) = load_form(&state, &username, &id_string)?;
    let access = FormAccess::resolve(state.store.as_ref(), &form, caller.user())
        .api_err("Failed to check access")?;
    if !access.can_submit() {
        return Err(ApiError::forbidden("Permission denied."));
    }
    if !form.downloadable {
        return Err(ApiError::forbidden("Form is not accepting submissions."));
    }
    if !data.is_object() {
        return Err(ApiError::bad_request("Submission must be a JSON object"));
    }

    let mut submission = Submission {
        id: 0,
        form_id: form.id.clone(),
        uuid: Uuid::new_v4().to_string(),
        data,
        created_at: Utc::now(),
        deleted_at: None,
    };
    submission.id = state
        .store
        .create_submission(&submission)
        .api_err("Failed to store submission")?;

    let entry = AuditBuilder::new(
        AuditAction::SubmissionCreated,
        caller.username(),
        &owner.username,
        format!(
            "Created submission with id '{}' on '{}'.",
            submission.id, form.id_string
        ),
    )
    .xform(&form.id_string)
    .client_ip(meta.client_ip)
    .build();
    audit::record(state.store.as_ref(), &entry).api_err("Failed to write audit log")?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(submission_document(submission))),
    ))
}

/// Soft-deletes one submission (field `id`).
pub async fn delete_data(
    caller: Caller,
    meta: RequestMeta,
    State(state): State<Arc<AppState>>,
    Path((username, id_string)): Path<(String, String)>,
    Query(params): Query<CallbackParams>,
    body: FormFields,
) -> Result<Response, ApiError> {
    let (owner, form) = load_form(&state, &username, &id_string)?;
    let access = FormAccess::resolve(state.store.as_ref(), &form, caller.user())
        .api_err("Failed to check access")?;
    if !access.can_delete_data() {
        return Err(ApiError::forbidden("Permission denied."));
    }

    let Some(raw_id) = body.get("id") else {
        return Err(ApiError::bad_request("id must be specified"));
    };
    let record_id: i64 = raw_id
        .parse()
        .map_err(|_| ApiError::bad_request(format!("Invalid id {raw_id}")))?;

    let deleted = state
        .store
        .soft_delete_submission(&form.id, record_id)
        .api_err("Failed to delete submission")?;
    if !deleted {
        return Err(ApiError::not_found("Submission not found"));
    }

    let entry = AuditBuilder::new(
        AuditAction::SubmissionDeleted,
        caller.username(),
        &owner.username,
        format!(
            "Deleted submission with id '{record_id}' on '{}'.",
            form.id_string
        ),
    )
    .xform(&form.id_string)
    .client_ip(meta.client_ip)
    .build();
    audit::record(state.store.as_ref(), &entry).api_err("Failed to write audit log")?;

    let callback = params.callback.as_deref().filter(|c| !c.is_empty());
    json_or_jsonp(&json!({ "success": format!("Deleted data {record_id}") }), callback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submission_document_merges_bookkeeping_fields() {
        let doc = submission_document(Submission {
            id: 7,
            form_id: "f1".to_string(),
            uuid: "abc".to_string(),
            data: json!({"name": "Ann", "age": 31}),
            created_at: Utc::now(),
            deleted_at: None,
        });
        assert_eq!(doc["_id"], 7);
        assert_eq!(doc["_uuid"], "abc");
        assert_eq!(doc["name"], "Ann");
        assert!(doc["_submission_time"].is_string());
    }
}
