mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};

use common::{FilePart, TestApp, TestUser, body_json, body_text, survey_json};
use formdesk::store::Store;
use formdesk::types::MetadataKind;

async fn activity(app: &TestApp, user: &TestUser) -> Vec<Value> {
    let response = app
        .get(&format!("/{}/activity", user.username), Some(&user.token))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await.as_array().expect("array").clone()
}

async fn submit(app: &TestApp, user: &TestUser, id_string: &str, data: Value) -> i64 {
    let response = app
        .post_json(
            &format!("/{}/forms/{id_string}/submissions", user.username),
            Some(&user.token),
            data,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["data"]["_id"].as_i64().expect("submission id")
}

fn data_api_uri(user: &TestUser, id_string: &str, params: &[(&str, &str)]) -> String {
    let query: Vec<String> = params
        .iter()
        .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
        .collect();
    format!("/{}/forms/{id_string}/api?{}", user.username, query.join("&"))
}

// ============================================================================
// Publish
// ============================================================================

#[tokio::test]
async fn publish_creates_form_and_audits_once() {
    let app = TestApp::new();
    let alice = app.create_user("alice").await;

    let response = app.publish(&alice, "household").await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["type"], "alert-success");
    assert_eq!(body["form"]["id_string"], "household");
    assert!(
        body["preview_url"]
            .as_str()
            .expect("preview url")
            .contains("id=household")
    );

    let published: Vec<_> = activity(&app, &alice)
        .await
        .into_iter()
        .filter(|e| e["action"] == "form-published")
        .collect();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0]["msg"], "Published form 'household'.");
}

#[tokio::test]
async fn publish_duplicate_id_string_is_an_alert_error() {
    let app = TestApp::new();
    let alice = app.create_user("alice").await;

    assert_eq!(app.publish(&alice, "household").await.status(), StatusCode::CREATED);

    let response = app.publish(&alice, "household").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["type"], "alert-error");
    assert_eq!(body["text"], "Form with this id or SMS-keyword already exists.");
}

#[tokio::test]
async fn publish_invalid_definition_commits_nothing() {
    let app = TestApp::new();
    let alice = app.create_user("alice").await;

    let response = app
        .post_json(
            "/alice",
            Some(&alice.token),
            json!({ "text_xls_form": r#"{"id_string": "bad", "children": [{"type": "slider", "name": "a"}]}"# }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["type"], "alert-error");

    let forms = app.state.store.list_user_forms(&alice.id).expect("list forms");
    assert!(forms.is_empty());
    assert!(
        activity(&app, &alice)
            .await
            .iter()
            .all(|e| e["action"] != "form-published")
    );
}

#[tokio::test]
async fn publish_into_another_account_is_forbidden() {
    let app = TestApp::new();
    let alice = app.create_user("alice").await;
    app.create_user("bob").await;

    let response = app
        .post_json(
            "/bob",
            Some(&alice.token),
            json!({ "text_xls_form": common::survey_json("sneaky") }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn clone_shared_form_into_caller_account() {
    let app = TestApp::new();
    let alice = app.create_user("alice").await;
    let bob = app.create_user("bob").await;
    app.publish(&alice, "household").await;

    let request = json!({ "username": "alice", "id_string": "household" });
    let response = app.post_json("/bob/clone", Some(&bob.token), request.clone()).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    app.edit(&alice, "household", json!({ "toggle_shared": "form" })).await;

    let response = app.post_json("/bob/clone", Some(&bob.token), request).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await["form"]["id_string"], "household_cloned");

    let gallery = body_json(app.get("/forms/gallery", Some(&bob.token)).await).await;
    assert_eq!(gallery["data"]["cloned"], json!(["household"]));
}

#[tokio::test]
async fn update_replaces_schema_and_keeps_the_form() {
    let app = TestApp::new();
    let alice = app.create_user("alice").await;
    let bob = app.create_user("bob").await;
    let published = body_json(app.publish(&alice, "household").await).await;
    let uuid = published["form"]["uuid"].clone();

    let renamed = json!({
        "id_string": "household",
        "title": "Household survey v2",
        "children": [{"type": "text", "name": "name"}]
    })
    .to_string();

    let response = app
        .post_json(
            "/alice/forms/household/update",
            Some(&bob.token),
            json!({ "text_xls_form": renamed }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .post_json(
            "/alice/forms/household/update",
            Some(&alice.token),
            json!({ "text_xls_form": renamed }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["type"], "alert-success");

    let info = body_json(app.get("/alice/forms/household/public_api", None).await).await;
    assert_eq!(info["title"], "Household survey v2");
    assert_eq!(info["uuid"], uuid);

    let entries = activity(&app, &alice).await;
    assert!(entries.iter().any(|e| e["msg"] == "XLS for 'household' updated."));
}

#[tokio::test]
async fn update_with_another_id_string_is_an_alert_error() {
    let app = TestApp::new();
    let alice = app.create_user("alice").await;
    app.publish(&alice, "household").await;

    let response = app
        .post_json(
            "/alice/forms/household/update",
            Some(&alice.token),
            json!({ "text_xls_form": survey_json("census") }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["type"], "alert-error");

    let info = body_json(app.get("/alice/forms/household/public_api", None).await).await;
    assert_eq!(info["title"], "Household survey");
    assert!(
        !activity(&app, &alice)
            .await
            .iter()
            .any(|e| e["action"] == "form-xls-updated")
    );
}

#[tokio::test]
async fn clone_with_overlong_id_string_is_an_alert_error() {
    let app = TestApp::new();
    let alice = app.create_user("alice").await;
    let bob = app.create_user("bob").await;
    let long_id = "h".repeat(95);
    let response = app.publish(&alice, &long_id).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    app.edit(&alice, &long_id, json!({ "toggle_shared": "form" })).await;

    let response = app
        .post_json(
            "/bob/clone",
            Some(&bob.token),
            json!({ "username": "alice", "id_string": long_id }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["type"], "alert-error");
    assert!(app.state.store.list_user_forms(&bob.id).expect("list forms").is_empty());
}

// ============================================================================
// Permissions
// ============================================================================

#[tokio::test]
async fn set_perm_requires_edit_access() {
    let app = TestApp::new();
    let alice = app.create_user("alice").await;
    let bob = app.create_user("bob").await;
    app.publish(&alice, "household").await;

    let response = app
        .post_json(
            "/alice/forms/household/perms",
            Some(&bob.token),
            json!({ "perm_type": "edit", "for_user": "bob" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let grant = app
        .state
        .store
        .list_form_grants(
            &app.state
                .store
                .list_user_forms(&alice.id)
                .expect("forms")[0]
                .id,
        )
        .expect("grants");
    assert!(grant.is_empty());
}

#[tokio::test]
async fn granted_view_opens_the_form_and_remove_closes_it() {
    let app = TestApp::new();
    let alice = app.create_user("alice").await;
    let bob = app.create_user("bob").await;
    app.publish(&alice, "household").await;

    let response = app.get("/alice/forms/household", Some(&bob.token)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let response = app
        .post_json(
            "/alice/forms/household/perms",
            Some(&alice.token),
            json!({ "perm_type": "view", "for_user": "bob" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.get("/alice/forms/household", Some(&bob.token)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["can_view"], true);
    assert_eq!(body["data"]["can_edit"], false);

    let owner_view = body_json(app.get("/alice/forms/household", Some(&alice.token)).await).await;
    assert_eq!(
        owner_view["data"]["users_with_perms"][0]["permissions"],
        "Can View"
    );

    let response = app
        .post_json(
            "/alice/forms/household/perms",
            Some(&alice.token),
            json!({ "perm_type": "remove", "for_user": "bob" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.get("/alice/forms/household", Some(&bob.token)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let messages: Vec<String> = activity(&app, &alice)
        .await
        .iter()
        .filter(|e| e["action"] == "form-permissions-updated")
        .map(|e| e["msg"].as_str().unwrap_or_default().to_string())
        .collect();
    assert!(messages.contains(&"'view_xform' permission on 'household' assigned to 'bob'.".to_string()));
    assert!(messages.contains(&"All permissions on 'household' removed from 'bob'.".to_string()));
}

#[tokio::test]
async fn set_perm_rejects_unknown_user_and_permission() {
    let app = TestApp::new();
    let alice = app.create_user("alice").await;
    app.publish(&alice, "household").await;

    let response = app
        .post_json(
            "/alice/forms/household/perms",
            Some(&alice.token),
            json!({ "perm_type": "view", "for_user": "nobody" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .post_json(
            "/alice/forms/household/perms",
            Some(&alice.token),
            json!({ "perm_type": "superuser", "for_user": "alice" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn public_link_toggle_controls_uuid_access() {
    let app = TestApp::new();
    let alice = app.create_user("alice").await;
    let body = body_json(app.publish(&alice, "household").await).await;
    let uuid = body["form"]["uuid"].as_str().expect("uuid").to_string();

    let response = app.get(&format!("/forms/{uuid}"), None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let response = app
        .post_json(
            "/alice/forms/household/perms",
            Some(&alice.token),
            json!({ "perm_type": "link", "for_user": "toggle" }),
        )
        .await;
    assert_eq!(body_json(response).await["data"]["public_link"], true);

    let response = app.get(&format!("/forms/{uuid}"), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["can_view"], true);
    assert_eq!(body["data"]["public_link"], true);

    let response = app
        .post_json(
            "/alice/forms/household/perms",
            Some(&alice.token),
            json!({ "perm_type": "link", "for_user": "toggle" }),
        )
        .await;
    assert_eq!(body_json(response).await["data"]["public_link"], false);
}

// ============================================================================
// Edit and metadata
// ============================================================================

#[tokio::test]
async fn edit_updates_description_and_records_old_value() {
    let app = TestApp::new();
    let alice = app.create_user("alice").await;
    app.publish(&alice, "household").await;

    let response = app
        .edit(&alice, "household", json!({ "description": "Round two" }))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "Updated succeeded.");

    let form = body_json(app.get("/alice/forms/household", Some(&alice.token)).await).await;
    assert_eq!(form["data"]["form"]["description"], "Round two");

    assert!(activity(&app, &alice).await.iter().any(|e| {
        e["msg"] == "Description for 'household' updated from '' to 'Round two'."
    }));
}

#[tokio::test]
async fn edit_without_edit_access_fails() {
    let app = TestApp::new();
    let alice = app.create_user("alice").await;
    let bob = app.create_user("bob").await;
    app.publish(&alice, "household").await;

    let response = app
        .post_json(
            "/alice/forms/household/edit",
            Some(&bob.token),
            json!({ "title": "Mine now" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["error"], "Update failed.");
}

#[tokio::test]
async fn toggle_shared_flips_the_flag() {
    let app = TestApp::new();
    let alice = app.create_user("alice").await;
    app.publish(&alice, "household").await;

    app.edit(&alice, "household", json!({ "toggle_shared": "data" })).await;
    let info = body_json(app.get("/alice/forms/household/public_api", None).await).await;
    assert_eq!(info["shared_data"], true);
    assert_eq!(info["shared"], false);

    app.edit(&alice, "household", json!({ "toggle_shared": "data" })).await;
    let info = body_json(app.get("/alice/forms/household/public_api", None).await).await;
    assert_eq!(info["shared_data"], false);
}

#[tokio::test]
async fn license_upsert_keeps_a_single_record() {
    let app = TestApp::new();
    let alice = app.create_user("alice").await;
    app.publish(&alice, "household").await;

    app.edit(&alice, "household", json!({ "form-license": "CC-BY" })).await;
    app.edit(&alice, "household", json!({ "form-license": "CC0" })).await;

    let form = app
        .state
        .store
        .get_form_by_id_string(&alice.id, "household")
        .expect("get form")
        .expect("form exists");
    let licenses = app
        .state
        .store
        .list_metadata(&form.id, MetadataKind::FormLicense)
        .expect("list metadata");
    assert_eq!(licenses.len(), 1);
    assert_eq!(licenses[0].data_value.as_deref(), Some("CC0"));

    let payload = body_json(app.get("/alice/forms/household", Some(&alice.token)).await).await;
    assert_eq!(payload["data"]["form_license"], "CC0");
}

#[tokio::test]
async fn media_url_pointing_at_private_network_is_forbidden() {
    let app = TestApp::new();
    let alice = app.create_user("alice").await;
    app.publish(&alice, "household").await;

    let response = app
        .edit(
            &alice,
            "household",
            json!({ "media_url": "http://169.254.169.254/latest/meta-data" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let payload = body_json(app.get("/alice/forms/household", Some(&alice.token)).await).await;
    assert_eq!(payload["data"]["media"], json!([]));
}

#[tokio::test]
async fn media_url_redirects_and_can_be_deleted() {
    let app = TestApp::new();
    let alice = app.create_user("alice").await;
    app.publish(&alice, "household").await;

    let response = app
        .edit(
            &alice,
            "household",
            json!({ "media_url": "https://example.org/logo.png" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let payload = body_json(app.get("/alice/forms/household", Some(&alice.token)).await).await;
    let media_id = payload["data"]["media"][0]["id"].as_i64().expect("media id");

    let response = app
        .get(&format!("/alice/forms/household/formid-media/{media_id}"), None)
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers()[header::LOCATION],
        "https://example.org/logo.png"
    );

    let response = app
        .get(
            &format!("/alice/forms/household/formid-media/{media_id}?del=true"),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .get(
            &format!("/alice/forms/household/formid-media/{media_id}?del=true"),
            Some(&alice.token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let payload = body_json(app.get("/alice/forms/household", Some(&alice.token)).await).await;
    assert_eq!(payload["data"]["media"], json!([]));
}

#[tokio::test]
async fn sms_support_toggle_is_audited() {
    let app = TestApp::new();
    let alice = app.create_user("alice").await;
    app.publish(&alice, "household").await;

    let response = app
        .edit(
            &alice,
            "household",
            json!({
                "enable_sms_support_trigger": "1",
                "enable_sms_support": "on",
                "sms_id_string": "hh"
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let payload = body_json(app.get("/alice/forms/household", Some(&alice.token)).await).await;
    assert_eq!(payload["data"]["sms"]["allows_sms"], true);
    assert_eq!(payload["data"]["sms"]["sms_id_string"], "hh");

    app.edit(&alice, "household", json!({ "enable_sms_support_trigger": "1" }))
        .await;
    let payload = body_json(app.get("/alice/forms/household", Some(&alice.token)).await).await;
    assert_eq!(payload["data"]["sms"]["allows_sms"], false);

    let messages: Vec<Value> = activity(&app, &alice)
        .await
        .into_iter()
        .map(|e| e["msg"].clone())
        .collect();
    assert!(messages.contains(&json!("SMS Support Activated on 'household'.")));
    assert!(messages.contains(&json!("SMS Support Deactivated on 'household'.")));
}

#[tokio::test]
async fn sms_keyword_conflict_keeps_previous_settings() {
    let app = TestApp::new();
    let alice = app.create_user("alice").await;
    app.publish(&alice, "household").await;
    app.publish(&alice, "census").await;

    app.edit(
        &alice,
        "household",
        json!({
            "enable_sms_support_trigger": "1",
            "enable_sms_support": "on",
            "sms_id_string": "hh"
        }),
    )
    .await;

    let response = app
        .edit(
            &alice,
            "census",
            json!({
                "enable_sms_support_trigger": "1",
                "enable_sms_support": "on",
                "sms_id_string": "hh"
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let payload = body_json(app.get("/alice/forms/census", Some(&alice.token)).await).await;
    assert_eq!(payload["data"]["sms"]["allows_sms"], false);
    assert_eq!(payload["data"]["sms"]["sms_id_string"], "census");
    assert!(
        !activity(&app, &alice)
            .await
            .iter()
            .any(|e| e["msg"] == "SMS Support Activated on 'census'.")
    );
}

#[tokio::test]
async fn supporting_doc_downloads_for_owner_and_shared_forms() {
    let app = TestApp::new();
    let alice = app.create_user("alice").await;
    let bob = app.create_user("bob").await;
    app.publish(&alice, "household").await;

    let response = app
        .edit_files(
            &alice,
            "household",
            &[FilePart {
                field: "doc",
                file_name: "notes.txt",
                content_type: "text/plain",
                data: b"field notes",
            }],
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let payload = body_json(app.get("/alice/forms/household", Some(&alice.token)).await).await;
    let doc = &payload["data"]["supporting_docs"][0];
    let doc_id = doc["id"].as_i64().expect("doc id");
    assert_eq!(doc["data_file"], "alice/docs/notes.txt");
    assert!(doc["file_hash"].as_str().is_some_and(|h| h.starts_with("sha256:")));

    let uri = format!("/alice/forms/household/doc/{doc_id}");
    let response = app.get(&uri, Some(&bob.token)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.get(&uri, Some(&alice.token)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"notes.txt\""
    );
    assert_eq!(body_text(response).await, "field notes");

    app.edit(&alice, "household", json!({ "toggle_shared": "form" })).await;
    let response = app.get(&uri, Some(&bob.token)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.get("/alice/forms/household/doc/9999", Some(&alice.token)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let messages: Vec<Value> = activity(&app, &alice)
        .await
        .into_iter()
        .map(|e| e["msg"].clone())
        .collect();
    assert!(messages.contains(&json!("Supporting document added to 'household'.")));
    assert!(messages.contains(&json!("Document 'notes.txt' for 'household' downloaded.")));
}

#[tokio::test]
async fn delete_doc_removes_record_and_file() {
    let app = TestApp::new();
    let alice = app.create_user("alice").await;
    let bob = app.create_user("bob").await;
    app.publish(&alice, "household").await;
    app.edit_files(
        &alice,
        "household",
        &[FilePart {
            field: "doc",
            file_name: "notes.txt",
            content_type: "text/plain",
            data: b"field notes",
        }],
    )
    .await;

    let payload = body_json(app.get("/alice/forms/household", Some(&alice.token)).await).await;
    let doc_id = payload["data"]["supporting_docs"][0]["id"].as_i64().expect("doc id");
    let file = app.state.config.media_dir().join("alice/docs/notes.txt");
    assert!(file.exists());

    let uri = format!("/alice/forms/household/delete-doc/{doc_id}?del=true");
    let response = app.get(&uri, Some(&bob.token)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .get(&format!("/alice/forms/household/delete-doc/{doc_id}"), Some(&alice.token))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.get(&uri, Some(&alice.token)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/alice/forms/household");
    assert!(!file.exists());

    let payload = body_json(app.get("/alice/forms/household", Some(&alice.token)).await).await;
    assert_eq!(payload["data"]["supporting_docs"], json!([]));
    assert!(
        activity(&app, &alice)
            .await
            .iter()
            .any(|e| e["msg"] == "Document 'notes.txt' deleted from 'household'.")
    );
}

#[tokio::test]
async fn map_layer_delete_drops_only_the_record() {
    let app = TestApp::new();
    let alice = app.create_user("alice").await;
    app.publish(&alice, "household").await;
    app.edit_files(
        &alice,
        "household",
        &[FilePart {
            field: "doc",
            file_name: "layer.csv",
            content_type: "text/csv",
            data: b"lat,lon",
        }],
    )
    .await;

    let payload = body_json(app.get("/alice/forms/household", Some(&alice.token)).await).await;
    let doc_id = payload["data"]["supporting_docs"][0]["id"].as_i64().expect("doc id");

    let response = app
        .get(
            &format!("/alice/forms/household/delete-doc/{doc_id}?map_name_del=true"),
            Some(&alice.token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let payload = body_json(app.get("/alice/forms/household", Some(&alice.token)).await).await;
    assert_eq!(payload["data"]["supporting_docs"], json!([]));
    assert!(app.state.config.media_dir().join("alice/docs/layer.csv").exists());
    assert!(
        activity(&app, &alice)
            .await
            .iter()
            .any(|e| e["msg"] == "Map layer deleted from 'household'.")
    );
}

#[tokio::test]
async fn delete_doc_fails_when_the_file_cannot_be_removed() {
    let app = TestApp::new();
    let alice = app.create_user("alice").await;
    app.publish(&alice, "household").await;
    app.edit_files(
        &alice,
        "household",
        &[FilePart {
            field: "doc",
            file_name: "notes.txt",
            content_type: "text/plain",
            data: b"field notes",
        }],
    )
    .await;

    let payload = body_json(app.get("/alice/forms/household", Some(&alice.token)).await).await;
    let doc_id = payload["data"]["supporting_docs"][0]["id"].as_i64().expect("doc id");

    // A non-empty directory where the file was cannot be removed as a file.
    let file = app.state.config.media_dir().join("alice/docs/notes.txt");
    std::fs::remove_file(&file).expect("remove file");
    std::fs::create_dir_all(file.join("inner")).expect("create directory");

    let response = app
        .get(
            &format!("/alice/forms/household/delete-doc/{doc_id}?del=true"),
            Some(&alice.token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let payload = body_json(app.get("/alice/forms/household", Some(&alice.token)).await).await;
    assert_eq!(payload["data"]["supporting_docs"][0]["id"], doc_id);
    assert!(
        !activity(&app, &alice)
            .await
            .iter()
            .any(|e| e["msg"] == "Document 'notes.txt' deleted from 'household'.")
    );
}

#[tokio::test]
async fn media_endpoint_does_not_redirect_to_non_media_records() {
    let app = TestApp::new();
    let alice = app.create_user("alice").await;
    app.publish(&alice, "household").await;
    app.edit(
        &alice,
        "household",
        json!({ "form-license": "https://example.org/licence" }),
    )
    .await;

    let form = app
        .state
        .store
        .get_form_by_id_string(&alice.id, "household")
        .expect("get form")
        .expect("form exists");
    let license = app
        .state
        .store
        .list_metadata(&form.id, MetadataKind::FormLicense)
        .expect("list metadata")
        .remove(0);

    let response = app
        .get(
            &format!("/alice/forms/household/formid-media/{}", license.id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn media_upload_is_stored_and_type_checked() {
    let app = TestApp::new();
    let alice = app.create_user("alice").await;
    app.publish(&alice, "household").await;

    let response = app
        .edit_files(
            &alice,
            "household",
            &[FilePart {
                field: "media",
                file_name: "run.exe",
                content_type: "application/x-msdownload",
                data: b"MZ",
            }],
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .edit_files(
            &alice,
            "household",
            &[
                FilePart {
                    field: "media",
                    file_name: "logo.png",
                    content_type: "image/png",
                    data: b"png-one",
                },
                FilePart {
                    field: "media",
                    file_name: "logo.png",
                    content_type: "image/png",
                    data: b"png-two",
                },
            ],
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let payload = body_json(app.get("/alice/forms/household", Some(&alice.token)).await).await;
    let media = payload["data"]["media"].as_array().expect("media list").clone();
    assert_eq!(media.len(), 2);
    assert_ne!(media[0]["data_file"], media[1]["data_file"]);

    let media_id = media[1]["id"].as_i64().expect("media id");
    let response = app
        .get(&format!("/alice/forms/household/formid-media/{media_id}"), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "png-two");

    let added = activity(&app, &alice)
        .await
        .into_iter()
        .filter(|e| e["msg"] == "Media added to 'household'.")
        .count();
    assert_eq!(added, 1);
}

// ============================================================================
// Data API
// ============================================================================

#[tokio::test]
async fn data_api_requires_data_access() {
    let app = TestApp::new();
    let alice = app.create_user("alice").await;
    app.publish(&alice, "household").await;

    let response = app.get(&data_api_uri(&alice, "household", &[]), None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["error"], "Not shared.");

    app.edit(&alice, "household", json!({ "toggle_shared": "data" })).await;

    let response = app.get(&data_api_uri(&alice, "household", &[]), None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn data_api_filters_counts_and_pages() {
    let app = TestApp::new();
    let alice = app.create_user("alice").await;
    app.publish(&alice, "household").await;

    submit(&app, &alice, "household", json!({ "name": "Ann", "age": 31 })).await;
    submit(&app, &alice, "household", json!({ "name": "Bob", "age": 40 })).await;
    submit(&app, &alice, "household", json!({ "name": "Cy", "age": 22 })).await;

    let uri = data_api_uri(
        &alice,
        "household",
        &[
            ("query", r#"{"$or": [{"name": "Ann"}, {"name": "Cy"}]}"#),
            ("sort", r#"{"age": -1}"#),
            ("fields", r#"["name"]"#),
        ],
    );
    let body = body_json(app.get(&uri, Some(&alice.token)).await).await;
    assert_eq!(body, json!([{ "name": "Ann" }, { "name": "Cy" }]));

    let uri = data_api_uri(&alice, "household", &[("count", "1")]);
    let body = body_json(app.get(&uri, Some(&alice.token)).await).await;
    assert_eq!(body, json!([{ "count": 3 }]));

    let uri = data_api_uri(
        &alice,
        "household",
        &[("sort", r#"{"age": 1}"#), ("start", "1"), ("limit", "1")],
    );
    let body = body_json(app.get(&uri, Some(&alice.token)).await).await;
    assert_eq!(body[0]["name"], "Ann");
    assert_eq!(body.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn data_api_rejects_operators_outside_the_whitelist() {
    let app = TestApp::new();
    let alice = app.create_user("alice").await;
    app.publish(&alice, "household").await;

    let uri = data_api_uri(&alice, "household", &[("query", r#"{"$where": "1"}"#)]);
    let response = app.get(&uri, Some(&alice.token)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let uri = data_api_uri(&alice, "household", &[("limit", "lots")]);
    let response = app.get(&uri, Some(&alice.token)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn data_api_wraps_jsonp_and_sends_cors_headers() {
    let app = TestApp::new();
    let alice = app.create_user("alice").await;
    app.publish(&alice, "household").await;

    let request = Request::get(data_api_uri(&alice, "household", &[("callback", "render")]))
        .header(header::AUTHORIZATION, format!("Bearer {}", alice.token))
        .header(header::ORIGIN, "https://dashboard.example.org")
        .body(Body::empty())
        .expect("build request");
    let response = app.request(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(body_text(response).await, "render([])");
}

#[tokio::test]
async fn submissions_are_refused_on_inactive_forms() {
    let app = TestApp::new();
    let alice = app.create_user("alice").await;
    app.publish(&alice, "household").await;

    app.edit(&alice, "household", json!({ "toggle_shared": "active" })).await;

    let response = app
        .post_json(
            "/alice/forms/household/submissions",
            Some(&alice.token),
            json!({ "name": "Ann" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn delete_data_soft_deletes_and_audits() {
    let app = TestApp::new();
    let alice = app.create_user("alice").await;
    app.publish(&alice, "household").await;
    let id = submit(&app, &alice, "household", json!({ "name": "Ann" })).await;

    let response = app
        .post_json("/alice/forms/household/delete_data", Some(&alice.token), json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post_json(
            "/alice/forms/household/delete_data?callback=done",
            Some(&alice.token),
            json!({ "id": id.to_string() }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_text(response).await,
        format!(r#"done({{"success":"Deleted data {id}"}})"#)
    );

    let uri = data_api_uri(&alice, "household", &[("count", "1")]);
    let body = body_json(app.get(&uri, Some(&alice.token)).await).await;
    assert_eq!(body, json!([{ "count": 0 }]));

    assert!(
        activity(&app, &alice)
            .await
            .iter()
            .any(|e| e["action"] == "submission-deleted")
    );
}

// ============================================================================
// Read endpoints
// ============================================================================

#[tokio::test]
async fn form_settings_lists_media_upload_types() {
    let app = TestApp::new();
    let alice = app.create_user("alice").await;
    let bob = app.create_user("bob").await;
    app.publish(&alice, "household").await;

    let response = app
        .get("/alice/forms/household/form_settings", Some(&alice.token))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let payload = body_json(response).await;
    let accept = payload["data"]["media_upload_types"].as_str().expect("accept list");
    assert!(accept.contains(".png,image/png"));
    assert!(accept.contains(".csv,text/csv"));

    let payload = body_json(app.get("/alice/forms/household", Some(&alice.token)).await).await;
    assert!(payload["data"].get("media_upload_types").is_none());

    let response = app
        .get("/alice/forms/household/form_settings", Some(&bob.token))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/");
}

#[tokio::test]
async fn public_api_reports_form_summary() {
    let app = TestApp::new();
    let alice = app.create_user("alice").await;
    app.publish(&alice, "household").await;

    let info = body_json(app.get("/alice/forms/household/public_api", None).await).await;
    assert_eq!(info["username"], "alice");
    assert_eq!(info["id_string"], "household");
    assert_eq!(info["title"], "Household survey");
    assert_eq!(info["downloadable"], true);
    assert_eq!(info["date_created"].as_str().map(str::len), Some(19));
}

#[tokio::test]
async fn preview_redirects_to_enketo_for_viewers_only() {
    let app = TestApp::new();
    let alice = app.create_user("alice").await;
    app.publish(&alice, "household").await;

    let response = app.get("/alice/forms/household/preview", None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .get("/alice/forms/household/preview", Some(&alice.token))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = response.headers()[header::LOCATION].to_str().expect("location");
    assert!(location.ends_with("?server=http%3A%2F%2Fforms.test%2Falice&id=household"));
}

#[tokio::test]
async fn activity_is_owner_only_and_queryable() {
    let app = TestApp::new();
    let alice = app.create_user("alice").await;
    let bob = app.create_user("bob").await;
    app.publish(&alice, "household").await;

    let response = app.get("/alice/activity", Some(&bob.token)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let query = urlencoding::encode(r#"{"action": "form-published"}"#);
    let response = app
        .get(
            &format!("/alice/activity?query={query}&count=1"),
            Some(&alice.token),
        )
        .await;
    assert_eq!(body_json(response).await, json!([{ "count": 1 }]));

    let fields = body_json(app.get("/activity/fields", None).await).await;
    let options = fields[1]["options"].as_array().expect("action options");
    assert!(options.iter().any(|o| o["value"] == "form-published"));
}

#[tokio::test]
async fn profile_shows_dashboard_to_owner_only() {
    let app = TestApp::new();
    let alice = app.create_user("alice").await;
    let bob = app.create_user("bob").await;
    app.publish(&alice, "household").await;

    let own = body_json(app.get("/alice", Some(&alice.token)).await).await;
    assert_eq!(own["data"]["forms"][0]["id_string"], "household");

    let other = body_json(app.get("/alice", Some(&bob.token)).await).await;
    assert!(other["data"].get("forms").is_none());
    assert_eq!(other["data"]["shared_forms"], json!([]));

    app.get("/alice/profile", Some(&bob.token)).await;
    assert!(
        activity(&app, &alice)
            .await
            .iter()
            .any(|e| e["action"] == "public-profile-accessed" && e["user"] == "bob")
    );
}

#[tokio::test]
async fn profile_settings_validate_and_persist() {
    let app = TestApp::new();
    let alice = app.create_user("alice").await;
    let bob = app.create_user("bob").await;

    let response = app
        .post_json("/alice/settings", Some(&bob.token), json!({ "city": "Nairobi" }))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .post_json(
            "/alice/settings",
            Some(&alice.token),
            json!({ "home_page": "ftp://example.org" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post_json(
            "/alice/settings",
            Some(&alice.token),
            json!({ "city": "Nairobi", "home_page": "example.org" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let settings = body_json(app.get("/alice/settings", Some(&alice.token)).await).await;
    assert_eq!(settings["data"]["profile"]["city"], "Nairobi");
}

#[tokio::test]
async fn api_token_is_issued_for_self_only() {
    let app = TestApp::new();
    let alice = app.create_user("alice").await;
    let bob = app.create_user("bob").await;

    let response = app.post_json("/alice/api-token", Some(&bob.token), json!({})).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.post_json("/alice/api-token", Some(&alice.token), json!({})).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let raw = body_json(response).await["data"]["token"]
        .as_str()
        .expect("token")
        .to_string();

    let tokens = body_json(app.get("/alice/api-token", Some(&raw)).await).await;
    assert_eq!(tokens["data"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn people_list_is_staff_only() {
    let app = TestApp::new();
    let alice = app.create_user("alice").await;

    let response = app.get("/people", Some(&alice.token)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.get("/people", Some(&app.admin_token)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"][0]["username"], "alice");
}

#[tokio::test]
async fn username_list_matches_prefix() {
    let app = TestApp::new();
    let alice = app.create_user("alice").await;
    app.create_user("albert").await;
    app.create_user("bob").await;

    let names = body_json(app.get("/users?query=al", Some(&alice.token)).await).await;
    assert_eq!(names, json!(["albert", "alice"]));

    let response = app.get("/users?query=al", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn invalid_token_is_rejected() {
    let app = TestApp::new();

    let response = app.get("/people", Some("fd_nope_nope")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_rejects_reserved_and_duplicate_usernames() {
    let app = TestApp::new();
    app.create_user("alice").await;

    let response = app
        .post_json(
            "/api/v1/admin/users",
            Some(&app.admin_token),
            json!({ "username": "alice" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .post_json(
            "/api/v1/admin/users",
            Some(&app.admin_token),
            json!({ "username": "forms" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
