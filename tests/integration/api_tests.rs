//! API integration tests
//!
//! End-to-end tests through the router: authentication, audit log access
//! control, policy management, and reporting endpoints.

use axum::http::StatusCode;
use serde_json::{json, Value};

use crate::common::{TestApp, ADMIN_EMAIL, STAFF_EMAIL, TEST_PASSWORD};

#[tokio::test]
async fn health_check_works_without_auth() {
    let app = TestApp::new().await;
    let response = app.get("/api/v1/health").await;
    response.assert_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn login_returns_token_and_writes_login_record() {
    let app = TestApp::new().await;

    let response = app
        .post_json(
            "/api/v1/auth/login",
            json!({"email": ADMIN_EMAIL, "password": TEST_PASSWORD}),
        )
        .await;
    response.assert_ok();
    let body: Value = response.json();
    assert!(body["access_token"].as_str().unwrap().len() > 20);
    assert_eq!(body["user"]["email"], ADMIN_EMAIL);

    // The login shows up in the trail
    let token = body["access_token"].as_str().unwrap();
    let logs = app
        .get_auth("/api/v1/audit-logs?entity_type=session", token)
        .await;
    logs.assert_ok();
    let page: Value = logs.json();
    let records = page["records"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["operation"], "LOGIN");
    assert_eq!(records[0]["actor_email"], ADMIN_EMAIL);
    assert_eq!(records[0]["success"], true);
}

#[tokio::test]
async fn failed_login_is_recorded_without_actor() {
    let app = TestApp::new().await;

    app.post_json(
        "/api/v1/auth/login",
        json!({"email": ADMIN_EMAIL, "password": "wrong"}),
    )
    .await
    .assert_unauthorized();

    let token = app.admin_token();
    let logs = app
        .get_auth("/api/v1/audit-logs?entity_type=session", &token)
        .await;
    let page: Value = logs.json();
    let records = page["records"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["success"], false);
    assert!(records[0]["actor_id"].is_null());
}

#[tokio::test]
async fn logout_writes_logout_record() {
    let app = TestApp::new().await;
    let token = app.admin_token();

    app.post_auth("/api/v1/auth/logout", &token).await.assert_ok();

    let logs = app
        .get_auth("/api/v1/audit-logs?operation=LOGOUT", &token)
        .await;
    let page: Value = logs.json();
    assert_eq!(page["records"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn me_returns_current_user() {
    let app = TestApp::new().await;
    let token = app.staff_token();

    let response = app.get_auth("/api/v1/auth/me", &token).await;
    response.assert_ok();
    let body: Value = response.json();
    assert_eq!(body["email"], STAFF_EMAIL);
    assert_eq!(body["role"], "staff");
    assert!(body.get("password_hash").is_none());
}

#[tokio::test]
async fn audit_logs_require_auth_and_role() {
    let app = TestApp::new().await;

    // No token
    app.get("/api/v1/audit-logs").await.assert_unauthorized();

    // Staff role lacks access
    let staff = app.staff_token();
    app.get_auth("/api/v1/audit-logs", &staff)
        .await
        .assert_forbidden();

    // Admin passes
    let admin = app.admin_token();
    app.get_auth("/api/v1/audit-logs", &admin).await.assert_ok();
}

#[tokio::test]
async fn audit_log_listing_validates_query() {
    let app = TestApp::new().await;
    let token = app.admin_token();

    app.get_auth("/api/v1/audit-logs?limit=0", &token)
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    app.get_auth("/api/v1/audit-logs?limit=9999", &token)
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    app.get_auth(
        "/api/v1/audit-logs?from=2026-02-01T00:00:00Z&to=2026-01-01T00:00:00Z",
        &token,
    )
    .await
    .assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    app.get_auth("/api/v1/audit-logs?cursor=garbage", &token)
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn listing_pages_through_next_cursor_without_duplicates() {
    let app = TestApp::new().await;
    let token = app.admin_token();

    for _ in 0..3 {
        app.post_auth("/api/v1/auth/logout", &token).await.assert_ok();
    }

    let page1: Value = app
        .get_auth("/api/v1/audit-logs?operation=LOGOUT&limit=2", &token)
        .await
        .json();
    let first_ids: Vec<&str> = page1["records"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_str().unwrap())
        .collect();
    assert_eq!(first_ids.len(), 2);
    let cursor = page1["next_cursor"].as_str().unwrap().to_string();

    // Each listing appends its own ACCESS record; the cursor keeps the
    // second page pinned below the first regardless
    let page2: Value = app
        .get_auth(
            &format!(
                "/api/v1/audit-logs?operation=LOGOUT&limit=2&cursor={}",
                urlencode(&cursor)
            ),
            &token,
        )
        .await
        .json();
    let records = page2["records"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert!(!first_ids.contains(&records[0]["id"].as_str().unwrap()));
    assert!(page2["next_cursor"].is_null());
}

/// Percent-encode a cursor for use in a query string
fn urlencode(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '|' => "%7C".to_string(),
            '+' => "%2B".to_string(),
            ':' => "%3A".to_string(),
            other => other.to_string(),
        })
        .collect()
}

#[tokio::test]
async fn audit_log_get_by_id_and_missing_id() {
    let app = TestApp::new().await;
    let token = app.admin_token();

    // Produce one record via logout
    app.post_auth("/api/v1/auth/logout", &token).await.assert_ok();

    let page: Value = app
        .get_auth("/api/v1/audit-logs?operation=LOGOUT", &token)
        .await
        .json();
    let id = page["records"][0]["id"].as_str().unwrap().to_string();

    let single = app
        .get_auth(&format!("/api/v1/audit-logs/{}", id), &token)
        .await;
    single.assert_ok();
    let record: Value = single.json();
    assert_eq!(record["id"], id.as_str());

    app.get_auth(
        &format!("/api/v1/audit-logs/{}", uuid::Uuid::new_v4()),
        &token,
    )
    .await
    .assert_not_found();
}

#[tokio::test]
async fn listing_the_trail_is_itself_recorded_as_access() {
    let app = TestApp::new().await;
    let token = app.admin_token();

    app.get_auth("/api/v1/audit-logs", &token).await.assert_ok();

    let page: Value = app
        .get_auth("/api/v1/audit-logs?operation=ACCESS", &token)
        .await
        .json();
    let records = page["records"].as_array().unwrap();
    assert!(!records.is_empty());
    assert_eq!(records[0]["action"], "audit_log.list");
}

#[tokio::test]
async fn csv_export_sets_headers_and_contains_records() {
    let app = TestApp::new().await;
    let token = app.admin_token();

    app.post_auth("/api/v1/auth/logout", &token).await.assert_ok();

    let response = app
        .get_auth("/api/v1/audit-logs/export?format=csv", &token)
        .await;
    response.assert_ok();
    assert!(response.headers["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/csv"));
    let body = response.text();
    assert!(body.starts_with("id,created_at,operation"));
    assert!(body.contains("LOGOUT"));

    app.get_auth("/api/v1/audit-logs/export?format=pdf", &token)
        .await
        .assert_bad_request();
}

#[tokio::test]
async fn policy_listing_and_lookup() {
    let app = TestApp::new().await;
    let token = app.admin_token();

    let response = app.get_auth("/api/v1/audit-policies", &token).await;
    response.assert_ok();
    let policies: Value = response.json();
    let names: Vec<&str> = policies
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["entity_type"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"student"));
    assert!(names.contains(&"fee_payment"));

    // Unknown entity type answers with the disabled default
    let fallback: Value = app
        .get_auth("/api/v1/audit-policies/cafeteria_menu", &token)
        .await
        .json();
    assert_eq!(fallback["enabled"], false);
}

#[tokio::test]
async fn policy_upsert_is_admin_only_and_audited() {
    let app = TestApp::new().await;
    let staff = app.staff_token();
    let admin = app.admin_token();

    let body = json!({
        "entity_type": "class",
        "module": "academics",
        "enabled": true,
        "track_reads": true,
        "retention_days": 365
    });

    app.put_json_auth("/api/v1/audit-policies", body.clone(), &staff)
        .await
        .assert_forbidden();

    let response = app
        .put_json_auth("/api/v1/audit-policies", body, &admin)
        .await;
    response.assert_ok();
    let policy: Value = response.json();
    assert_eq!(policy["track_reads"], true);
    assert_eq!(policy["retention_days"], 365);

    // The change itself shows up in the trail
    let page: Value = app
        .get_auth("/api/v1/audit-logs?entity_type=audit_policy", &admin)
        .await
        .json();
    let records = page["records"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["operation"], "UPDATE");
    assert_eq!(records[0]["record_id"], "class");
}

#[tokio::test]
async fn first_time_policy_registration_is_recorded_as_create() {
    let app = TestApp::new().await;
    let admin = app.admin_token();

    let body = json!({
        "entity_type": "cafeteria_menu",
        "module": "food",
        "enabled": true,
        "retention_days": 90
    });
    app.put_json_auth("/api/v1/audit-policies", body, &admin)
        .await
        .assert_ok();

    let page: Value = app
        .get_auth("/api/v1/audit-logs?entity_type=audit_policy", &admin)
        .await
        .json();
    let records = page["records"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["operation"], "CREATE");
    assert_eq!(records[0]["record_id"], "cafeteria_menu");
    assert!(records[0]["before_state"].is_null());

    // Replacing the now-known policy is an UPDATE against the stored row
    let body = json!({
        "entity_type": "cafeteria_menu",
        "module": "food",
        "enabled": false,
        "retention_days": 90
    });
    app.put_json_auth("/api/v1/audit-policies", body, &admin)
        .await
        .assert_ok();

    let page: Value = app
        .get_auth(
            "/api/v1/audit-logs?entity_type=audit_policy&operation=UPDATE",
            &admin,
        )
        .await
        .json();
    let records = page["records"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["before_state"]["enabled"], true);
    assert_eq!(records[0]["after_state"]["enabled"], false);
}

#[tokio::test]
async fn policy_upsert_rejects_negative_retention() {
    let app = TestApp::new().await;
    let admin = app.admin_token();

    app.put_json_auth(
        "/api/v1/audit-policies",
        json!({
            "entity_type": "class",
            "enabled": true,
            "retention_days": -5
        }),
        &admin,
    )
    .await
    .assert_status(StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn reports_cover_actor_and_entity_activity() {
    let app = TestApp::new().await;
    let admin = app.admin_token();

    // Generate some trail activity
    app.post_auth("/api/v1/auth/logout", &admin).await.assert_ok();
    app.get_auth("/api/v1/audit-logs", &admin).await.assert_ok();

    let actors: Value = app
        .get_auth("/api/v1/reports/activity/actors?days=7", &admin)
        .await
        .json();
    let actor_rows = actors.as_array().unwrap();
    assert!(!actor_rows.is_empty());
    assert_eq!(actor_rows[0]["actor_email"], ADMIN_EMAIL);

    let entities: Value = app
        .get_auth("/api/v1/reports/activity/entities?days=7", &admin)
        .await
        .json();
    assert!(!entities.as_array().unwrap().is_empty());

    app.get_auth("/api/v1/reports/activity/actors?days=0", &admin)
        .await
        .assert_bad_request();
}

#[tokio::test]
async fn critical_feed_includes_session_events() {
    let app = TestApp::new().await;
    let admin = app.admin_token();

    app.post_auth("/api/v1/auth/logout", &admin).await.assert_ok();

    let feed: Value = app.get_auth("/api/v1/reports/critical", &admin).await.json();
    let rows = feed.as_array().unwrap();
    assert!(rows.iter().any(|r| r["operation"] == "LOGOUT"));
}

#[tokio::test]
async fn expired_or_garbage_tokens_are_rejected() {
    let app = TestApp::new().await;

    let response = app.get_auth("/api/v1/audit-logs", "not-a-jwt").await;
    response.assert_unauthorized();
}
