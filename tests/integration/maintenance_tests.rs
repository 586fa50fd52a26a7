//! Maintenance endpoint and sweeper integration tests

use chrono::{Duration, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use schoolbase::db::AuditRepository;
use schoolbase::models::{AuditOperation, AuditRecord};
use schoolbase::services::RetentionSweeper;

use crate::common::TestApp;

/// Insert a trail record with an arbitrary age
async fn insert_aged_record(app: &TestApp, entity_type: &str, age_days: i64) -> Uuid {
    let record = AuditRecord {
        id: Uuid::new_v4(),
        operation: AuditOperation::Create,
        entity_type: entity_type.to_string(),
        record_id: Some("r-1".to_string()),
        actor_id: None,
        actor_email: Some("system".to_string()),
        actor_role: Some("system".to_string()),
        school_id: None,
        school_name: None,
        before_state: None,
        after_state: Some(json!({"n": 1})),
        changed_fields: None,
        module: "test".to_string(),
        action: format!("{}.create", entity_type),
        success: true,
        error_message: None,
        duration_ms: None,
        ip_address: None,
        user_agent: None,
        request_id: None,
        session_id: None,
        created_at: Utc::now() - Duration::days(age_days),
    };
    AuditRepository::new(&app.state.db)
        .append(&record)
        .await
        .unwrap();
    record.id
}

#[tokio::test]
async fn sweep_deletes_only_expired_records() {
    let app = TestApp::new().await;
    let repo_pool = app.state.db.clone();

    // library_book retains 365 days
    let old_id = insert_aged_record(&app, "library_book", 400).await;
    let fresh_id = insert_aged_record(&app, "library_book", 10).await;
    // school retains forever
    let eternal_id = insert_aged_record(&app, "school", 4000).await;

    let sweeper = RetentionSweeper::new(
        repo_pool.clone(),
        app.state.registry.clone(),
        app.state.audit.clone(),
    );
    let summary = sweeper.sweep().await;

    assert_eq!(summary.total_deleted, 1);
    assert!(!summary.interrupted);

    let repo = AuditRepository::new(&repo_pool);
    assert!(repo.get(old_id).await.unwrap().is_none());
    assert!(repo.get(fresh_id).await.unwrap().is_some());
    assert!(repo.get(eternal_id).await.unwrap().is_some());

    // Running again converges: nothing left to delete
    let second = sweeper.sweep().await;
    assert_eq!(second.total_deleted, 0);
}

#[tokio::test]
async fn sweep_writes_a_system_summary_record() {
    let app = TestApp::new().await;

    insert_aged_record(&app, "class", 800).await;

    let sweeper = RetentionSweeper::new(
        app.state.db.clone(),
        app.state.registry.clone(),
        app.state.audit.clone(),
    );
    let summary = sweeper.sweep().await;
    assert_eq!(summary.total_deleted, 1);

    let records = AuditRepository::new(&app.state.db)
        .query(&schoolbase::models::AuditLogQuery {
            entity_type: Some("class".to_string()),
            operation: Some(AuditOperation::Delete),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.action, "retention_sweep");
    assert_eq!(record.actor_email.as_deref(), Some("system"));
    assert_eq!(record.after_state.as_ref().unwrap()["deleted"], 1);
}

#[tokio::test]
async fn stopped_sweeper_reports_interruption() {
    let app = TestApp::new().await;

    let sweeper = RetentionSweeper::new(
        app.state.db.clone(),
        app.state.registry.clone(),
        app.state.audit.clone(),
    );
    sweeper.stop().await;

    let summary = sweeper.sweep().await;
    assert!(summary.interrupted);
    assert_eq!(summary.total_deleted, 0);
}

#[tokio::test]
async fn retention_sweep_endpoint_is_admin_only() {
    let app = TestApp::new().await;
    let staff = app.staff_token();
    let admin = app.admin_token();

    app.post_auth("/api/v1/maintenance/retention-sweep", &staff)
        .await
        .assert_forbidden();

    insert_aged_record(&app, "library_book", 400).await;

    let response = app
        .post_auth("/api/v1/maintenance/retention-sweep", &admin)
        .await;
    response.assert_ok();
    let summary: Value = response.json();
    assert_eq!(summary["total_deleted"], 1);
}

#[tokio::test]
async fn backfill_endpoint_fills_missing_columns_and_is_audited() {
    let app = TestApp::new().await;
    let admin = app.admin_token();

    // Record with actor id but missing denormalized email
    let record = AuditRecord {
        id: Uuid::new_v4(),
        operation: AuditOperation::Update,
        entity_type: "student".to_string(),
        record_id: Some("s-1".to_string()),
        actor_id: Some(app.admin.id),
        actor_email: None,
        actor_role: None,
        school_id: Some(app.school.id),
        school_name: None,
        before_state: None,
        after_state: None,
        changed_fields: Some(vec!["name".to_string()]),
        module: "enrollment".to_string(),
        action: "student.update".to_string(),
        success: true,
        error_message: None,
        duration_ms: None,
        ip_address: None,
        user_agent: None,
        request_id: None,
        session_id: None,
        created_at: Utc::now(),
    };
    AuditRepository::new(&app.state.db)
        .append(&record)
        .await
        .unwrap();

    let response = app.post_auth("/api/v1/maintenance/backfill", &admin).await;
    response.assert_ok();
    let summary: Value = response.json();
    assert_eq!(summary["actor_emails_filled"], 1);
    assert_eq!(summary["school_names_filled"], 1);

    let filled = AuditRepository::new(&app.state.db)
        .get(record.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        filled.actor_email.as_deref(),
        Some(app.admin.email.as_str())
    );

    // The run itself is in the trail
    let events = AuditRepository::new(&app.state.db)
        .query(&schoolbase::models::AuditLogQuery {
            entity_type: Some("audit_log".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(events.iter().any(|r| r.action == "audit_log.backfill"));
}

#[tokio::test]
async fn backfill_endpoint_requires_admin() {
    let app = TestApp::new().await;
    let staff = app.staff_token();

    app.post_auth("/api/v1/maintenance/backfill", &staff)
        .await
        .assert_forbidden();
}
