//! Audit log API endpoints
//!
//! Read-only access to the audit trail: filtered listing, single-record
//! lookup, and export. Restricted to admins and auditors. Reading the log
//! is itself recorded as an ACCESS event so trail consumption is visible
//! in the trail.

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::{
    audit::ActorContext,
    db::AuditRepository,
    middleware::AuthUser,
    models::{encode_cursor, AuditLogPage, AuditLogQuery, AuditOperation},
    services::ReportingService,
    utils::{validation, AppError},
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_audit_logs))
        .route("/export", get(export_audit_logs))
        .route("/{id}", get(get_audit_log))
}

fn require_audit_access(auth_user: &AuthUser) -> Result<(), AppError> {
    if auth_user.can_view_audit_logs() {
        Ok(())
    } else {
        Err(AppError::forbidden("Not allowed to view audit logs"))
    }
}

/// List audit records
///
/// GET /api/v1/audit-logs
async fn list_audit_logs(
    State(state): State<AppState>,
    auth_user: AuthUser,
    ctx: ActorContext,
    Query(query): Query<AuditLogQuery>,
) -> Result<Json<AuditLogPage>, AppError> {
    require_audit_access(&auth_user)?;
    validation::validate_audit_query(&query)?;

    let repo = AuditRepository::new(&state.db);
    let records = repo.query(&query).await?;
    let total = repo.count(&query).await?;

    state
        .audit
        .record_event(
            &ctx,
            AuditOperation::Access,
            "audit_log",
            "audit",
            "audit_log.list",
            true,
            None,
            None,
        )
        .await;

    let limit = query.limit.unwrap_or(validation::DEFAULT_PAGE_SIZE);
    let next_cursor = if records.len() as u32 == limit {
        records.last().map(|r| encode_cursor(r.created_at, r.id))
    } else {
        None
    };

    Ok(Json(AuditLogPage {
        records,
        total,
        limit,
        next_cursor,
    }))
}

/// Get one audit record by id
///
/// GET /api/v1/audit-logs/{id}
async fn get_audit_log(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<crate::models::AuditRecord>, AppError> {
    require_audit_access(&auth_user)?;

    let record = AuditRepository::new(&state.db)
        .get(id)
        .await?
        .ok_or_else(|| AppError::not_found("Audit record not found"))?;

    Ok(Json(record))
}

#[derive(Debug, Deserialize)]
struct ExportParams {
    #[serde(default)]
    format: Option<String>,
}

/// Export filtered audit records as JSON or CSV
///
/// GET /api/v1/audit-logs/export?format=csv
async fn export_audit_logs(
    State(state): State<AppState>,
    auth_user: AuthUser,
    ctx: ActorContext,
    Query(params): Query<ExportParams>,
    Query(query): Query<AuditLogQuery>,
) -> Result<axum::response::Response, AppError> {
    require_audit_access(&auth_user)?;
    validation::validate_audit_query(&query)?;

    let format = params.format.as_deref().unwrap_or("json");
    let records = AuditRepository::new(&state.db).query(&query).await?;

    state
        .audit
        .record_event(
            &ctx,
            AuditOperation::Export,
            "audit_log",
            "audit",
            "audit_log.export",
            true,
            None,
            Some(json!({"format": format, "records": records.len()})),
        )
        .await;

    match format {
        "json" => Ok(Json(records).into_response()),
        "csv" => {
            let csv = ReportingService::export_csv(&records);
            Ok((
                [
                    (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
                    (
                        header::CONTENT_DISPOSITION,
                        "attachment; filename=\"audit-logs.csv\"",
                    ),
                ],
                csv,
            )
                .into_response())
        }
        other => Err(AppError::bad_request(format!(
            "Unsupported export format '{}'",
            other
        ))),
    }
}
