//! Audit reporting endpoints
//!
//! Aggregate views computed from the trail: per-actor and per-entity
//! activity over a trailing window, and a feed of recent high-severity
//! records.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::{
    middleware::AuthUser,
    models::{ActorActivity, AuditRecord, EntityActivity},
    services::ReportingService,
    utils::AppError,
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/activity/actors", get(actor_activity))
        .route("/activity/entities", get(entity_activity))
        .route("/critical", get(critical_recent))
}

const MAX_WINDOW_DAYS: i64 = 365;

#[derive(Debug, Deserialize)]
struct WindowParams {
    #[serde(default = "default_days")]
    days: i64,
}

fn default_days() -> i64 {
    30
}

#[derive(Debug, Deserialize)]
struct FeedParams {
    #[serde(default)]
    limit: Option<u32>,
}

fn check_window(days: i64) -> Result<(), AppError> {
    if days < 1 || days > MAX_WINDOW_DAYS {
        return Err(AppError::bad_request(format!(
            "days must be between 1 and {}",
            MAX_WINDOW_DAYS
        )));
    }
    Ok(())
}

fn require_audit_access(auth_user: &AuthUser) -> Result<(), AppError> {
    if auth_user.can_view_audit_logs() {
        Ok(())
    } else {
        Err(AppError::forbidden("Not allowed to view audit reports"))
    }
}

/// Per-actor activity counts
///
/// GET /api/v1/reports/activity/actors?days=30
async fn actor_activity(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(params): Query<WindowParams>,
) -> Result<Json<Vec<ActorActivity>>, AppError> {
    require_audit_access(&auth_user)?;
    check_window(params.days)?;

    let rows = ReportingService::new(state.db.clone())
        .actor_activity(params.days)
        .await?;
    Ok(Json(rows))
}

/// Per-entity-type activity counts
///
/// GET /api/v1/reports/activity/entities?days=30
async fn entity_activity(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(params): Query<WindowParams>,
) -> Result<Json<Vec<EntityActivity>>, AppError> {
    require_audit_access(&auth_user)?;
    check_window(params.days)?;

    let rows = ReportingService::new(state.db.clone())
        .entity_activity(params.days)
        .await?;
    Ok(Json(rows))
}

/// Recent high-severity records
///
/// GET /api/v1/reports/critical?limit=50
async fn critical_recent(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(params): Query<FeedParams>,
) -> Result<Json<Vec<AuditRecord>>, AppError> {
    require_audit_access(&auth_user)?;

    let limit = params
        .limit
        .unwrap_or(state.config.audit.critical_feed_limit)
        .min(crate::utils::validation::MAX_PAGE_SIZE);

    let rows = ReportingService::new(state.db.clone())
        .critical_recent(&state.config.audit.sensitive_modules, limit)
        .await?;
    Ok(Json(rows))
}
