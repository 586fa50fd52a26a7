//! Maintenance endpoints
//!
//! Admin-only operational actions: trigger a retention sweep or the
//! historical backfill outside their schedules. Both are idempotent, so an
//! accidental double-trigger is harmless.

use axum::{extract::State, routing::post, Json, Router};
use serde_json::json;

use crate::{
    audit::ActorContext,
    middleware::AuthUser,
    models::{AuditOperation, BackfillSummary, SweepSummary},
    services::{BackfillService, RetentionSweeper},
    utils::AppError,
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/retention-sweep", post(run_retention_sweep))
        .route("/backfill", post(run_backfill))
}

fn require_admin(auth_user: &AuthUser) -> Result<(), AppError> {
    if auth_user.is_admin() {
        Ok(())
    } else {
        Err(AppError::forbidden("Admin access required"))
    }
}

/// Run a retention sweep now
///
/// POST /api/v1/maintenance/retention-sweep
async fn run_retention_sweep(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<SweepSummary>, AppError> {
    require_admin(&auth_user)?;

    let sweeper = RetentionSweeper::new(
        state.db.clone(),
        state.registry.clone(),
        state.audit.clone(),
    );
    let summary = sweeper.sweep().await;

    Ok(Json(summary))
}

/// Fill denormalized actor and school columns on historical records
///
/// POST /api/v1/maintenance/backfill
async fn run_backfill(
    State(state): State<AppState>,
    auth_user: AuthUser,
    ctx: ActorContext,
) -> Result<Json<BackfillSummary>, AppError> {
    require_admin(&auth_user)?;

    let summary = BackfillService::new(state.db.clone()).run().await;

    state
        .audit
        .record_event(
            &ctx,
            AuditOperation::Update,
            "audit_log",
            "audit",
            "audit_log.backfill",
            summary.errors.is_empty(),
            None,
            Some(json!({
                "actor_emails_filled": summary.actor_emails_filled,
                "actor_roles_filled": summary.actor_roles_filled,
                "school_names_filled": summary.school_names_filled,
                "errors": summary.errors.len(),
            })),
        )
        .await;

    Ok(Json(summary))
}
