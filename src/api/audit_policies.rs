//! Audit policy API endpoints
//!
//! Runtime management of per-entity-type audit configuration. Listing is
//! open to auditors; changing a policy is admin-only and is itself audited.

use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};
use serde_json::json;

use crate::{
    audit::{ActorContext, MutationEvent},
    db::PolicyRepository,
    middleware::AuthUser,
    models::{AuditPolicy, UpsertPolicyRequest},
    utils::AppError,
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_policies).put(upsert_policy))
        .route("/{entity_type}", get(get_policy))
        .route("/refresh", put(refresh_policies))
}

/// List all configured policies
///
/// GET /api/v1/audit-policies
async fn list_policies(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<Vec<AuditPolicy>>, AppError> {
    if !auth_user.can_view_audit_logs() {
        return Err(AppError::forbidden("Not allowed to view audit policies"));
    }

    let policies = state
        .registry
        .all()
        .await
        .iter()
        .map(|p| p.as_ref().clone())
        .collect();
    Ok(Json(policies))
}

/// Get the effective policy for one entity type
///
/// GET /api/v1/audit-policies/{entity_type}
///
/// Always answers, falling back to the disabled default for unknown entity
/// types.
async fn get_policy(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(entity_type): Path<String>,
) -> Result<Json<AuditPolicy>, AppError> {
    if !auth_user.can_view_audit_logs() {
        return Err(AppError::forbidden("Not allowed to view audit policies"));
    }

    let policy = state.registry.get(&entity_type).await;
    Ok(Json(policy.as_ref().clone()))
}

/// Create or replace a policy
///
/// PUT /api/v1/audit-policies
async fn upsert_policy(
    State(state): State<AppState>,
    auth_user: AuthUser,
    ctx: ActorContext,
    Json(request): Json<UpsertPolicyRequest>,
) -> Result<Json<AuditPolicy>, AppError> {
    if !auth_user.is_admin() {
        return Err(AppError::forbidden("Only admins may change audit policies"));
    }

    let existing = PolicyRepository::new(&state.db)
        .get(&request.entity_type)
        .await?;
    let entity_type = request.entity_type.clone();

    let policy = state.registry.upsert(request).await?;
    let after_state = serde_json::to_value(&policy)?;

    // First registration is a CREATE with no before-image; replacing a known
    // policy is an UPDATE against the stored row.
    let event = match existing {
        Some(before) => MutationEvent::update(
            "audit_policy",
            &entity_type,
            serde_json::to_value(&before)?,
            after_state,
        ),
        None => MutationEvent::create("audit_policy", &entity_type, after_state),
    };
    state.audit.capture(&ctx, event.with_module("audit")).await;

    Ok(Json(policy))
}

/// Reload the policy cache from the database
///
/// PUT /api/v1/audit-policies/refresh
///
/// For operators who changed the table out of band.
async fn refresh_policies(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<serde_json::Value>, AppError> {
    if !auth_user.is_admin() {
        return Err(AppError::forbidden("Only admins may refresh audit policies"));
    }

    state
        .registry
        .refresh()
        .await
        .map_err(|e| AppError::internal(format!("Failed to refresh policies: {}", e)))?;

    Ok(Json(json!({"message": "Policies reloaded"})))
}
