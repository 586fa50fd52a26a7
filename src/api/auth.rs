//! Authentication API endpoints
//!
//! Provides login, logout, and current-user endpoints. Session events are
//! written to the audit trail: a successful or failed login produces a
//! LOGIN record, logout a LOGOUT record.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use crate::{
    audit::ActorContext,
    middleware::auth::{create_access_token, AuthUser},
    models::{AuditOperation, LoginRequest, LoginResponse, UserInfo},
    services::AuthService,
    utils::AppError,
    AppState,
};

/// Create public routes for authentication endpoints (no auth required)
pub fn public_routes() -> Router<AppState> {
    Router::new().route("/login", post(login))
}

/// Create protected routes for authentication endpoints (auth required)
pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/me", get(get_current_user))
}

/// Login handler
///
/// POST /api/v1/auth/login
async fn login(
    State(state): State<AppState>,
    ctx: ActorContext,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let user = match AuthService::authenticate(&state.db, &payload.email, &payload.password).await?
    {
        Some(user) => user,
        None => {
            state
                .audit
                .record_event(
                    &ctx,
                    AuditOperation::Login,
                    "session",
                    "auth",
                    "auth.login",
                    false,
                    Some("Invalid credentials".to_string()),
                    Some(json!({"email": payload.email})),
                )
                .await;
            return Err(AppError::Unauthorized("Invalid email or password".to_string()));
        }
    };

    let access_token = create_access_token(
        &user.id,
        Some(&user.school_id),
        &user.email,
        &user.role,
        &state.config.auth.jwt_secret,
        state.config.auth.access_token_expiry_hours,
    )
    .map_err(|e| AppError::internal(format!("Failed to create access token: {}", e)))?;

    // The anonymous request context plus the now-known actor
    let login_ctx = ActorContext {
        user_id: Some(user.id),
        user_email: Some(user.email.clone()),
        role: Some(user.role.clone()),
        school_id: Some(user.school_id),
        ..ctx
    };
    state
        .audit
        .record_event(
            &login_ctx,
            AuditOperation::Login,
            "session",
            "auth",
            "auth.login",
            true,
            None,
            None,
        )
        .await;

    Ok(Json(LoginResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: (state.config.auth.access_token_expiry_hours * 3600) as i64,
        user: UserInfo::from(&user),
    }))
}

/// Logout handler
///
/// POST /api/v1/auth/logout
///
/// Tokens are stateless; logout exists to close out the session in the
/// audit trail.
async fn logout(State(state): State<AppState>, ctx: ActorContext) -> Json<serde_json::Value> {
    state
        .audit
        .record_event(
            &ctx,
            AuditOperation::Logout,
            "session",
            "auth",
            "auth.logout",
            true,
            None,
            None,
        )
        .await;

    Json(json!({"message": "Logged out"}))
}

/// Current user handler
///
/// GET /api/v1/auth/me
async fn get_current_user(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<UserInfo>, AppError> {
    let user = crate::db::ReferenceRepository::new(&state.db)
        .get_user_by_id(auth_user.id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    Ok(Json(UserInfo::from(&user)))
}
