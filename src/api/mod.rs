//! API routes and handlers
//!
//! This module defines all API endpoints and their routing.

use axum::{routing::get, Router};

use crate::AppState;

mod audit_logs;
mod audit_policies;
mod auth;
mod health;
mod maintenance;
mod reports;

pub use health::*;

/// Public API routes (no authentication required)
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // Health check endpoints
        .route("/health", get(health::health_check))
        .route("/health/detailed", get(health::health_check_detailed))
        // Authentication endpoints (no auth required)
        .nest("/auth", auth::public_routes())
}

/// Protected API routes (authentication required)
pub fn protected_routes() -> Router<AppState> {
    Router::new()
        // Protected auth endpoints (logout, me)
        .nest("/auth", auth::protected_routes())
        // Audit trail
        .nest("/audit-logs", audit_logs::routes())
        .nest("/audit-policies", audit_policies::routes())
        .nest("/reports", reports::routes())
        // Operational actions
        .nest("/maintenance", maintenance::routes())
}
