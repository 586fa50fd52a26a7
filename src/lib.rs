//! SchoolBase Library
//!
//! This crate provides the core functionality for the SchoolBase backend:
//! a multi-tenant school management API built around a generic audit trail
//! engine.

use std::sync::Arc;

pub mod api;
pub mod audit;
pub mod config;
pub mod db;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

pub use audit::{ActorContext, AuditEngine, PolicyRegistry};
pub use config::AppConfig;
pub use db::DbPool;
pub use middleware::{auth_middleware, AuthUser, Claims};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Database connection pool
    pub db: DbPool,
    /// Per-entity-type audit policies, cached and atomically swappable
    pub registry: Arc<PolicyRegistry>,
    /// The change-capture engine
    pub audit: Arc<AuditEngine>,
}
