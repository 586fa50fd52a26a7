//! Middleware components
//!
//! This module contains middleware for:
//! - Authentication (JWT)
//! - Actor context assembly for audit capture

pub mod auth;
pub mod context;

pub use auth::{auth_middleware, AuthUser, Claims};
pub use context::actor_context_middleware;
