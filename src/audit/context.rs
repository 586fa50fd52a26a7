//! Request-scoped actor context
//!
//! One `ActorContext` is built per inbound request by the context middleware
//! and carried in the request's extension map, so concurrent requests are
//! strictly isolated. Code running outside a request (schedulers, repair
//! jobs) uses the distinguished system context instead.

use std::convert::Infallible;

use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

/// Email recorded for actions with no authenticated user behind them
pub const SYSTEM_ACTOR_EMAIL: &str = "system";

/// Role label recorded for system-initiated actions
pub const SYSTEM_ACTOR_ROLE: &str = "system";

/// Identity and network metadata of the acting party for one request
#[derive(Debug, Clone)]
pub struct ActorContext {
    pub user_id: Option<Uuid>,
    pub user_email: Option<String>,
    pub role: Option<String>,
    pub school_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    /// Correlation id, taken from X-Request-Id or generated per request
    pub request_id: Option<String>,
    pub session_id: Option<String>,
}

impl ActorContext {
    /// The distinguished system actor used when no request context exists,
    /// e.g. for scheduled jobs and startup tasks.
    pub fn system() -> Self {
        Self {
            user_id: None,
            user_email: Some(SYSTEM_ACTOR_EMAIL.to_string()),
            role: Some(SYSTEM_ACTOR_ROLE.to_string()),
            school_id: None,
            ip_address: None,
            user_agent: None,
            request_id: None,
            session_id: None,
        }
    }

    /// Anonymous context for unauthenticated requests; still carries the
    /// caller's network metadata and correlation id.
    pub fn anonymous(
        ip_address: Option<String>,
        user_agent: Option<String>,
        request_id: Option<String>,
    ) -> Self {
        Self {
            user_id: None,
            user_email: None,
            role: None,
            school_id: None,
            ip_address,
            user_agent,
            request_id,
            session_id: None,
        }
    }

    pub fn is_system(&self) -> bool {
        self.user_id.is_none() && self.user_email.as_deref() == Some(SYSTEM_ACTOR_EMAIL)
    }
}

/// Extracts the request's ActorContext, falling back to the system context
/// when no middleware installed one. Extraction never fails.
impl<S> FromRequestParts<S> for ActorContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<ActorContext>()
            .cloned()
            .unwrap_or_else(ActorContext::system))
    }
}
