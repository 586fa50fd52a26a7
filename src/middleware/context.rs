//! Actor context middleware
//!
//! Builds the request-scoped `ActorContext` from whatever the request
//! carries: the authenticated user (when the auth middleware ran first),
//! the peer address, user agent, and correlation headers. The context is
//! stored in request extensions so handlers and the capture engine can
//! take it as an extractor argument without any ambient state.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request},
    http::header::USER_AGENT,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::audit::ActorContext;
use crate::middleware::auth::AuthUser;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Attach an `ActorContext` to the request. Works on both authenticated and
/// public routes; without an `AuthUser` the actor fields stay empty and only
/// the transport metadata is recorded.
pub async fn actor_context_middleware(mut request: Request, next: Next) -> Response {
    let ip_address = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());

    let user_agent = request
        .headers()
        .get(USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());

    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let ctx = match request.extensions().get::<AuthUser>() {
        Some(user) => ActorContext {
            user_id: Some(user.id),
            user_email: Some(user.email.clone()),
            role: Some(user.role.clone()),
            school_id: user.school_id,
            ip_address,
            user_agent,
            request_id: Some(request_id),
            session_id: Some(user.session_id.clone()),
        },
        None => ActorContext::anonymous(ip_address, user_agent, Some(request_id)),
    };

    request.extensions_mut().insert(ctx);

    next.run(request).await
}
