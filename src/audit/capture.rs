//! Change-capture engine
//!
//! Turns a mutation (before/after images plus identifiers) into one audit
//! record, applying the entity's policy: operation gating, field exclusion,
//! sensitive-field masking, and the UPDATE diff. Capture is best-effort: a
//! failed append is logged operationally and swallowed so the business
//! mutation that triggered it can still succeed.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::{Map, Value};
use sqlx::SqlitePool;
use tracing::error;
use uuid::Uuid;

use crate::audit::context::ActorContext;
use crate::audit::policy::PolicyRegistry;
use crate::db::AuditRepository;
use crate::models::{AuditOperation, AuditRecord};

/// Constant placeholder stored instead of sensitive values. Deliberately
/// fixed-shape: it leaks neither length nor content of the original.
pub const MASK: &str = "[REDACTED]";

/// A mutation observed at the persistence boundary
#[derive(Debug, Clone)]
pub struct MutationEvent {
    pub operation: AuditOperation,
    pub entity_type: String,
    pub record_id: Option<String>,
    pub before: Option<Value>,
    pub after: Option<Value>,
    /// Module label; defaults to the policy's module when empty
    pub module: Option<String>,
    pub action: String,
    pub success: bool,
    pub error_message: Option<String>,
    pub duration_ms: Option<i64>,
}

impl MutationEvent {
    fn new(operation: AuditOperation, entity_type: &str, record_id: Option<String>) -> Self {
        Self {
            operation,
            entity_type: entity_type.to_string(),
            record_id,
            before: None,
            after: None,
            module: None,
            action: format!("{}.{}", entity_type, operation.as_str().to_lowercase()),
            success: true,
            error_message: None,
            duration_ms: None,
        }
    }

    pub fn create(entity_type: &str, record_id: &str, after: Value) -> Self {
        let mut event = Self::new(AuditOperation::Create, entity_type, Some(record_id.into()));
        event.after = Some(after);
        event
    }

    pub fn update(entity_type: &str, record_id: &str, before: Value, after: Value) -> Self {
        let mut event = Self::new(AuditOperation::Update, entity_type, Some(record_id.into()));
        event.before = Some(before);
        event.after = Some(after);
        event
    }

    pub fn delete(entity_type: &str, record_id: &str, before: Value) -> Self {
        let mut event = Self::new(AuditOperation::Delete, entity_type, Some(record_id.into()));
        event.before = Some(before);
        event
    }

    pub fn access(entity_type: &str, record_id: &str) -> Self {
        Self::new(AuditOperation::Access, entity_type, Some(record_id.into()))
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = action.into();
        self
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }
}

/// The capture engine: policy gate, diff, scrub, append.
pub struct AuditEngine {
    pool: SqlitePool,
    registry: Arc<PolicyRegistry>,
}

impl AuditEngine {
    pub fn new(pool: SqlitePool, registry: Arc<PolicyRegistry>) -> Self {
        Self { pool, registry }
    }

    /// Record a mutation, never failing the caller. Append errors are
    /// reported to the operational log and swallowed.
    pub async fn capture(&self, ctx: &ActorContext, event: MutationEvent) {
        if let Err(e) = self.try_capture(ctx, event).await {
            error!(error = %e, "Audit capture failed; business operation unaffected");
        }
    }

    /// Fallible capture body. Returns `None` when the entity's policy skips
    /// the operation.
    pub async fn try_capture(
        &self,
        ctx: &ActorContext,
        event: MutationEvent,
    ) -> Result<Option<AuditRecord>> {
        let policy = self.registry.get(&event.entity_type).await;
        if !policy.tracks(event.operation) {
            return Ok(None);
        }

        let changed_fields = if event.operation == AuditOperation::Update {
            Some(changed_fields(
                event.before.as_ref(),
                event.after.as_ref(),
                &policy.excluded_fields,
            ))
        } else {
            None
        };

        let before_state = event
            .before
            .map(|v| scrub(v, &policy.excluded_fields, &policy.sensitive_fields));
        let after_state = event
            .after
            .map(|v| scrub(v, &policy.excluded_fields, &policy.sensitive_fields));

        let record = AuditRecord {
            id: Uuid::new_v4(),
            operation: event.operation,
            entity_type: event.entity_type,
            record_id: event.record_id,
            actor_id: ctx.user_id,
            actor_email: ctx.user_email.clone(),
            actor_role: ctx.role.clone(),
            school_id: ctx.school_id,
            school_name: None,
            before_state,
            after_state,
            changed_fields,
            module: event.module.unwrap_or_else(|| policy.module.clone()),
            action: event.action,
            success: event.success,
            error_message: event.error_message,
            duration_ms: event.duration_ms,
            ip_address: ctx.ip_address.clone(),
            user_agent: ctx.user_agent.clone(),
            request_id: ctx.request_id.clone(),
            session_id: ctx.session_id.clone(),
            created_at: Utc::now(),
        };

        AuditRepository::new(&self.pool)
            .append(&record)
            .await
            .context("Failed to append audit record")?;

        Ok(Some(record))
    }

    /// Record a non-entity event (LOGIN, LOGOUT, system events). These do not
    /// go through per-entity policy gating since there is no entity policy to
    /// consult.
    pub async fn record_event(
        &self,
        ctx: &ActorContext,
        operation: AuditOperation,
        entity_type: &str,
        module: &str,
        action: &str,
        success: bool,
        error_message: Option<String>,
        details: Option<Value>,
    ) {
        let record = AuditRecord {
            id: Uuid::new_v4(),
            operation,
            entity_type: entity_type.to_string(),
            record_id: None,
            actor_id: ctx.user_id,
            actor_email: ctx.user_email.clone(),
            actor_role: ctx.role.clone(),
            school_id: ctx.school_id,
            school_name: None,
            before_state: None,
            after_state: details,
            changed_fields: None,
            module: module.to_string(),
            action: action.to_string(),
            success,
            error_message,
            duration_ms: None,
            ip_address: ctx.ip_address.clone(),
            user_agent: ctx.user_agent.clone(),
            request_id: ctx.request_id.clone(),
            session_id: ctx.session_id.clone(),
            created_at: Utc::now(),
        };

        if let Err(e) = AuditRepository::new(&self.pool).append(&record).await {
            error!(error = %e, "Audit event append failed");
        }
    }

    /// Decorator for mutating calls: runs the future, times it, records the
    /// outcome (including the error message on failure), and returns the
    /// result untouched.
    pub async fn observe<T, E, F>(
        &self,
        ctx: &ActorContext,
        mut event: MutationEvent,
        fut: F,
    ) -> Result<T, E>
    where
        F: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let start = Instant::now();
        let result = fut.await;
        event.duration_ms = Some(start.elapsed().as_millis() as i64);
        if let Err(ref e) = result {
            event.success = false;
            event.error_message = Some(e.to_string());
        }
        self.capture(ctx, event).await;
        result
    }
}

/// Key-wise equality with the absent/null rule: a key present with JSON
/// `null` and a key absent are the same value. See DESIGN.md.
fn values_equal(a: Option<&Value>, b: Option<&Value>) -> bool {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    a == b
}

/// The set of keys whose value differs between the two images, excluding
/// policy-excluded fields, sorted for deterministic output. Non-object
/// images produce an empty list.
fn changed_fields(before: Option<&Value>, after: Option<&Value>, excluded: &[String]) -> Vec<String> {
    let empty = Map::new();
    let before = before.and_then(Value::as_object).unwrap_or(&empty);
    let after = after.and_then(Value::as_object).unwrap_or(&empty);

    let keys: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
    keys.into_iter()
        .filter(|k| !excluded.iter().any(|e| e == *k))
        .filter(|k| !values_equal(before.get(*k), after.get(*k)))
        .cloned()
        .collect()
}

/// Remove excluded fields and mask sensitive ones. Non-object snapshots are
/// passed through unchanged.
fn scrub(image: Value, excluded: &[String], sensitive: &[String]) -> Value {
    match image {
        Value::Object(map) => {
            let scrubbed: Map<String, Value> = map
                .into_iter()
                .filter(|(k, _)| !excluded.iter().any(|e| e == k))
                .map(|(k, v)| {
                    if sensitive.iter().any(|s| s == &k) {
                        (k, Value::String(MASK.to_string()))
                    } else {
                        (k, v)
                    }
                })
                .collect();
            Value::Object(scrubbed)
        }
        other => other,
    }
}
