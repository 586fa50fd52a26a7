//! Audit policy repository
//!
//! Policies are a small, rarely-written reference table keyed by entity
//! type. They are never hard-deleted; disabling a policy is the supported
//! way to stop tracking an entity type.

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;

use crate::db::parse_db_timestamp;
use crate::models::{AuditPolicy, UpsertPolicyRequest};

#[derive(Debug, sqlx::FromRow)]
struct PolicyRow {
    entity_type: String,
    module: String,
    enabled: i64,
    track_creates: i64,
    track_updates: i64,
    track_deletes: i64,
    track_reads: i64,
    sensitive_fields: String,
    excluded_fields: String,
    retention_days: i64,
    updated_at: String,
}

const SELECT_COLUMNS: &str = "entity_type, module, enabled, track_creates, track_updates, \
     track_deletes, track_reads, sensitive_fields, excluded_fields, retention_days, updated_at";

pub struct PolicyRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> PolicyRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_all(&self) -> Result<Vec<AuditPolicy>> {
        let sql = format!(
            "SELECT {} FROM audit_policies ORDER BY entity_type",
            SELECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, PolicyRow>(&sql)
            .fetch_all(self.pool)
            .await
            .context("Failed to list audit policies")?;

        Ok(rows.into_iter().map(row_to_policy).collect())
    }

    pub async fn get(&self, entity_type: &str) -> Result<Option<AuditPolicy>> {
        let sql = format!(
            "SELECT {} FROM audit_policies WHERE entity_type = ?",
            SELECT_COLUMNS
        );
        let row = sqlx::query_as::<_, PolicyRow>(&sql)
            .bind(entity_type)
            .fetch_optional(self.pool)
            .await
            .context("Failed to fetch audit policy")?;

        Ok(row.map(row_to_policy))
    }

    pub async fn upsert(&self, request: &UpsertPolicyRequest) -> Result<AuditPolicy> {
        let updated_at = Utc::now();
        let sensitive = serde_json::to_string(&request.sensitive_fields)
            .context("Failed to serialize sensitive fields")?;
        let excluded = serde_json::to_string(&request.excluded_fields)
            .context("Failed to serialize excluded fields")?;

        sqlx::query(
            r#"
            INSERT INTO audit_policies
                (entity_type, module, enabled, track_creates, track_updates, track_deletes,
                 track_reads, sensitive_fields, excluded_fields, retention_days, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(entity_type) DO UPDATE SET
                module = excluded.module,
                enabled = excluded.enabled,
                track_creates = excluded.track_creates,
                track_updates = excluded.track_updates,
                track_deletes = excluded.track_deletes,
                track_reads = excluded.track_reads,
                sensitive_fields = excluded.sensitive_fields,
                excluded_fields = excluded.excluded_fields,
                retention_days = excluded.retention_days,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&request.entity_type)
        .bind(&request.module)
        .bind(request.enabled as i64)
        .bind(request.track_creates as i64)
        .bind(request.track_updates as i64)
        .bind(request.track_deletes as i64)
        .bind(request.track_reads as i64)
        .bind(&sensitive)
        .bind(&excluded)
        .bind(request.retention_days)
        .bind(updated_at.to_rfc3339())
        .execute(self.pool)
        .await
        .context("Failed to upsert audit policy")?;

        Ok(AuditPolicy {
            entity_type: request.entity_type.clone(),
            module: request.module.clone(),
            enabled: request.enabled,
            track_creates: request.track_creates,
            track_updates: request.track_updates,
            track_deletes: request.track_deletes,
            track_reads: request.track_reads,
            sensitive_fields: request.sensitive_fields.clone(),
            excluded_fields: request.excluded_fields.clone(),
            retention_days: request.retention_days,
            updated_at,
        })
    }
}

fn row_to_policy(row: PolicyRow) -> AuditPolicy {
    AuditPolicy {
        entity_type: row.entity_type,
        module: row.module,
        enabled: row.enabled != 0,
        track_creates: row.track_creates != 0,
        track_updates: row.track_updates != 0,
        track_deletes: row.track_deletes != 0,
        track_reads: row.track_reads != 0,
        sensitive_fields: serde_json::from_str(&row.sensitive_fields).unwrap_or_default(),
        excluded_fields: serde_json::from_str(&row.excluded_fields).unwrap_or_default(),
        retention_days: row.retention_days,
        updated_at: parse_db_timestamp(&row.updated_at),
    }
}
