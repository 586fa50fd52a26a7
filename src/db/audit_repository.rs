//! Audit log store
//!
//! Append-mostly repository over the `audit_log` table. Listing is ordered by
//! creation time then id, both descending, and paged by a `(created_at, id)`
//! keyset cursor so pages stay disjoint while new records are appended
//! concurrently.

use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::db::parse_db_timestamp;
use crate::models::{
    decode_cursor, ActorActivity, AuditLogQuery, AuditOperation, AuditRecord, EntityActivity,
};
use crate::utils::validation::DEFAULT_PAGE_SIZE;

#[derive(Debug, sqlx::FromRow)]
struct AuditRow {
    id: String,
    operation: String,
    entity_type: String,
    record_id: Option<String>,
    actor_id: Option<String>,
    actor_email: Option<String>,
    actor_role: Option<String>,
    school_id: Option<String>,
    school_name: Option<String>,
    before_state: Option<String>,
    after_state: Option<String>,
    changed_fields: Option<String>,
    module: String,
    action: String,
    success: i64,
    error_message: Option<String>,
    duration_ms: Option<i64>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    request_id: Option<String>,
    session_id: Option<String>,
    created_at: String,
}

const SELECT_COLUMNS: &str = "id, operation, entity_type, record_id, actor_id, actor_email, \
     actor_role, school_id, school_name, before_state, after_state, changed_fields, module, \
     action, success, error_message, duration_ms, ip_address, user_agent, request_id, \
     session_id, created_at";

pub struct AuditRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> AuditRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Append one record. Records are immutable once written; only the
    /// backfill pass may later fill NULL denormalized columns.
    pub async fn append(&self, record: &AuditRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_log
                (id, operation, entity_type, record_id, actor_id, actor_email, actor_role,
                 school_id, school_name, before_state, after_state, changed_fields, module,
                 action, success, error_message, duration_ms, ip_address, user_agent,
                 request_id, session_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.operation.as_str())
        .bind(&record.entity_type)
        .bind(record.record_id.as_deref())
        .bind(record.actor_id.map(|u| u.to_string()))
        .bind(record.actor_email.as_deref())
        .bind(record.actor_role.as_deref())
        .bind(record.school_id.map(|u| u.to_string()))
        .bind(record.school_name.as_deref())
        .bind(record.before_state.as_ref().map(|v| v.to_string()))
        .bind(record.after_state.as_ref().map(|v| v.to_string()))
        .bind(
            record
                .changed_fields
                .as_ref()
                .map(|f| serde_json::to_string(f).unwrap_or_else(|_| "[]".to_string())),
        )
        .bind(&record.module)
        .bind(&record.action)
        .bind(record.success as i64)
        .bind(record.error_message.as_deref())
        .bind(record.duration_ms)
        .bind(record.ip_address.as_deref())
        .bind(record.user_agent.as_deref())
        .bind(record.request_id.as_deref())
        .bind(record.session_id.as_deref())
        .bind(record.created_at.to_rfc3339())
        .execute(self.pool)
        .await
        .context("Failed to insert audit record")?;

        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<AuditRecord>> {
        let sql = format!("SELECT {} FROM audit_log WHERE id = ?", SELECT_COLUMNS);
        let row = sqlx::query_as::<_, AuditRow>(&sql)
            .bind(id.to_string())
            .fetch_optional(self.pool)
            .await
            .context("Failed to fetch audit record")?;

        Ok(row.map(row_to_record))
    }

    /// Filtered listing ordered by `created_at DESC, id DESC`. A cursor, when
    /// present, restricts the page to records strictly older than that
    /// position, so a record appended between two page fetches cannot shift
    /// the window and re-surface a row from the previous page.
    pub async fn query(&self, query: &AuditLogQuery) -> Result<Vec<AuditRecord>> {
        let cursor = query.cursor.as_deref().and_then(decode_cursor);

        let mut sql = format!(
            "SELECT {} FROM audit_log WHERE 1=1{}",
            SELECT_COLUMNS,
            filter_clauses(query)
        );
        if cursor.is_some() {
            sql.push_str(" AND (created_at < ? OR (created_at = ? AND id < ?))");
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC LIMIT ?");

        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);

        let mut q = bind_filters(sqlx::query_as::<_, AuditRow>(&sql), query);
        if let Some((created_at, id)) = cursor {
            let at = created_at.to_rfc3339();
            q = q.bind(at.clone()).bind(at).bind(id.to_string());
        }

        let rows = q
            .bind(limit as i64)
            .fetch_all(self.pool)
            .await
            .context("Failed to list audit records")?;

        Ok(rows.into_iter().map(row_to_record).collect())
    }

    pub async fn count(&self, query: &AuditLogQuery) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) AS n FROM audit_log WHERE 1=1{}",
            filter_clauses(query)
        );

        let row = bind_filters_scalar(sqlx::query(&sql), query)
            .fetch_one(self.pool)
            .await
            .context("Failed to count audit records")?;

        Ok(row.get::<i64, _>("n"))
    }

    /// Age-based deletion for the retention sweeper. Naturally idempotent.
    pub async fn delete_older_than(
        &self,
        entity_type: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query("DELETE FROM audit_log WHERE entity_type = ? AND created_at < ?")
            .bind(entity_type)
            .bind(cutoff.to_rfc3339())
            .execute(self.pool)
            .await
            .context("Failed to delete expired audit records")?;

        Ok(result.rows_affected())
    }

    // ==================== Backfill ====================
    //
    // Each statement only touches rows where the target column is NULL and
    // the source row exists, so repeated runs are no-ops and non-null values
    // are never overwritten.

    pub async fn backfill_actor_emails(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE audit_log
            SET actor_email = (SELECT u.email FROM users u WHERE u.id = audit_log.actor_id)
            WHERE actor_email IS NULL
              AND actor_id IS NOT NULL
              AND EXISTS (SELECT 1 FROM users u WHERE u.id = audit_log.actor_id)
            "#,
        )
        .execute(self.pool)
        .await
        .context("Failed to backfill actor emails")?;

        Ok(result.rows_affected())
    }

    pub async fn backfill_actor_roles(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE audit_log
            SET actor_role = (SELECT u.role FROM users u WHERE u.id = audit_log.actor_id)
            WHERE actor_role IS NULL
              AND actor_id IS NOT NULL
              AND EXISTS (SELECT 1 FROM users u WHERE u.id = audit_log.actor_id)
            "#,
        )
        .execute(self.pool)
        .await
        .context("Failed to backfill actor roles")?;

        Ok(result.rows_affected())
    }

    pub async fn backfill_school_names(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE audit_log
            SET school_name = (SELECT s.name FROM schools s WHERE s.id = audit_log.school_id)
            WHERE school_name IS NULL
              AND school_id IS NOT NULL
              AND EXISTS (SELECT 1 FROM schools s WHERE s.id = audit_log.school_id)
            "#,
        )
        .execute(self.pool)
        .await
        .context("Failed to backfill school names")?;

        Ok(result.rows_affected())
    }

    // ==================== Reporting aggregates ====================

    pub async fn actor_activity(&self, since: DateTime<Utc>) -> Result<Vec<ActorActivity>> {
        let rows = sqlx::query(
            r#"
            SELECT actor_id, actor_email, COUNT(*) AS total,
                   SUM(CASE WHEN operation = 'CREATE' THEN 1 ELSE 0 END) AS creates,
                   SUM(CASE WHEN operation = 'UPDATE' THEN 1 ELSE 0 END) AS updates,
                   SUM(CASE WHEN operation = 'DELETE' THEN 1 ELSE 0 END) AS deletes
            FROM audit_log
            WHERE created_at >= ?
            GROUP BY actor_id, actor_email
            ORDER BY total DESC
            LIMIT 100
            "#,
        )
        .bind(since.to_rfc3339())
        .fetch_all(self.pool)
        .await
        .context("Failed to aggregate actor activity")?;

        Ok(rows
            .into_iter()
            .map(|row| ActorActivity {
                actor_id: row
                    .get::<Option<String>, _>("actor_id")
                    .and_then(|s| Uuid::parse_str(&s).ok()),
                actor_email: row.get("actor_email"),
                total: row.get("total"),
                creates: row.get("creates"),
                updates: row.get("updates"),
                deletes: row.get("deletes"),
            })
            .collect())
    }

    pub async fn entity_activity(&self, since: DateTime<Utc>) -> Result<Vec<EntityActivity>> {
        let rows = sqlx::query(
            r#"
            SELECT entity_type, COUNT(*) AS total,
                   SUM(CASE WHEN operation = 'CREATE' THEN 1 ELSE 0 END) AS creates,
                   SUM(CASE WHEN operation = 'UPDATE' THEN 1 ELSE 0 END) AS updates,
                   SUM(CASE WHEN operation = 'DELETE' THEN 1 ELSE 0 END) AS deletes
            FROM audit_log
            WHERE created_at >= ?
            GROUP BY entity_type
            ORDER BY total DESC
            "#,
        )
        .bind(since.to_rfc3339())
        .fetch_all(self.pool)
        .await
        .context("Failed to aggregate entity activity")?;

        Ok(rows
            .into_iter()
            .map(|row| EntityActivity {
                entity_type: row.get("entity_type"),
                total: row.get("total"),
                creates: row.get("creates"),
                updates: row.get("updates"),
                deletes: row.get("deletes"),
            })
            .collect())
    }

    /// Recent high-severity records: deletes, session events, and anything
    /// from a module flagged as sensitive.
    pub async fn critical_recent(
        &self,
        sensitive_modules: &[String],
        limit: u32,
    ) -> Result<Vec<AuditRecord>> {
        let mut sql = format!(
            "SELECT {} FROM audit_log WHERE (operation IN ('DELETE', 'LOGIN', 'LOGOUT')",
            SELECT_COLUMNS
        );
        if !sensitive_modules.is_empty() {
            let placeholders = vec!["?"; sensitive_modules.len()].join(", ");
            sql.push_str(&format!(" OR module IN ({})", placeholders));
        }
        sql.push_str(") ORDER BY created_at DESC, id DESC LIMIT ?");

        let mut q = sqlx::query_as::<_, AuditRow>(&sql);
        for module in sensitive_modules {
            q = q.bind(module);
        }
        q = q.bind(limit as i64);

        let rows = q
            .fetch_all(self.pool)
            .await
            .context("Failed to list critical audit records")?;

        Ok(rows.into_iter().map(row_to_record).collect())
    }
}

fn filter_clauses(query: &AuditLogQuery) -> String {
    let mut sql = String::new();
    if query.operation.is_some() {
        sql.push_str(" AND operation = ?");
    }
    if query.entity_type.is_some() {
        sql.push_str(" AND entity_type = ?");
    }
    if query.actor_id.is_some() {
        sql.push_str(" AND actor_id = ?");
    }
    if query.school_id.is_some() {
        sql.push_str(" AND school_id = ?");
    }
    if query.from.is_some() {
        sql.push_str(" AND created_at >= ?");
    }
    if query.to.is_some() {
        sql.push_str(" AND created_at <= ?");
    }
    if query.search.is_some() {
        sql.push_str(" AND (action LIKE ? OR actor_email LIKE ?)");
    }
    sql
}

fn bind_filters<'q>(
    mut q: sqlx::query::QueryAs<'q, sqlx::Sqlite, AuditRow, sqlx::sqlite::SqliteArguments<'q>>,
    query: &'q AuditLogQuery,
) -> sqlx::query::QueryAs<'q, sqlx::Sqlite, AuditRow, sqlx::sqlite::SqliteArguments<'q>> {
    if let Some(operation) = query.operation {
        q = q.bind(operation.as_str());
    }
    if let Some(ref entity_type) = query.entity_type {
        q = q.bind(entity_type);
    }
    if let Some(actor_id) = query.actor_id {
        q = q.bind(actor_id.to_string());
    }
    if let Some(school_id) = query.school_id {
        q = q.bind(school_id.to_string());
    }
    if let Some(from) = query.from {
        q = q.bind(from.to_rfc3339());
    }
    if let Some(to) = query.to {
        q = q.bind(to.to_rfc3339());
    }
    if let Some(ref search) = query.search {
        let pattern = format!("%{}%", search);
        q = q.bind(pattern.clone()).bind(pattern);
    }
    q
}

fn bind_filters_scalar<'q>(
    mut q: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    query: &'q AuditLogQuery,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    if let Some(operation) = query.operation {
        q = q.bind(operation.as_str());
    }
    if let Some(ref entity_type) = query.entity_type {
        q = q.bind(entity_type);
    }
    if let Some(actor_id) = query.actor_id {
        q = q.bind(actor_id.to_string());
    }
    if let Some(school_id) = query.school_id {
        q = q.bind(school_id.to_string());
    }
    if let Some(from) = query.from {
        q = q.bind(from.to_rfc3339());
    }
    if let Some(to) = query.to {
        q = q.bind(to.to_rfc3339());
    }
    if let Some(ref search) = query.search {
        let pattern = format!("%{}%", search);
        q = q.bind(pattern.clone()).bind(pattern);
    }
    q
}

fn row_to_record(row: AuditRow) -> AuditRecord {
    AuditRecord {
        id: Uuid::parse_str(&row.id).unwrap_or_else(|_| Uuid::nil()),
        operation: AuditOperation::from_str(&row.operation).unwrap_or(AuditOperation::Access),
        entity_type: row.entity_type,
        record_id: row.record_id,
        actor_id: row.actor_id.as_deref().and_then(|s| Uuid::parse_str(s).ok()),
        actor_email: row.actor_email,
        actor_role: row.actor_role,
        school_id: row
            .school_id
            .as_deref()
            .and_then(|s| Uuid::parse_str(s).ok()),
        school_name: row.school_name,
        before_state: row.before_state.and_then(|s| serde_json::from_str(&s).ok()),
        after_state: row.after_state.and_then(|s| serde_json::from_str(&s).ok()),
        changed_fields: row
            .changed_fields
            .and_then(|s| serde_json::from_str(&s).ok()),
        module: row.module,
        action: row.action,
        success: row.success != 0,
        error_message: row.error_message,
        duration_ms: row.duration_ms,
        ip_address: row.ip_address,
        user_agent: row.user_agent,
        request_id: row.request_id,
        session_id: row.session_id,
        created_at: parse_db_timestamp(&row.created_at),
    }
}
