//! Reporting views over the audit trail
//!
//! Read-only aggregates for dashboards plus CSV export of filtered log
//! pages. All views are computed on demand from `audit_log`; nothing here
//! writes.

use chrono::{Duration, Utc};
use sqlx::SqlitePool;

use crate::db::AuditRepository;
use crate::models::{ActorActivity, AuditRecord, EntityActivity};
use crate::utils::AppResult;

pub struct ReportingService {
    pool: SqlitePool,
}

impl ReportingService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Per-actor counts over the trailing window, busiest actors first
    pub async fn actor_activity(&self, days: i64) -> AppResult<Vec<ActorActivity>> {
        let since = Utc::now() - Duration::days(days);
        let rows = AuditRepository::new(&self.pool).actor_activity(since).await?;
        Ok(rows)
    }

    /// Per-entity-type counts over the trailing window
    pub async fn entity_activity(&self, days: i64) -> AppResult<Vec<EntityActivity>> {
        let since = Utc::now() - Duration::days(days);
        let rows = AuditRepository::new(&self.pool).entity_activity(since).await?;
        Ok(rows)
    }

    /// Most recent high-severity records: deletes, session events, and
    /// activity in modules configured as sensitive.
    pub async fn critical_recent(
        &self,
        sensitive_modules: &[String],
        limit: u32,
    ) -> AppResult<Vec<AuditRecord>> {
        let rows = AuditRepository::new(&self.pool)
            .critical_recent(sensitive_modules, limit)
            .await?;
        Ok(rows)
    }

    /// Render records as CSV with a fixed header row. State snapshots are
    /// left out; the export is meant for spreadsheet review, not replay.
    pub fn export_csv(records: &[AuditRecord]) -> String {
        let mut csv = String::from(
            "id,created_at,operation,entity_type,record_id,actor_email,actor_role,school_id,module,action,success,changed_fields,ip_address\n",
        );

        for record in records {
            let changed = record
                .changed_fields
                .as_ref()
                .map(|f| f.join(";"))
                .unwrap_or_default();
            let row = [
                record.id.to_string(),
                record.created_at.to_rfc3339(),
                record.operation.as_str().to_string(),
                record.entity_type.clone(),
                record.record_id.clone().unwrap_or_default(),
                record.actor_email.clone().unwrap_or_default(),
                record.actor_role.clone().unwrap_or_default(),
                record
                    .school_id
                    .map(|id| id.to_string())
                    .unwrap_or_default(),
                record.module.clone(),
                record.action.clone(),
                record.success.to_string(),
                changed,
                record.ip_address.clone().unwrap_or_default(),
            ];
            let escaped: Vec<String> = row.iter().map(|f| escape_csv(f)).collect();
            csv.push_str(&escaped.join(","));
            csv.push('\n');
        }

        csv
    }
}

/// Quote a field if it contains a delimiter, quote, or newline
fn escape_csv(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
