//! Audit record backfill
//!
//! Repair pass for historical records written without full context: fills
//! denormalized actor and school columns that are still NULL by joining
//! against the current reference tables. Already-populated values are never
//! touched, so the pass can run any number of times.

use sqlx::SqlitePool;
use tracing::{error, info};

use crate::db::AuditRepository;
use crate::models::BackfillSummary;

pub struct BackfillService {
    pool: SqlitePool,
}

impl BackfillService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Run the full backfill. A failing step is recorded in the summary and
    /// does not stop the remaining steps.
    pub async fn run(&self) -> BackfillSummary {
        let repo = AuditRepository::new(&self.pool);
        let mut summary = BackfillSummary::default();

        match repo.backfill_actor_emails().await {
            Ok(n) => summary.actor_emails_filled = n,
            Err(e) => {
                error!(error = %e, "Backfill of actor emails failed");
                summary.errors.push(format!("actor_email: {}", e));
            }
        }

        match repo.backfill_actor_roles().await {
            Ok(n) => summary.actor_roles_filled = n,
            Err(e) => {
                error!(error = %e, "Backfill of actor roles failed");
                summary.errors.push(format!("actor_role: {}", e));
            }
        }

        match repo.backfill_school_names().await {
            Ok(n) => summary.school_names_filled = n,
            Err(e) => {
                error!(error = %e, "Backfill of school names failed");
                summary.errors.push(format!("school_name: {}", e));
            }
        }

        info!(
            actor_emails = summary.actor_emails_filled,
            actor_roles = summary.actor_roles_filled,
            school_names = summary.school_names_filled,
            "Backfill pass finished"
        );

        summary
    }
}
