//! Retention sweeper
//!
//! Purges audit records past their entity type's retention window. Runs on a
//! fixed interval in the background and can also be triggered manually
//! through the maintenance API. Deletion is purely age-based, so repeated or
//! interrupted runs converge to the same end state.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use sqlx::SqlitePool;
use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::{debug, error, info};

use crate::audit::{ActorContext, AuditEngine, PolicyRegistry};
use crate::config::AuditConfig;
use crate::db::AuditRepository;
use crate::models::{AuditOperation, EntitySweepResult, SweepSummary};

pub struct RetentionSweeper {
    pool: SqlitePool,
    registry: Arc<PolicyRegistry>,
    engine: Arc<AuditEngine>,
    /// Checked between per-entity batches; clearing it stops the sweep at
    /// the next batch boundary without leaving partial per-record state.
    running: Arc<RwLock<bool>>,
}

impl RetentionSweeper {
    pub fn new(pool: SqlitePool, registry: Arc<PolicyRegistry>, engine: Arc<AuditEngine>) -> Self {
        Self {
            pool,
            registry,
            engine,
            running: Arc::new(RwLock::new(true)),
        }
    }

    pub async fn stop(&self) {
        *self.running.write().await = false;
        info!("Retention sweeper stop requested");
    }

    /// One full sweep over every enabled policy with a positive retention
    /// period. A failure on one entity type is collected into the summary
    /// and does not abort the remaining batches.
    pub async fn sweep(&self) -> SweepSummary {
        let mut summary = SweepSummary::default();
        let now = Utc::now();
        let repo = AuditRepository::new(&self.pool);
        let system = ActorContext::system();

        for policy in self.registry.all().await {
            if !*self.running.read().await {
                info!("Retention sweep interrupted before '{}'", policy.entity_type);
                summary.interrupted = true;
                break;
            }
            if !policy.enabled || policy.retention_days <= 0 {
                continue;
            }

            let cutoff = now - chrono::Duration::days(policy.retention_days);
            match repo.delete_older_than(&policy.entity_type, cutoff).await {
                Ok(deleted) => {
                    if deleted > 0 {
                        info!(
                            entity_type = %policy.entity_type,
                            deleted,
                            "Purged expired audit records"
                        );
                        self.engine
                            .record_event(
                                &system,
                                AuditOperation::Delete,
                                &policy.entity_type,
                                "audit",
                                "retention_sweep",
                                true,
                                None,
                                Some(json!({
                                    "deleted": deleted,
                                    "cutoff": cutoff.to_rfc3339(),
                                    "retention_days": policy.retention_days,
                                })),
                            )
                            .await;
                    } else {
                        debug!(entity_type = %policy.entity_type, "No expired audit records");
                    }
                    summary.total_deleted += deleted;
                    summary.entities.push(EntitySweepResult {
                        entity_type: policy.entity_type.clone(),
                        deleted,
                        error: None,
                    });
                }
                Err(e) => {
                    error!(
                        entity_type = %policy.entity_type,
                        error = %e,
                        "Retention sweep batch failed"
                    );
                    summary.entities.push(EntitySweepResult {
                        entity_type: policy.entity_type.clone(),
                        deleted: 0,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        summary
    }
}

/// Start the background retention scheduler. Returns the sweeper handle so
/// the caller can request a stop on shutdown.
pub fn start_retention_scheduler(
    pool: SqlitePool,
    registry: Arc<PolicyRegistry>,
    engine: Arc<AuditEngine>,
    config: AuditConfig,
) -> Arc<RetentionSweeper> {
    let sweeper = Arc::new(RetentionSweeper::new(pool, registry, engine));
    let task_sweeper = sweeper.clone();

    tokio::spawn(async move {
        let sweep_interval = Duration::from_secs(config.sweep_interval_secs);
        let mut interval_timer = interval(sweep_interval);

        info!(
            "Retention scheduler started (interval: {}s)",
            sweep_interval.as_secs()
        );

        // Let the rest of the service come up before the first sweep
        tokio::time::sleep(Duration::from_secs(30)).await;

        loop {
            interval_timer.tick().await;

            if !*task_sweeper.running.read().await {
                info!("Retention scheduler stopping");
                break;
            }

            let summary = task_sweeper.sweep().await;
            if summary.total_deleted > 0 {
                info!(
                    deleted = summary.total_deleted,
                    "Scheduled retention sweep finished"
                );
            }
        }
    });

    sweeper
}
