//! Audit policy registry
//!
//! Per-entity-type policies are kept in a read-mostly in-memory snapshot
//! backed by the `audit_policies` table. Lookups clone a single `Arc`;
//! upserts write through to the database, rebuild the whole map, and swap it
//! in one assignment, so concurrent capture calls never observe a policy
//! with some fields updated and some not.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tokio::sync::RwLock;
use tracing::{debug, info};
use validator::Validate;

use crate::db::PolicyRepository;
use crate::models::{AuditPolicy, UpsertPolicyRequest};
use crate::utils::validation::{validate_entity_type, validate_field_name};
use crate::utils::AppError;

type PolicyMap = HashMap<String, Arc<AuditPolicy>>;

pub struct PolicyRegistry {
    pool: SqlitePool,
    cache: RwLock<Arc<PolicyMap>>,
}

impl PolicyRegistry {
    /// Load all policies from the database into the initial snapshot.
    pub async fn load(pool: SqlitePool) -> Result<Self> {
        let snapshot = Self::build_snapshot(&pool).await?;
        info!("Audit policy registry loaded ({} policies)", snapshot.len());
        Ok(Self {
            pool,
            cache: RwLock::new(Arc::new(snapshot)),
        })
    }

    async fn build_snapshot(pool: &SqlitePool) -> Result<PolicyMap> {
        let repo = PolicyRepository::new(pool);
        let policies = repo
            .get_all()
            .await
            .context("Failed to load audit policies")?;
        Ok(policies
            .into_iter()
            .map(|p| (p.entity_type.clone(), Arc::new(p)))
            .collect())
    }

    /// Resolve the policy for an entity type. Unregistered entity types get a
    /// default-disabled policy and are never audited.
    pub async fn get(&self, entity_type: &str) -> Arc<AuditPolicy> {
        let snapshot = self.cache.read().await.clone();
        match snapshot.get(entity_type) {
            Some(policy) => policy.clone(),
            None => Arc::new(AuditPolicy::disabled(entity_type)),
        }
    }

    /// All registered policies, for the admin API.
    pub async fn all(&self) -> Vec<Arc<AuditPolicy>> {
        let snapshot = self.cache.read().await.clone();
        let mut policies: Vec<_> = snapshot.values().cloned().collect();
        policies.sort_by(|a, b| a.entity_type.cmp(&b.entity_type));
        policies
    }

    /// Validate and persist a policy, then swap in a fresh snapshot.
    pub async fn upsert(&self, request: UpsertPolicyRequest) -> Result<AuditPolicy, AppError> {
        request.validate()?;
        validate_upsert(&request)?;

        let repo = PolicyRepository::new(&self.pool);
        let stored = repo.upsert(&request).await.map_err(AppError::from)?;

        let snapshot = Self::build_snapshot(&self.pool)
            .await
            .map_err(AppError::from)?;
        *self.cache.write().await = Arc::new(snapshot);
        debug!(entity_type = %stored.entity_type, "Audit policy updated");

        Ok(stored)
    }

    /// Re-read the snapshot from the database (used after external writes,
    /// e.g. migrations applied while running).
    pub async fn refresh(&self) -> Result<()> {
        let snapshot = Self::build_snapshot(&self.pool).await?;
        *self.cache.write().await = Arc::new(snapshot);
        Ok(())
    }
}

fn validate_upsert(request: &UpsertPolicyRequest) -> Result<(), AppError> {
    if !validate_entity_type(&request.entity_type) {
        return Err(AppError::validation(
            "entity_type must be a lowercase identifier",
        ));
    }
    if request.retention_days < 0 {
        return Err(AppError::validation(
            "retention_days must be 0 (never expire) or positive",
        ));
    }
    for field in request
        .sensitive_fields
        .iter()
        .chain(request.excluded_fields.iter())
    {
        if !validate_field_name(field) {
            return Err(AppError::validation(format!(
                "invalid field name in policy: {}",
                field
            )));
        }
    }
    Ok(())
}
