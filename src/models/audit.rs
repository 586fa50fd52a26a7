//! Audit trail models
//!
//! An `AuditRecord` is immutable once written; the only later mutation allowed
//! is the backfill pass filling previously-NULL denormalized columns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Kind of operation an audit record describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditOperation {
    Create,
    Update,
    Delete,
    Login,
    Logout,
    Access,
    Export,
    Import,
}

impl AuditOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOperation::Create => "CREATE",
            AuditOperation::Update => "UPDATE",
            AuditOperation::Delete => "DELETE",
            AuditOperation::Login => "LOGIN",
            AuditOperation::Logout => "LOGOUT",
            AuditOperation::Access => "ACCESS",
            AuditOperation::Export => "EXPORT",
            AuditOperation::Import => "IMPORT",
        }
    }
}

impl std::fmt::Display for AuditOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AuditOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "CREATE" => Ok(AuditOperation::Create),
            "UPDATE" => Ok(AuditOperation::Update),
            "DELETE" => Ok(AuditOperation::Delete),
            "LOGIN" => Ok(AuditOperation::Login),
            "LOGOUT" => Ok(AuditOperation::Logout),
            "ACCESS" => Ok(AuditOperation::Access),
            "EXPORT" => Ok(AuditOperation::Export),
            "IMPORT" => Ok(AuditOperation::Import),
            other => Err(format!("Unknown audit operation: {}", other)),
        }
    }
}

/// A single entry in the audit log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub operation: AuditOperation,
    pub entity_type: String,
    /// Target record identifier; absent for non-entity events such as LOGIN
    pub record_id: Option<String>,
    /// Acting user; absent for system-initiated changes
    pub actor_id: Option<Uuid>,
    /// Denormalized at write time, repairable by backfill
    pub actor_email: Option<String>,
    pub actor_role: Option<String>,
    pub school_id: Option<Uuid>,
    pub school_name: Option<String>,
    pub before_state: Option<serde_json::Value>,
    pub after_state: Option<serde_json::Value>,
    /// Derived field list, UPDATE only
    pub changed_fields: Option<Vec<String>>,
    pub module: String,
    pub action: String,
    pub success: bool,
    pub error_message: Option<String>,
    pub duration_ms: Option<i64>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub request_id: Option<String>,
    pub session_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Per-entity-type audit policy
///
/// Looked up on every mutation; unregistered entity types resolve to
/// [`AuditPolicy::disabled`] so unclassified data is never captured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditPolicy {
    pub entity_type: String,
    pub module: String,
    pub enabled: bool,
    pub track_creates: bool,
    pub track_updates: bool,
    pub track_deletes: bool,
    pub track_reads: bool,
    /// Field names masked in snapshots, never stored in plaintext
    pub sensitive_fields: Vec<String>,
    /// Field names omitted entirely from snapshots and diffing
    pub excluded_fields: Vec<String>,
    /// Days before records expire; 0 means never expire
    pub retention_days: i64,
    pub updated_at: DateTime<Utc>,
}

impl AuditPolicy {
    /// Default policy for an unregistered entity type: nothing is tracked
    pub fn disabled(entity_type: &str) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            module: String::new(),
            enabled: false,
            track_creates: false,
            track_updates: false,
            track_deletes: false,
            track_reads: false,
            sensitive_fields: Vec::new(),
            excluded_fields: Vec::new(),
            retention_days: 0,
            updated_at: Utc::now(),
        }
    }

    /// Whether the given operation kind is tracked under this policy
    pub fn tracks(&self, operation: AuditOperation) -> bool {
        if !self.enabled {
            return false;
        }
        match operation {
            AuditOperation::Create | AuditOperation::Import => self.track_creates,
            AuditOperation::Update => self.track_updates,
            AuditOperation::Delete => self.track_deletes,
            AuditOperation::Access | AuditOperation::Export => self.track_reads,
            // Session events are not entity mutations; always recorded
            AuditOperation::Login | AuditOperation::Logout => true,
        }
    }
}

/// Payload for creating or replacing an audit policy
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpsertPolicyRequest {
    #[validate(length(min = 1, max = 100))]
    pub entity_type: String,
    #[serde(default)]
    pub module: String,
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub track_creates: bool,
    #[serde(default = "default_true")]
    pub track_updates: bool,
    #[serde(default = "default_true")]
    pub track_deletes: bool,
    #[serde(default)]
    pub track_reads: bool,
    #[serde(default)]
    pub sensitive_fields: Vec<String>,
    #[serde(default)]
    pub excluded_fields: Vec<String>,
    /// 0 means never expire; negative values are rejected
    #[serde(default)]
    pub retention_days: i64,
}

fn default_true() -> bool {
    true
}

/// Query parameters accepted by the audit log listing endpoints
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AuditLogQuery {
    pub operation: Option<AuditOperation>,
    pub entity_type: Option<String>,
    pub actor_id: Option<Uuid>,
    pub school_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// Free-text search over action and actor email
    pub search: Option<String>,
    pub limit: Option<u32>,
    /// Keyset cursor from the previous page's `next_cursor`. Pages pinned by
    /// a cursor stay disjoint while new records are appended concurrently.
    pub cursor: Option<String>,
}

/// One page of audit records
#[derive(Debug, Clone, Serialize)]
pub struct AuditLogPage {
    pub records: Vec<AuditRecord>,
    pub total: i64,
    pub limit: u32,
    /// Cursor for the next page, absent when this page was not full
    pub next_cursor: Option<String>,
}

/// Encode the `(created_at, id)` position of a record as a page cursor.
pub fn encode_cursor(created_at: DateTime<Utc>, id: Uuid) -> String {
    format!("{}|{}", created_at.to_rfc3339(), id)
}

/// Decode a cursor produced by [`encode_cursor`]. `None` for anything
/// malformed.
pub fn decode_cursor(cursor: &str) -> Option<(DateTime<Utc>, Uuid)> {
    let (ts, id) = cursor.rsplit_once('|')?;
    let created_at = DateTime::parse_from_rfc3339(ts).ok()?.with_timezone(&Utc);
    let id = Uuid::parse_str(id).ok()?;
    Some((created_at, id))
}

/// Per-actor activity over a trailing window
#[derive(Debug, Clone, Serialize)]
pub struct ActorActivity {
    pub actor_id: Option<Uuid>,
    pub actor_email: Option<String>,
    pub total: i64,
    pub creates: i64,
    pub updates: i64,
    pub deletes: i64,
}

/// Per-entity-type activity over a trailing window
#[derive(Debug, Clone, Serialize)]
pub struct EntityActivity {
    pub entity_type: String,
    pub total: i64,
    pub creates: i64,
    pub updates: i64,
    pub deletes: i64,
}

/// Result of a retention sweep run
#[derive(Debug, Clone, Serialize, Default)]
pub struct SweepSummary {
    pub total_deleted: u64,
    pub entities: Vec<EntitySweepResult>,
    /// True when the sweep was stopped early by a shutdown request
    pub interrupted: bool,
}

/// Per-entity-type outcome within a sweep
#[derive(Debug, Clone, Serialize)]
pub struct EntitySweepResult {
    pub entity_type: String,
    pub deleted: u64,
    pub error: Option<String>,
}

/// Result of a backfill run
#[derive(Debug, Clone, Serialize, Default)]
pub struct BackfillSummary {
    pub actor_emails_filled: u64,
    pub actor_roles_filled: u64,
    pub school_names_filled: u64,
    pub errors: Vec<String>,
}
