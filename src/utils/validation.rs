//! Input validation utilities

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{decode_cursor, AuditLogQuery};
use crate::utils::AppError;

/// Largest page size the audit log endpoints will serve
pub const MAX_PAGE_SIZE: u32 = 500;

/// Default page size when none is requested
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Regex for entity type names (snake_case identifiers)
static ENTITY_TYPE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("static regex"));

/// Regex for field names appearing in snapshots
static FIELD_NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_.]*$").expect("static regex"));

/// Validate an entity type name
pub fn validate_entity_type(name: &str) -> bool {
    !name.is_empty() && name.len() <= 100 && ENTITY_TYPE_REGEX.is_match(name)
}

/// Validate a snapshot field name
pub fn validate_field_name(name: &str) -> bool {
    !name.is_empty() && name.len() <= 100 && FIELD_NAME_REGEX.is_match(name)
}

/// Validate pagination and range inputs on an audit log query, naming the
/// offending field in the error.
pub fn validate_audit_query(query: &AuditLogQuery) -> Result<(), AppError> {
    if let Some(limit) = query.limit {
        if limit == 0 || limit > MAX_PAGE_SIZE {
            return Err(AppError::validation(format!(
                "limit must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
    }
    if let (Some(from), Some(to)) = (query.from, query.to) {
        if from > to {
            return Err(AppError::validation("from must not be after to"));
        }
    }
    if let Some(ref entity_type) = query.entity_type {
        if !validate_entity_type(entity_type) {
            return Err(AppError::validation("entity_type is not a valid identifier"));
        }
    }
    if let Some(ref search) = query.search {
        if search.len() > 200 {
            return Err(AppError::validation("search must be at most 200 characters"));
        }
    }
    if let Some(ref cursor) = query.cursor {
        if decode_cursor(cursor).is_none() {
            return Err(AppError::validation("cursor is not a valid page cursor"));
        }
    }
    Ok(())
}
