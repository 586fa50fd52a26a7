//! Business logic services

pub mod auth;
pub mod backfill;
pub mod reporting;
pub mod retention;

pub use auth::AuthService;
pub use backfill::BackfillService;
pub use reporting::ReportingService;
pub use retention::{start_retention_scheduler, RetentionSweeper};
