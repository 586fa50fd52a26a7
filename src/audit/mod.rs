//! Audit trail engine
//!
//! Change capture for every tracked mutation: per-entity policies decide what
//! is recorded, the request-scoped [`ActorContext`] supplies who did it, and
//! the [`AuditEngine`] writes the before/after diff to the append-only log.

pub mod capture;
pub mod context;
pub mod policy;

pub use capture::{AuditEngine, MutationEvent, MASK};
pub use context::ActorContext;
pub use policy::PolicyRegistry;
