//! Common test utilities and helpers
//!
//! Shared test infrastructure: test application setup with a throwaway
//! SQLite database, seeded tenants and users, and an API test client.

pub mod test_app;

pub use test_app::*;
