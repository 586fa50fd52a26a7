//! Integration test modules

mod api_tests;
mod maintenance_tests;
