//! Data models

mod audit;
mod school;
mod user;

pub use audit::*;
pub use school::*;
pub use user::*;
