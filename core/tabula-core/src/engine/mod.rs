//! Database Engine Module

pub mod constructors;
pub mod database;
pub mod project;

pub use database::Database;
pub use project::Project;
