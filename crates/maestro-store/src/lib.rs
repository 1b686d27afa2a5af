//! SQLite-backed learning store for the maestro execution core.
//!
//! Implements [`maestro_core::store::LearningStore`] over a local SQLite
//! database with failure-pattern analysis.

pub mod models;
pub mod patterns;
pub mod pool;

mod store;

pub use store::SqliteLearningStore;
