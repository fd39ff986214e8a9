//! # hubsync
//!
//! Background worker that mirrors a user's GitHub repositories,
//! organizations, and collaborator permissions into a local relational
//! store, driven by a database-backed task queue.

pub mod config;
pub mod db;
pub mod github;
pub mod models;
pub mod sync;
pub mod telemetry;
pub mod token;
pub mod worker;
pub use migration;
