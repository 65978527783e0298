//! hytale-backup
//!
//! Mirrors a game server's local backup directory into an object store and
//! prunes the remote history down to the newest N backups.
//!
//! - **services::retention**: which backup groups to keep and delete
//! - **services::pruner**: batched deletion with per-chunk failure reporting
//! - **services::mirror**: additive upload of the local backup directory
//! - **services::backup_job** / **services::scheduler**: the periodic run
//! - **services::storage_service**: SQLite + disk object store
//! - **bootstrap**: instance user-data and timer unit rendering

pub mod bootstrap;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
