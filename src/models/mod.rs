//! Data models for the backup store and for run reporting.
//!
//! `bucket` and `object` map to SQLite tables via `sqlx::FromRow`;
//! `report` only ever travels as JSON.

pub mod bucket;
pub mod object;
pub mod report;
