//! Backup services: the object store and everything that runs against it.

pub mod backup_job;
pub mod mirror;
pub mod object_store;
pub mod pruner;
pub mod retention;
pub mod scheduler;
pub mod storage_service;
