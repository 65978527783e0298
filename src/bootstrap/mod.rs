//! Instance bootstrap rendering: the user-data provisioning plan and the
//! timer units that schedule backups. Text generation only.

pub mod plan;
pub mod units;
