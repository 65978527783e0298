//! Represents the bucket that holds every backup object.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A storage bucket. A deployment uses exactly one, created on startup
/// if it does not exist yet.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Bucket {
    /// Unique identifier for this bucket (UUID for internal DB use).
    pub id: Uuid,

    /// Bucket name (S3 naming rules).
    pub name: String,

    /// Region label recorded at creation (e.g. "local", "us-east-1").
    pub region: String,

    /// When this bucket was created.
    pub created_at: DateTime<Utc>,
}
