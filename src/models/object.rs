//! Represents an object (backup artifact) stored in the backup bucket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Metadata row for a single stored object.
///
/// The payload lives on disk; this struct only carries what SQLite knows
/// about it.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Object {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Foreign key linking to the parent bucket.
    pub bucket_id: Uuid,

    /// Object key (path-like identifier within the bucket).
    pub key: String,

    /// Content type (MIME type), if one was supplied on upload.
    pub content_type: Option<String>,

    /// Size in bytes.
    pub size_bytes: i64,

    /// MD5 of the payload.
    pub etag: Option<String>,

    /// Store-assigned timestamp of the last write to this key.
    pub last_modified: DateTime<Utc>,
}

/// The view of an object that listing hands to the retention engine and
/// the mirror.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RemoteObject {
    pub key: String,
    pub last_modified: DateTime<Utc>,
    pub size_bytes: i64,
    pub etag: Option<String>,
}

impl RemoteObject {
    pub fn new(key: impl Into<String>, last_modified: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            last_modified,
            size_bytes: 0,
            etag: None,
        }
    }
}

impl From<Object> for RemoteObject {
    fn from(obj: Object) -> Self {
        Self {
            key: obj.key,
            last_modified: obj.last_modified,
            size_bytes: obj.size_bytes,
            etag: obj.etag,
        }
    }
}
