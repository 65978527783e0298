//! Executes a deletion set against the object store.

use crate::{
    models::report::{ChunkFailure, DeleteReport, KeyFailure},
    services::object_store::{MAX_DELETE_BATCH, ObjectStore},
};
use tracing::{debug, warn};

/// Delete `keys` in chunks of at most [`MAX_DELETE_BATCH`], one request at
/// a time.
///
/// A failed request is recorded and the remaining chunks still go out.
/// Nothing is rolled back; whatever survives is reconsidered on the next
/// run.
pub async fn delete_objects<S>(store: &S, keys: &[String]) -> DeleteReport
where
    S: ObjectStore + ?Sized,
{
    let mut report = DeleteReport::default();

    for (index, chunk) in keys.chunks(MAX_DELETE_BATCH).enumerate() {
        report.requests += 1;
        match store.delete_objects(chunk).await {
            Ok(outcomes) => {
                debug!(chunk = index, keys = chunk.len(), "delete request completed");
                for outcome in outcomes {
                    match outcome.error {
                        None => report.deleted.push(outcome.key),
                        Some(error) => {
                            warn!(key = %outcome.key, %error, "object not deleted");
                            report.failed_keys.push(KeyFailure {
                                key: outcome.key,
                                error,
                            });
                        }
                    }
                }
            }
            Err(err) => {
                warn!(chunk = index, keys = chunk.len(), error = %err, "delete request failed");
                report.failed_chunks.push(ChunkFailure {
                    index,
                    keys: chunk.to_vec(),
                    error: err.to_string(),
                });
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{models::object::RemoteObject, services::object_store::memory::MemoryStore};
    use chrono::Utc;

    fn seeded(count: usize) -> (MemoryStore, Vec<String>) {
        let now = Utc::now();
        let keys: Vec<String> = (0..count).map(|i| format!("b/old/{i:05}")).collect();
        let store =
            MemoryStore::with_objects(keys.iter().map(|k| RemoteObject::new(k.clone(), now)));
        (store, keys)
    }

    #[tokio::test]
    async fn batches_at_the_request_limit() {
        let (store, keys) = seeded(2500);

        let report = delete_objects(&store, &keys).await;

        assert_eq!(store.delete_requests(), vec![1000, 1000, 500]);
        assert_eq!(report.requests, 3);
        assert_eq!(report.deleted.len(), 2500);
        assert!(report.is_clean());
        assert!(store.keys().is_empty());
    }

    #[tokio::test]
    async fn no_keys_means_no_request() {
        let (store, _) = seeded(3);

        let report = delete_objects(&store, &[]).await;

        assert!(store.delete_requests().is_empty());
        assert_eq!(report, DeleteReport::default());
    }

    #[tokio::test]
    async fn failed_chunk_does_not_stop_later_chunks() {
        let (store, keys) = seeded(2100);
        store.fail_request(1);

        let report = delete_objects(&store, &keys).await;

        assert_eq!(store.delete_requests(), vec![1000, 1000, 100]);
        assert_eq!(report.deleted.len(), 1100);
        assert_eq!(report.failed_chunks.len(), 1);
        assert_eq!(report.failed_chunks[0].index, 1);
        assert_eq!(report.failed_chunks[0].keys, keys[1000..2000].to_vec());
        assert_eq!(report.failed_count(), 1000);
        assert_eq!(store.keys(), keys[1000..2000].to_vec());
    }

    #[tokio::test]
    async fn per_key_failures_are_reported_individually() {
        let (store, keys) = seeded(4);
        store.fail_key(&keys[2]);

        let report = delete_objects(&store, &keys).await;

        assert_eq!(report.deleted, vec![keys[0].clone(), keys[1].clone(), keys[3].clone()]);
        assert_eq!(report.failed_keys.len(), 1);
        assert_eq!(report.failed_keys[0].key, keys[2]);
        assert!(!report.is_clean());
    }
}
