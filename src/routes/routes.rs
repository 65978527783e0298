//! Defines routes for the status server.
//!
//! ## Structure
//! - `GET  /healthz` -> liveness
//! - `GET  /readyz`  -> readiness (SQLite, disk, backup directory)
//! - `GET  /status`  -> retention settings and the last run report
//! - `POST /runs`    -> run mirror-then-prune immediately

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        run_handlers::{status, trigger_run},
    },
    services::{backup_job::BackupJob, storage_service::StorageService},
};
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub storage: StorageService,
    pub job: Arc<BackupJob>,
}

/// Build and return the router for the status server.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/status", get(status))
        .route("/runs", post(trigger_run))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{backup_job::JobSettings, retention::RetentionPolicy};
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use serde_json::Value;
    use sqlx::sqlite::SqlitePoolOptions;
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn app(backup_dir_exists: bool) -> (Router, AppState, TempDir) {
        let dir = TempDir::new().unwrap();
        let backup_dir = dir.path().join("backups");
        if backup_dir_exists {
            std::fs::create_dir_all(backup_dir.join("2026-01-10_12-00")).unwrap();
            std::fs::write(backup_dir.join("2026-01-10_12-00/world.bin"), b"w").unwrap();
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        StorageService::run_migrations(&pool).await.unwrap();
        let storage = StorageService::new(Arc::new(pool), dir.path().join("objects"), "hytale-backups");
        storage.ensure_bucket("local").await.unwrap();

        let job = Arc::new(BackupJob::new(
            Arc::new(storage.clone()),
            JobSettings {
                backup_dir,
                policy: RetentionPolicy::new("hytale/backups/", 5),
            },
        ));
        let state = AppState { storage, job };
        (routes().with_state(state.clone()), state, dir)
    }

    async fn json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn healthz_is_ok() {
        let (app, _, _dir) = app(true).await;

        let response = app.oneshot(request("GET", "/healthz")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn readyz_fails_without_backup_dir() {
        let (app, _, _dir) = app(false).await;

        let response = app.oneshot(request("GET", "/readyz")).await.unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = json(response).await;
        assert_eq!(body["checks"]["sqlite"]["ok"], true);
        assert_eq!(body["checks"]["backup_dir"]["ok"], false);
    }

    #[tokio::test]
    async fn manual_run_mirrors_and_updates_status() {
        let (app, _, _dir) = app(true).await;

        let before = json(app.clone().oneshot(request("GET", "/status")).await.unwrap()).await;
        assert!(before["last_run"].is_null());

        let response = app.clone().oneshot(request("POST", "/runs")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let run = json(response).await;
        assert_eq!(run["outcome"]["status"], "completed");
        assert_eq!(
            run["mirror"]["uploaded"][0],
            "hytale/backups/2026-01-10_12-00/world.bin"
        );

        let after = json(app.oneshot(request("GET", "/status")).await.unwrap()).await;
        assert_eq!(after["keep"], 5);
        assert_eq!(after["last_run"]["listed"], 1);
    }
}
