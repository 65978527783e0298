use anyhow::{Context, Result};
use chrono::Duration as ChronoDuration;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{fs, io::ErrorKind, path::Path, str::FromStr, sync::Arc};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use hytale_backup::{
    bootstrap::{
        plan::{ProvisionPlan, UserDataOptions},
        units::{UnitOptions, backup_units},
    },
    config::{AppConfig, Command},
    routes::routes::{AppState, routes},
    services::{
        backup_job::{BackupJob, JobSettings},
        retention::RetentionPolicy,
        scheduler::Scheduler,
        storage_service::StorageService,
    },
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + command ---
    let (cfg, command) = AppConfig::from_env_and_args()?;

    // Rendering commands never touch storage.
    match &command {
        Command::RenderUserData(args) => {
            let plan = ProvisionPlan::instance_user_data(&UserDataOptions {
                bootstrap_bucket: args.bootstrap_bucket.clone(),
                bootstrap_key: args.bootstrap_key.clone(),
                downloader_bucket: args.downloader_bucket.clone(),
                downloader_key: args.downloader_key.clone(),
                backup_bucket: cfg.bucket.clone(),
                webhook_secret_arn: args.webhook_secret_arn.clone(),
                data_volume_size_gib: args.data_volume_size_gib,
            })?;
            print!("{}", plan.render()?);
            return Ok(());
        }
        Command::RenderUnits(args) => {
            for unit in backup_units(&UnitOptions {
                binary_path: args.binary_path.clone(),
                env_file: args.env_file.clone(),
                initial_delay: cfg.initial_delay,
                interval: cfg.interval,
            }) {
                println!("# {}\n{}", unit.name, unit.contents);
            }
            return Ok(());
        }
        Command::Serve | Command::RunOnce | Command::Migrate => {}
    }

    tracing::info!("Starting hytale-backup with config: {:?}", cfg);

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Initialize SQLite connection ---
    let connect_options = SqliteConnectOptions::from_str(&cfg.database_url)
        .with_context(|| format!("parsing database URL `{}`", cfg.database_url))?
        .create_if_missing(true);
    if let Some(parent) = connect_options.get_filename().parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }
    let db = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?,
    );

    StorageService::run_migrations(&db).await?;
    if command == Command::Migrate {
        tracing::info!("Database migration complete.");
        return Ok(());
    }

    // --- Initialize core services ---
    let storage = StorageService::new(db, cfg.storage_dir.clone(), cfg.bucket.clone());
    storage.ensure_bucket(&cfg.region).await?;

    let grace = ChronoDuration::from_std(cfg.grace).context("grace window out of range")?;
    let job = Arc::new(BackupJob::new(
        Arc::new(storage.clone()),
        JobSettings {
            backup_dir: cfg.backup_dir.clone().into(),
            policy: RetentionPolicy::new(cfg.prefix.clone(), cfg.keep).with_grace(grace),
        },
    ));

    if command == Command::RunOnce {
        let report = job.run_once().await?;
        tracing::info!(
            uploaded = report.mirror.uploaded.len(),
            deleted = report.deletion.deleted.len(),
            failed = report.deletion.failed_count(),
            "run-once complete"
        );
        return Ok(());
    }

    serve(cfg, storage, job).await
}

/// Run the scheduler, plus the status server when enabled, until Ctrl-C.
async fn serve(cfg: AppConfig, storage: StorageService, job: Arc<BackupJob>) -> Result<()> {
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("Failed to listen for shutdown signal: {}", err);
                return;
            }
            tracing::info!("Shutdown requested");
            shutdown.cancel();
        });
    }

    let scheduler = Scheduler::new(cfg.initial_delay, cfg.interval);
    let scheduled = {
        let job = job.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            scheduler
                .run(shutdown.cancelled_owned(), || {
                    let job = job.clone();
                    async move {
                        if let Err(err) = job.run_once().await {
                            tracing::error!("Scheduled backup run failed: {}", err);
                        }
                    }
                })
                .await
        })
    };

    if cfg.status_server {
        let app = routes().with_state(AppState { storage, job });

        let addr = cfg.addr();
        let listener = match TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(err)
                if err.kind() == ErrorKind::PermissionDenied
                    && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
            {
                let fallback_addr = format!("127.0.0.1:{}", cfg.port);
                tracing::warn!(
                    "Permission denied binding to {} ({}). Falling back to {}",
                    addr,
                    err,
                    fallback_addr
                );
                TcpListener::bind(&fallback_addr).await?
            }
            Err(err) => return Err(err.into()),
        };

        tracing::info!("Status server listening on http://{}", listener.local_addr()?);
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.clone().cancelled_owned())
            .await?;
    }

    let runs = scheduled.await?;
    tracing::info!("Exiting after {} scheduled runs", runs);
    Ok(())
}
