//! Additive, one-directional mirror of the local backup directory into the
//! object store.
//!
//! A file is uploaded when the remote copy is missing, differs in size, or
//! is older than the local file. Remote objects are never deleted here;
//! pruning is the only thing that shrinks the remote history.

use crate::{
    models::{
        object::RemoteObject,
        report::{MirrorFailure, MirrorReport},
    },
    services::object_store::ObjectStore,
};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("backup directory `{0}` does not exist")]
    MissingDirectory(PathBuf),
    #[error("cannot read backup directory `{path}`: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("directory scan aborted: {0}")]
    Scan(#[from] tokio::task::JoinError),
}

/// A regular file found under the backup directory.
#[derive(Debug, Clone)]
struct LocalFile {
    path: PathBuf,
    key: String,
    size: u64,
    modified: DateTime<Utc>,
}

impl LocalFile {
    fn needs_upload(&self, remote: Option<&RemoteObject>) -> bool {
        match remote {
            None => true,
            Some(remote) => {
                remote.size_bytes != self.size as i64 || self.modified > remote.last_modified
            }
        }
    }
}

/// Upload new and changed files under `local_dir` to `prefix`.
///
/// Per-file failures are collected in the report; only a missing or
/// unreadable root directory is an error.
pub async fn mirror_directory<S>(
    store: &S,
    local_dir: &Path,
    prefix: &str,
) -> Result<MirrorReport, MirrorError>
where
    S: ObjectStore + ?Sized,
{
    let root = local_dir.to_path_buf();
    let scan_prefix = prefix.to_string();
    let (files, mut failed) =
        tokio::task::spawn_blocking(move || scan(&root, &scan_prefix)).await??;

    let mut report = MirrorReport::default();
    for file in files {
        let remote = match store.head_object(&file.key).await {
            Ok(remote) => remote,
            Err(err) => {
                warn!(key = %file.key, error = %err, "head failed, skipping file");
                failed.push(failure(&file.path, err));
                continue;
            }
        };

        if !file.needs_upload(remote.as_ref()) {
            report.skipped += 1;
            continue;
        }

        match store.put_object_from_file(&file.key, &file.path).await {
            Ok(_) => {
                debug!(key = %file.key, bytes = file.size, "uploaded");
                report.uploaded.push(file.key);
            }
            Err(err) => {
                warn!(key = %file.key, error = %err, "upload failed");
                failed.push(failure(&file.path, err));
            }
        }
    }
    report.failed = failed;

    info!(
        uploaded = report.uploaded.len(),
        skipped = report.skipped,
        failed = report.failed.len(),
        "mirror finished"
    );
    Ok(report)
}

fn failure(path: &Path, err: impl ToString) -> MirrorFailure {
    MirrorFailure {
        path: path.display().to_string(),
        error: err.to_string(),
    }
}

/// Walk `root` (without following symlinks) and map every regular file to
/// its remote key.
fn scan(root: &Path, prefix: &str) -> Result<(Vec<LocalFile>, Vec<MirrorFailure>), MirrorError> {
    if !root.is_dir() {
        return Err(MirrorError::MissingDirectory(root.to_path_buf()));
    }

    let mut files = Vec::new();
    let mut failed = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => {
                return Err(MirrorError::Unreadable {
                    path: root.to_path_buf(),
                    source: err,
                });
            }
            Err(err) => {
                let path = err.path().unwrap_or(root).to_path_buf();
                failed.push(failure(&path, err));
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let Some(key) = remote_key(root, entry.path(), prefix) else {
            failed.push(failure(entry.path(), "path is not valid UTF-8"));
            continue;
        };
        match entry.metadata() {
            Ok(meta) => files.push(LocalFile {
                path: entry.path().to_path_buf(),
                key,
                size: meta.len(),
                modified: meta.modified().map(DateTime::<Utc>::from).unwrap_or_else(|_| Utc::now()),
            }),
            Err(err) => failed.push(failure(entry.path(), err)),
        }
    }
    Ok((files, failed))
}

/// `prefix` + the path relative to `root`, joined with `/`.
fn remote_key(root: &Path, path: &Path, prefix: &str) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    Some(format!("{prefix}{}", parts.join("/")))
}
