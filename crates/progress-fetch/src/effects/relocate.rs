use std::io;
use std::path::{Path, PathBuf};

use tempfile::{PathPersistError, TempPath};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::core::relocated_file_name;
use crate::effects::http::TransientFile;
use crate::error::FetchError;

/// Move a transient download under `cache_dir` with a fresh unique name.
///
/// A rename is tried first. If it fails (typically across filesystems) the
/// file is copied instead on a blocking thread. The transient file is deleted
/// whatever the outcome, and so is the copy if it failed or if this future was
/// dropped before the copy finished.
pub(crate) async fn relocate(file: TransientFile, cache_dir: &Path) -> Result<PathBuf, FetchError> {
    tokio::fs::create_dir_all(cache_dir)
        .await
        .map_err(|source| FetchError::RelocationFailed {
            path: cache_dir.to_path_buf(),
            source,
        })?;

    let destination = cache_dir.join(relocated_file_name(file.path()));

    match file.persist(&destination) {
        Ok(()) => {
            debug!(path = %destination.display(), "relocated download");
            Ok(destination)
        }
        Err(PathPersistError { error, path }) => {
            debug!(%error, "rename failed, copying download instead");
            let (reply, copied) = oneshot::channel();
            let target = destination.clone();
            tokio::task::spawn_blocking(move || copy_detached(path, &target, reply));
            let copied = copied
                .await
                .unwrap_or_else(|_| Err(io::Error::other("copy task stopped")));
            match copied {
                Ok(()) => Ok(destination),
                Err(source) => {
                    warn!(path = %destination.display(), %source, "failed to relocate download");
                    Err(FetchError::RelocationFailed {
                        path: destination,
                        source,
                    })
                }
            }
        }
    }
}

/// Copy `source` to `destination` and report the outcome on `reply`.
///
/// `source` is deleted on return. The destination is removed again when the
/// copy failed or when nobody is waiting for the reply.
fn copy_detached(source: TempPath, destination: &Path, reply: oneshot::Sender<io::Result<()>>) {
    let copied = std::fs::copy(&source, destination).map(drop);
    drop(source);

    let failed = copied.is_err();
    if reply.send(copied).is_err() || failed {
        debug!(path = %destination.display(), "removing unclaimed copy");
        if let Err(error) = std::fs::remove_file(destination) {
            if error.kind() != io::ErrorKind::NotFound {
                warn!(path = %destination.display(), %error, "failed to remove unclaimed copy");
            }
        }
    }
}

/// Remove a relocated file that will never reach a consumer.
pub(crate) async fn discard(path: &Path) {
    if let Err(error) = tokio::fs::remove_file(path).await {
        warn!(path = %path.display(), %error, "failed to remove undelivered download");
    }
}
