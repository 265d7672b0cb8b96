//! Filesystem helpers for moving artifacts between directories.
//!
//! Archive directories may live on a different mount than the inbox, so a
//! plain rename can fail with EXDEV.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Move a file from `src` to `dst`, handling cross-device moves.
///
/// Tries a rename first. On EXDEV the file is copied into a sibling of `dst`,
/// renamed into place, and the source removed. The destination's parent
/// directory is created if missing.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if !src.exists() {
        return Err(MediaError::FileNotFound(src.to_path_buf()));
    }
    ensure_parent(dst).await?;

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device_error(&e) => {
            debug!(
                src = %src.display(),
                dst = %dst.display(),
                "Cross-device rename, copying instead"
            );
            copy_and_delete(src, dst).await
        }
        Err(e) => Err(MediaError::from(e)),
    }
}

/// Move `src` into `dir`, keeping its file name.
///
/// Returns the new path.
pub async fn move_into(src: impl AsRef<Path>, dir: impl AsRef<Path>) -> MediaResult<PathBuf> {
    let src = src.as_ref();
    let name = src
        .file_name()
        .ok_or_else(|| MediaError::internal(format!("No file name in {}", src.display())))?;
    let dst = dir.as_ref().join(name);
    move_file(src, &dst).await?;
    Ok(dst)
}

/// Delete a partially written output. Missing files are fine.
pub async fn remove_partial(path: impl AsRef<Path>) {
    let path = path.as_ref();
    match fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed partial output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove partial output"),
    }
}

/// Create the parent directory of `path` if needed.
pub async fn ensure_parent(path: &Path) -> MediaResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    Ok(())
}

/// EXDEV is 18 on Linux and macOS.
fn is_cross_device_error(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(18)
}

async fn copy_and_delete(src: &Path, dst: &Path) -> MediaResult<()> {
    // Same directory as dst, so the final rename stays on one filesystem
    let mut staging = dst.as_os_str().to_owned();
    staging.push(".partial");
    let staging = PathBuf::from(staging);

    if let Err(e) = fs::copy(src, &staging).await {
        remove_partial(&staging).await;
        return Err(e.into());
    }
    if let Err(e) = fs::rename(&staging, dst).await {
        remove_partial(&staging).await;
        return Err(e.into());
    }

    if let Err(e) = fs::remove_file(src).await {
        warn!(
            src = %src.display(),
            error = %e,
            "Copied across devices but could not remove the source"
        );
    }
    Ok(())
}
