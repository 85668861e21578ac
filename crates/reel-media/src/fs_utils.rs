//! Filesystem helpers for moving artifacts between directories.

use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::MediaResult;

/// EXDEV on Linux and macOS.
const CROSS_DEVICE_ERRNO: i32 = 18;

/// Move a file, creating the destination directory.
///
/// Falls back to copy + delete when source and destination are on different
/// filesystems. The copy lands next to `dst` first and is renamed into place.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let (src, dst) = (src.as_ref(), dst.as_ref());

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).await?;
    }

    match fs::rename(src, dst).await {
        Ok(()) => return Ok(()),
        Err(e) if e.raw_os_error() != Some(CROSS_DEVICE_ERRNO) => return Err(e.into()),
        Err(_) => debug!(
            "Cross-device move, copying {} -> {}",
            src.display(),
            dst.display()
        ),
    }

    let staging = dst.with_extension("partial");
    fs::copy(src, &staging).await?;
    if let Err(e) = fs::rename(&staging, dst).await {
        remove_file_if_exists(&staging).await;
        return Err(e.into());
    }

    if let Err(e) = fs::remove_file(src).await {
        warn!("Moved {} but could not remove the source: {}", src.display(), e);
    }
    Ok(())
}

/// Delete a file, logging anything other than "not found".
pub async fn remove_file_if_exists(path: impl AsRef<Path>) {
    let path = path.as_ref();
    match fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}
