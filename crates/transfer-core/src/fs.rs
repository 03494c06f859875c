//! Filesystem seams used by the registry and the executor.
//!
//! One trait per operation, so tests can stand in only the pieces they
//! exercise. [`SystemFs`] is the production implementation.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Permission bits applied to a file once it lands in the destination directory.
pub const FILE_MODE: u32 = 0o664;

pub trait ExistsFile {
    fn exists(&self, path: &Path) -> bool;
}

/// Relocate a fetched payload into its final directory.
pub trait MoveFile {
    /// Move `source` to `destination_dir/file_name`, creating
    /// `destination_dir` if absent. Returns the final path.
    fn move_file(
        &self,
        source: &Path,
        destination_dir: &Path,
        file_name: &str,
    ) -> impl Future<Output = io::Result<PathBuf>> + Send;
}

pub trait SetPermissions {
    /// Apply POSIX mode bits. A no-op where the platform has no such model.
    fn set_mode(&self, path: &Path, mode: u32) -> impl Future<Output = io::Result<()>> + Send;
}

/// Zero-sized type, delegates to `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemFs;

impl ExistsFile for SystemFs {
    #[inline]
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

impl MoveFile for SystemFs {
    async fn move_file(
        &self,
        source: &Path,
        destination_dir: &Path,
        file_name: &str,
    ) -> io::Result<PathBuf> {
        tokio::fs::create_dir_all(destination_dir).await?;
        let destination = destination_dir.join(file_name);

        let err = match tokio::fs::rename(source, &destination).await {
            Ok(()) => return Ok(destination),
            Err(e) => e,
        };
        if tokio::fs::metadata(source).await.is_err() {
            return Err(err);
        }

        // rename cannot cross filesystems; fall back to copy + remove
        debug!(
            source = %source.display(),
            destination = %destination.display(),
            error = %err,
            "rename failed, copying instead"
        );
        copy_into_place(source, &destination).await?;
        if let Err(e) = tokio::fs::remove_file(source).await {
            warn!(source = %source.display(), error = %e, "failed to remove source after copy");
        }
        Ok(destination)
    }
}

/// Hidden sibling of `destination` that a cross-device copy is staged in.
pub fn staging_path(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    destination.with_file_name(format!(".{name}.part"))
}

/// Copy `source` next to `destination` and rename it into place. Nothing
/// is left at either destination path on failure.
pub async fn copy_into_place(source: &Path, destination: &Path) -> io::Result<()> {
    let staging = staging_path(destination);
    let result = async {
        tokio::fs::copy(source, &staging).await?;
        tokio::fs::rename(&staging, destination).await
    }
    .await;

    if result.is_err() {
        if let Err(e) = tokio::fs::remove_file(&staging).await {
            debug!(path = %staging.display(), error = %e, "no staged copy to remove");
        }
    }
    result
}

impl SetPermissions for SystemFs {
    #[cfg(unix)]
    async fn set_mode(&self, path: &Path, mode: u32) -> io::Result<()> {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await
    }

    #[cfg(not(unix))]
    async fn set_mode(&self, _path: &Path, _mode: u32) -> io::Result<()> {
        Ok(())
    }
}
