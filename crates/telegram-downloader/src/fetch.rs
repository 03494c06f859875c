//! Telegram fetch primitive.
//!
//! Two modes:
//!
//! - **Local Bot API server**: `getFile` blocks until the server has the
//!   whole file on its own disk, so there is nothing left to stream. The
//!   file is picked up from `<local_api_dir>/<token>/documents/`.
//! - **Download**: the content is streamed into `<temp_dir>/<name>.part`
//!   with a progress report per chunk.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use teloxide::net::Download;
use teloxide::prelude::*;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use transfer_core::{FetchError, FetchFile, Progress, TransferRequest};

use crate::errors::{classify_download, classify_request};

#[derive(Debug, Clone)]
pub enum FetchMode {
    LocalApi { api_dir: PathBuf },
    Download { temp_dir: PathBuf },
}

#[derive(Clone)]
pub struct TelegramFetcher {
    bot: Bot,
    mode: FetchMode,
}

impl TelegramFetcher {
    pub fn new(bot: Bot, mode: FetchMode) -> Self {
        Self { bot, mode }
    }

    async fn take_local(
        &self,
        api_dir: &Path,
        server_path: &str,
        total: u64,
        progress: &Progress,
    ) -> Result<PathBuf, FetchError> {
        let candidate = local_document_path(api_dir, self.bot.token(), server_path);
        let path = if exists(&candidate).await {
            candidate
        } else if Path::new(server_path).is_absolute() && exists(Path::new(server_path)).await {
            PathBuf::from(server_path)
        } else {
            return Err(FetchError::permanent(format!(
                "File reported by the Bot API server is missing: {}",
                candidate.display()
            )));
        };

        progress.report(total, total);
        Ok(path)
    }

    async fn stream_to_temp(
        &self,
        temp_dir: &Path,
        request: &TransferRequest,
        server_path: &str,
        total: u64,
        progress: &Progress,
    ) -> Result<PathBuf, FetchError> {
        tokio::fs::create_dir_all(temp_dir)
            .await
            .map_err(|e| FetchError::permanent(io_failure("create temp dir", temp_dir, e)))?;

        let part = part_path(temp_dir, &request.file_name);
        match self.write_stream(&part, server_path, total, progress).await {
            Ok(()) => Ok(part),
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&part).await {
                    debug!(path = %part.display(), error = %rm, "no partial file to remove");
                }
                Err(e)
            }
        }
    }

    async fn write_stream(
        &self,
        part: &Path,
        server_path: &str,
        total: u64,
        progress: &Progress,
    ) -> Result<(), FetchError> {
        let mut file = tokio::fs::File::create(part)
            .await
            .map_err(|e| FetchError::transient(io_failure("create", part, e)))?;

        let mut stream = self.bot.download_file_stream(server_path);
        let mut received: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(classify_download)?;
            file.write_all(&chunk)
                .await
                .map_err(|e| FetchError::transient(io_failure("write", part, e)))?;
            received += chunk.len() as u64;
            progress.report(received, total);
        }
        file.flush()
            .await
            .map_err(|e| FetchError::transient(io_failure("flush", part, e)))?;

        if total > 0 && received < total {
            return Err(FetchError::transient(format!(
                "Download ended early: {} of {} bytes",
                received, total
            )));
        }
        Ok(())
    }
}

impl FetchFile for TelegramFetcher {
    async fn fetch(
        &self,
        request: &TransferRequest,
        progress: &Progress,
    ) -> Result<PathBuf, FetchError> {
        let file = self
            .bot
            .get_file(request.remote_id.clone())
            .await
            .map_err(|e| classify_request(&e))?;

        let total = match u64::from(file.meta.size) {
            0 => request.declared_size,
            size => size,
        };
        info!(server_path = %file.path, total, "file info received");

        match &self.mode {
            FetchMode::LocalApi { api_dir } => {
                self.take_local(api_dir, &file.path, total, progress).await
            }
            FetchMode::Download { temp_dir } => {
                self.stream_to_temp(temp_dir, request, &file.path, total, progress)
                    .await
                    .inspect_err(|e| warn!(error = %e, "download stream failed"))
            }
        }
    }
}

fn io_failure(action: &str, path: &Path, e: std::io::Error) -> String {
    format!("Failed to {} {}: {}", action, path.display(), e)
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// Directory name the Bot API server uses for a token. Colons are not
/// allowed in Windows paths, so the server strips them there.
pub fn token_sub_dir(token: &str) -> String {
    if cfg!(windows) {
        token.replace(':', "")
    } else {
        token.to_string()
    }
}

/// `<api_dir>/<token>/documents/<basename of server_path>`
pub fn local_document_path(api_dir: &Path, token: &str, server_path: &str) -> PathBuf {
    let name = server_path.rsplit(['/', '\\']).next().unwrap_or(server_path);
    api_dir.join(token_sub_dir(token)).join("documents").join(name)
}

pub fn part_path(temp_dir: &Path, file_name: &str) -> PathBuf {
    temp_dir.join(format!("{file_name}.part"))
}
