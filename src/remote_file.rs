//! Remote file util (component C): checksum-verified whole-file download,
//! streamed straight to disk.
//!
//! This is the part of the engine most directly descended from the
//! teacher's `ModelDownloader` — same shape (temp path, streaming hasher,
//! atomic rename, delete-on-mismatch) generalized from a fixed model
//! manifest to an arbitrary [`crate::manifest::Resource`].

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::error::{EngineError, IoContext, Result};
use crate::net::NetworkClient;

pub struct RemoteFileUtil {
    client: NetworkClient,
}

impl RemoteFileUtil {
    pub fn new(client: NetworkClient) -> Self {
        Self { client }
    }

    /// `HEAD url`; a 2xx response counts as "exists".
    pub async fn exists_at(&self, url: &str) -> bool {
        self.client
            .raw()
            .head(url)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    /// Stream `url` to `local_path.part`, hashing as it writes; compare to
    /// `expected_checksum` when present; rename into place on success.
    ///
    /// On checksum mismatch the partial file is deleted and
    /// [`EngineError::ChecksumMismatch`] is returned.
    pub async fn download_to(
        &self,
        url: &str,
        local_path: &Path,
        expected_checksum: Option<&str>,
    ) -> Result<()> {
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await.io_ctx("download_to:mkdir", parent)?;
        }
        let part_path = part_path(local_path);

        let response = self
            .client
            .raw()
            .get(url)
            .send()
            .await
            .map_err(|e| EngineError::Network {
                http_status: e.status().map(|s| s.as_u16()),
                transport_kind: "connect".into(),
            })?;

        if !response.status().is_success() {
            return Err(EngineError::Network {
                http_status: Some(response.status().as_u16()),
                transport_kind: "non-2xx".into(),
            });
        }

        let mut file = File::create(&part_path).await.io_ctx("download_to:create", &part_path)?;
        let mut hasher = Sha256::new();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| EngineError::Network {
                http_status: None,
                transport_kind: e.to_string(),
            })?;
            hasher.update(&chunk);
            file.write_all(&chunk).await.io_ctx("download_to:write", &part_path)?;
        }
        file.flush().await.io_ctx("download_to:flush", &part_path)?;
        drop(file);

        let actual = hex::encode(hasher.finalize());
        if let Some(expected) = expected_checksum {
            if !expected.eq_ignore_ascii_case(&actual) {
                let _ = tokio::fs::remove_file(&part_path).await;
                return Err(EngineError::ChecksumMismatch {
                    file_path: local_path.display().to_string(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        }

        tokio::fs::rename(&part_path, local_path)
            .await
            .io_ctx("download_to:rename", local_path)?;
        Ok(())
    }

    /// Skip the download if `local_path` already exists and matches
    /// `expected_checksum` (when given); otherwise delegate to
    /// [`Self::download_to`].
    pub async fn download_with_check(
        &self,
        url: &str,
        local_path: &Path,
        expected_checksum: Option<&str>,
    ) -> Result<()> {
        if let Some(expected) = expected_checksum {
            if let Ok(existing) = tokio::fs::read(local_path).await {
                let actual = hex::encode(Sha256::digest(&existing));
                if actual.eq_ignore_ascii_case(expected) {
                    return Ok(());
                }
            }
        } else if tokio::fs::metadata(local_path).await.is_ok() {
            return Ok(());
        }
        self.download_to(url, local_path, expected_checksum).await
    }
}

fn part_path(local_path: &Path) -> PathBuf {
    let mut part = local_path.as_os_str().to_owned();
    part.push(".part");
    PathBuf::from(part)
}

/// Compute the SHA-256 of a file already on disk, chunk by chunk so large
/// files don't need to be held in memory at once.
pub async fn sha256_of_file(path: &Path) -> Result<String> {
    use tokio::io::AsyncReadExt;
    let mut file = File::open(path).await.io_ctx("sha256_of_file:open", path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await.io_ctx("sha256_of_file:read", path)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
