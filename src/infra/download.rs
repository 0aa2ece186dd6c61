//! HTTP downloads of source archives
//!
//! Archives are streamed to disk while hashed, retried with exponential
//! backoff, and checked against the recipe's SHA-256 when it pins one.

use futures::StreamExt;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::config::defaults;
use crate::error::DownloadError;

/// A finished download
#[derive(Debug)]
pub struct Downloaded {
    pub path: PathBuf,
    pub size: u64,
    /// SHA-256 of the content, lowercase hex
    pub checksum: String,
    /// True when an already present, verified file was reused
    pub reused: bool,
}

/// Fetches archives over HTTP with retries
#[derive(Debug, Clone)]
pub struct DownloadManager {
    client: reqwest::Client,
    max_retries: u32,
    /// First backoff delay, doubled after every failed attempt
    base_delay_ms: u64,
}

impl DownloadManager {
    pub fn new() -> Self {
        Self::with_config(defaults::MAX_DOWNLOAD_RETRIES, 1000)
    }

    /// Manager with a custom retry budget and backoff base
    pub fn with_config(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            client: reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(30))
                .user_agent(concat!("strapkit/", env!("CARGO_PKG_VERSION")))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            max_retries: max_retries.max(1),
            base_delay_ms,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Download `url` to `dest`, retrying on failure
    pub async fn download(&self, url: &str, dest: &Path) -> Result<Downloaded, DownloadError> {
        let mut delay_ms = self.base_delay_ms;
        let mut last_error = None;

        for attempt in 1..=self.max_retries {
            match self.download_once(url, dest).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    warn!("Download of {url} failed (attempt {attempt}/{}): {e}", self.max_retries);
                    last_error = Some(e);
                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        delay_ms = (delay_ms * 2).min(30_000);
                    }
                }
            }
        }

        let _ = tokio::fs::remove_file(dest).await;

        Err(last_error.unwrap_or_else(|| DownloadError::MaxRetriesExceeded {
            url: url.to_string(),
            retries: self.max_retries,
        }))
    }

    async fn download_once(&self, url: &str, dest: &Path) -> Result<Downloaded, DownloadError> {
        let network = |error: String| DownloadError::NetworkError {
            url: url.to_string(),
            error,
        };
        let io = |path: &Path, e: std::io::Error| DownloadError::IoError {
            path: path.to_path_buf(),
            error: e.to_string(),
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(network(format!("HTTP {}", response.status())));
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io(parent, e))?;
        }

        let mut file = File::create(dest).await.map_err(|e| io(dest, e))?;
        let mut hasher = Sha256::new();
        let mut size: u64 = 0;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| network(e.to_string()))?;
            file.write_all(&chunk).await.map_err(|e| io(dest, e))?;
            hasher.update(&chunk);
            size += chunk.len() as u64;
        }

        file.flush().await.map_err(|e| io(dest, e))?;
        debug!("Downloaded {url} ({size} bytes)");

        Ok(Downloaded {
            path: dest.to_path_buf(),
            size,
            checksum: hex::encode(hasher.finalize()),
            reused: false,
        })
    }

    /// Download `url` to `dest` and check it against `expected` when given.
    ///
    /// An existing `dest` whose checksum already matches is reused. A file
    /// that fails verification is deleted.
    pub async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        expected: Option<&str>,
    ) -> Result<Downloaded, DownloadError> {
        if let Some(expected) = expected {
            if dest.is_file() && verify_checksum(dest, expected)? {
                debug!("Reusing verified {}", dest.display());
                return Ok(Downloaded {
                    path: dest.to_path_buf(),
                    size: std::fs::metadata(dest).map(|m| m.len()).unwrap_or(0),
                    checksum: expected.to_lowercase(),
                    reused: true,
                });
            }
        }

        let result = self.download(url, dest).await?;

        if let Some(expected) = expected {
            if !result.checksum.eq_ignore_ascii_case(expected.trim()) {
                let _ = tokio::fs::remove_file(dest).await;
                return Err(DownloadError::ChecksumFailed {
                    file: dest.display().to_string(),
                });
            }
        }

        Ok(result)
    }
}

impl Default for DownloadManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Check the SHA-256 of a file on disk
pub fn verify_checksum(path: &Path, expected: &str) -> Result<bool, DownloadError> {
    let content = std::fs::read(path).map_err(|e| DownloadError::IoError {
        path: path.to_path_buf(),
        error: e.to_string(),
    })?;
    Ok(compute_checksum(&content).eq_ignore_ascii_case(expected.trim()))
}

/// SHA-256 of a byte slice, lowercase hex
pub fn compute_checksum(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_compute_checksum() {
        assert_eq!(
            compute_checksum(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_verify_checksum_case_insensitive() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("test.txt");
        std::fs::write(&file, b"hello world").unwrap();

        assert!(verify_checksum(
            &file,
            "B94D27B9934D3E08A52E52D7DA7DABFAC484EFE37A5380EE9088F7ACE2EFCDE9"
        )
        .unwrap());
        assert!(!verify_checksum(&file, "00").unwrap());
        assert!(verify_checksum(Path::new("/nonexistent/file"), "00").is_err());
    }

    #[test]
    fn test_download_manager_defaults() {
        assert_eq!(DownloadManager::new().max_retries(), 3);
        assert_eq!(DownloadManager::with_config(0, 10).max_retries(), 1);
    }

    #[tokio::test]
    async fn test_fetch_verified() {
        let server = MockServer::start().await;
        let content = b"tarball bytes";

        Mock::given(method("GET"))
            .and(path("/pkg.tar.gz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(content.to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("downloads/pkg.tar.gz");
        let manager = DownloadManager::with_config(3, 10);
        let url = format!("{}/pkg.tar.gz", server.uri());
        let checksum = compute_checksum(content);

        let first = manager.fetch(&url, &dest, Some(&checksum)).await.unwrap();
        assert!(!first.reused);
        assert_eq!(first.size, content.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), content);

        // Second fetch reuses the verified file; the mock expects one request
        let second = manager.fetch(&url, &dest, Some(&checksum)).await.unwrap();
        assert!(second.reused);
    }

    #[tokio::test]
    async fn test_fetch_checksum_mismatch_deletes_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bad.tar.gz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"other".to_vec()))
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("bad.tar.gz");
        let err = DownloadManager::with_config(1, 10)
            .fetch(&format!("{}/bad.tar.gz", server.uri()), &dest, Some("0000"))
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::ChecksumFailed { .. }));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_download_retries_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("flaky");
        let result = DownloadManager::with_config(3, 10)
            .download(&format!("{}/flaky", server.uri()), &dest)
            .await
            .unwrap();
        assert_eq!(result.checksum, compute_checksum(b"ok"));
    }

    #[tokio::test]
    async fn test_download_gives_up() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("gone");
        let result = DownloadManager::with_config(2, 10)
            .download(&format!("{}/gone", server.uri()), &dest)
            .await;

        assert!(matches!(result, Err(DownloadError::NetworkError { .. })));
        assert!(!dest.exists());
    }
}
