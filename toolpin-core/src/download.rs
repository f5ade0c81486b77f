//! Downloader capability
//!
//! The update pipeline never touches the network directly: catalog documents
//! and artifacts are fetched through [`Downloader`], which keeps the loader and
//! executor testable with in-memory fixtures.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::debug;
use url::Url;

use crate::error::{Result, UpdateError};
use crate::trust::ToolHash;

/// Default time a cached JSON document stays fresh
const CACHE_TTL: Duration = Duration::from_secs(3600);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetches catalog documents and artifact files
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Fetch and parse a JSON document
    ///
    /// `location` is resolved against `base_dir` when relative. When `hash` is
    /// given the raw bytes must match it, otherwise [`UpdateError::Integrity`].
    async fn download_json_file(
        &self,
        location: &str,
        base_dir: Option<&str>,
        bypass_cache: bool,
        hash: Option<&ToolHash>,
    ) -> Result<serde_json::Value>;

    /// Fetch `url` and write it to `destination`, creating parent directories
    async fn download_file_to(&self, url: &str, destination: &Path) -> Result<()>;
}

/// Resolve a possibly relative location against a base directory or URL
pub fn resolve_location(location: &str, base_dir: Option<&str>) -> String {
    if is_url(location) || Path::new(location).is_absolute() {
        return location.to_string();
    }

    let Some(base) = base_dir else {
        return location.to_string();
    };

    if is_url(base) {
        let base = if base.ends_with('/') {
            base.to_string()
        } else {
            format!("{base}/")
        };
        return Url::parse(&base)
            .and_then(|base| base.join(location))
            .map(|joined| joined.to_string())
            .unwrap_or_else(|_| location.to_string());
    }

    Path::new(base).join(location).to_string_lossy().into_owned()
}

/// Directory part of a location, used as base for the references it contains
pub fn parent_location(location: &str) -> String {
    if is_url(location) {
        if let Ok(url) = Url::parse(location) {
            if let Ok(parent) = url.join(".") {
                return parent.to_string();
            }
        }
    }

    match Path::new(location).parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_string_lossy().into_owned(),
        _ => ".".to_string(),
    }
}

/// Anything with a scheme longer than one character; `C:\...` stays a path
fn is_url(location: &str) -> bool {
    Url::parse(location).is_ok_and(|url| url.scheme().len() > 1)
}

/// Default cache directory for downloaded documents
pub fn default_cache_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("org", "toolpin", "toolpin")
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .or_else(|| dirs::cache_dir().map(|dir| dir.join("toolpin")))
}

/// Downloader backed by reqwest for `http(s)://` and the filesystem otherwise
pub struct HttpDownloader {
    client: reqwest::Client,
    cache_dir: Option<PathBuf>,
}

impl HttpDownloader {
    /// Create a downloader caching JSON documents in `cache_dir`
    pub fn new(cache_dir: Option<PathBuf>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("toolpin/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| UpdateError::download("http client", e))?;

        Ok(Self { client, cache_dir })
    }

    async fn fetch_bytes(&self, location: &str) -> Result<Vec<u8>> {
        if let Some(path) = local_path(location) {
            debug!("Reading {}", path.display());
            return tokio::fs::read(&path)
                .await
                .map_err(|e| UpdateError::download(location, e));
        }

        debug!("Fetching {}", location);
        let response = self
            .client
            .get(location)
            .send()
            .await
            .map_err(|e| UpdateError::download(location, e))?;

        if !response.status().is_success() {
            return Err(UpdateError::download(
                location,
                format!("HTTP {}", response.status()),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| UpdateError::download(location, e))?;
        Ok(bytes.to_vec())
    }

    /// Cache file path for a resolved location
    fn cache_path_for(&self, location: &str) -> Option<PathBuf> {
        let digest = hex::encode(Sha256::digest(location.as_bytes()));
        self.cache_dir
            .as_ref()
            .map(|dir| dir.join(format!("{digest}.json")))
    }

    fn load_cached(&self, location: &str) -> Option<Vec<u8>> {
        let cache_path = self.cache_path_for(location)?;
        let modified = std::fs::metadata(&cache_path).ok()?.modified().ok()?;
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);

        if age > CACHE_TTL {
            debug!("Cache expired for {} (age: {:?})", location, age);
            return None;
        }

        debug!("Using cached document for {} (age: {:?})", location, age);
        std::fs::read(&cache_path).ok()
    }

    fn save_to_cache(&self, location: &str, bytes: &[u8]) {
        let Some(cache_path) = self.cache_path_for(location) else {
            return;
        };
        let written = cache_path
            .parent()
            .map_or(Ok(()), std::fs::create_dir_all)
            .and_then(|_| std::fs::write(&cache_path, bytes));

        match written {
            Ok(()) => debug!("Saved {} to cache: {}", location, cache_path.display()),
            Err(e) => debug!("Could not cache {}: {}", location, e),
        }
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download_json_file(
        &self,
        location: &str,
        base_dir: Option<&str>,
        bypass_cache: bool,
        hash: Option<&ToolHash>,
    ) -> Result<serde_json::Value> {
        let resolved = resolve_location(location, base_dir);
        let cacheable = local_path(&resolved).is_none();

        let cached = if cacheable && !bypass_cache {
            self.load_cached(&resolved)
        } else {
            None
        };

        let from_cache = cached.is_some();
        let bytes = match cached {
            Some(bytes) => bytes,
            None => self.fetch_bytes(&resolved).await?,
        };

        if let Some(expected) = hash {
            if !expected.matches_bytes(&bytes) {
                let actual = ToolHash::for_bytes(expected.algorithm, &bytes);
                return Err(UpdateError::Integrity {
                    path: PathBuf::from(&resolved),
                    algorithm: expected.algorithm.to_string(),
                    expected: expected.value.clone(),
                    actual: actual.value,
                });
            }
        }

        let document = serde_json::from_slice(&bytes)
            .map_err(|e| UpdateError::load(&resolved, format!("invalid JSON: {e}")))?;

        if cacheable && !from_cache {
            self.save_to_cache(&resolved, &bytes);
        }

        Ok(document)
    }

    async fn download_file_to(&self, url: &str, destination: &Path) -> Result<()> {
        let bytes = self.fetch_bytes(url).await?;

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| UpdateError::filesystem(parent, e))?;
        }

        tokio::fs::write(destination, &bytes)
            .await
            .map_err(|e| UpdateError::filesystem(destination, e))?;

        debug!(
            "Downloaded {} ({} bytes) to {}",
            url,
            bytes.len(),
            destination.display()
        );
        Ok(())
    }
}

/// Filesystem path for `file://` URLs and plain paths, `None` for remote URLs
fn local_path(location: &str) -> Option<PathBuf> {
    match Url::parse(location) {
        Ok(url) if url.scheme() == "file" => url.to_file_path().ok(),
        Ok(url) if url.scheme().len() > 1 => None,
        _ => Some(PathBuf::from(location)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trust::HashAlgorithm;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_relative_to_url() {
        assert_eq!(
            resolve_location("tools/a.json", Some("https://example.org/repo")),
            "https://example.org/repo/tools/a.json"
        );
        assert_eq!(
            resolve_location("../b.json", Some("https://example.org/repo/")),
            "https://example.org/b.json"
        );
        assert_eq!(
            resolve_location("https://cdn.example.org/c.phar", Some("/srv")),
            "https://cdn.example.org/c.phar"
        );
    }

    #[test]
    fn test_resolve_relative_to_path() {
        let resolved = resolve_location("a.json", Some("/srv/catalog"));
        assert_eq!(Path::new(&resolved), Path::new("/srv/catalog/a.json"));
        assert_eq!(resolve_location("a.json", None), "a.json");
    }

    #[test]
    fn test_parent_location() {
        assert_eq!(
            parent_location("https://example.org/repo/catalog.json"),
            "https://example.org/repo/"
        );
        assert_eq!(parent_location("catalog.json"), ".");
        assert_eq!(
            Path::new(&parent_location("/srv/catalog/x.json")),
            Path::new("/srv/catalog")
        );
    }

    #[test]
    fn test_local_path_detection() {
        assert!(local_path("https://example.org/a").is_none());
        assert_eq!(local_path("/tmp/a.json"), Some(PathBuf::from("/tmp/a.json")));
        assert_eq!(
            local_path("file:///tmp/a.json"),
            Some(PathBuf::from("/tmp/a.json"))
        );
    }

    #[tokio::test]
    async fn test_json_from_local_file_with_hash() {
        let dir = TempDir::new().unwrap();
        let body = br#"{"phars": {}}"#;
        std::fs::write(dir.path().join("catalog.json"), body).unwrap();

        let downloader = HttpDownloader::new(None).unwrap();
        let base = dir.path().to_string_lossy().into_owned();
        let good = ToolHash::for_bytes(HashAlgorithm::Sha256, body);

        let document = downloader
            .download_json_file("catalog.json", Some(&base), false, Some(&good))
            .await
            .unwrap();
        assert!(document["phars"].is_object());

        let bad = ToolHash::new(HashAlgorithm::Sha256, "00");
        let err = downloader
            .download_json_file("catalog.json", Some(&base), false, Some(&bad))
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::Integrity { .. }));
    }

    #[tokio::test]
    async fn test_download_file_creates_parents() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.bin");
        std::fs::write(&source, b"payload").unwrap();

        let destination = dir.path().join("nested/dir/target.bin");
        let downloader = HttpDownloader::new(None).unwrap();
        downloader
            .download_file_to(&source.to_string_lossy(), &destination)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&destination).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_missing_local_file_is_download_error() {
        let downloader = HttpDownloader::new(None).unwrap();
        let err = downloader
            .download_json_file("/nonexistent/catalog.json", None, true, None)
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::Download { .. }));
    }
}
