//! Metaprompt cache: API documentation injected into generation prompts.
//!
//! Explicit process-wide state with an explicit lifecycle: the caller
//! passes a cache path, a source URL and a staleness budget. `load`
//! returns the cached file when it is fresh, otherwise fetches and writes
//! through. A failed fetch falls back to a stale cache with a warning
//! rather than aborting the run.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use log::{debug, warn};

use crate::error::{CodeloopError, Result};

/// Cache handle for the metaprompt document.
pub struct MetapromptCache {
    path: PathBuf,
    url: Option<String>,
    ttl: Duration,
    client: reqwest::Client,
}

impl MetapromptCache {
    /// Default staleness budget: one day.
    pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

    pub fn new(path: impl Into<PathBuf>, url: Option<String>, ttl: Duration) -> Self {
        Self {
            path: path.into(),
            url,
            ttl,
            client: reqwest::Client::new(),
        }
    }

    /// Cache path, for diagnostics.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Load the metaprompt: cached-if-fresh, else fetch and write through.
    ///
    /// With no URL configured, only the cache file is consulted and an
    /// empty metaprompt is returned when it does not exist.
    pub async fn load(&self) -> Result<String> {
        if self.is_fresh() {
            debug!("metaprompt cache fresh: {}", self.path.display());
            return Ok(std::fs::read_to_string(&self.path)?);
        }

        let Some(url) = &self.url else {
            return match std::fs::read_to_string(&self.path) {
                Ok(content) => Ok(content),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
                Err(e) => Err(e.into()),
            };
        };

        match self.fetch(url).await {
            Ok(content) => {
                self.write_through(&content)?;
                Ok(content)
            }
            Err(e) => {
                // Stale cache beats no metaprompt at all
                if self.path.is_file() {
                    warn!("metaprompt fetch failed ({}), using stale cache", e);
                    Ok(std::fs::read_to_string(&self.path)?)
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Force a re-fetch regardless of cache age.
    pub async fn refresh(&self) -> Result<String> {
        let Some(url) = &self.url else {
            return Err(CodeloopError::Metaprompt(
                "no metaprompt URL configured".to_string(),
            ));
        };
        let content = self.fetch(url).await?;
        self.write_through(&content)?;
        Ok(content)
    }

    /// Delete the cached copy. Missing file is not an error.
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether the cache file exists and is younger than the TTL.
    fn is_fresh(&self) -> bool {
        let Ok(metadata) = std::fs::metadata(&self.path) else {
            return false;
        };
        let Ok(modified) = metadata.modified() else {
            return false;
        };
        SystemTime::now()
            .duration_since(modified)
            .map(|age| age < self.ttl)
            .unwrap_or(false)
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        debug!("fetching metaprompt from {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CodeloopError::Metaprompt(format!("fetch failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(CodeloopError::Metaprompt(format!(
                "fetch failed with status {}",
                response.status()
            )));
        }

        response
            .text()
            .await
            .map_err(|e| CodeloopError::Metaprompt(format!("fetch body unreadable: {}", e)))
    }

    fn write_through(&self, content: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_fresh_cache_is_served_without_url() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("metaprompt.md");
        std::fs::write(&path, "cached docs").unwrap();

        let cache = MetapromptCache::new(&path, None, MetapromptCache::DEFAULT_TTL);
        assert_eq!(cache.load().await.unwrap(), "cached docs");
    }

    #[tokio::test]
    async fn test_missing_cache_without_url_is_empty() {
        let dir = TempDir::new().unwrap();
        let cache = MetapromptCache::new(
            dir.path().join("missing.md"),
            None,
            MetapromptCache::DEFAULT_TTL,
        );
        assert_eq!(cache.load().await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_stale_cache_without_url_still_served() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("metaprompt.md");
        std::fs::write(&path, "old docs").unwrap();

        // Zero TTL makes the file stale immediately; with no URL there is
        // nothing to refresh from, so the stale copy is returned.
        let cache = MetapromptCache::new(&path, None, Duration::ZERO);
        assert_eq!(cache.load().await.unwrap(), "old docs");
    }

    #[tokio::test]
    async fn test_failed_fetch_falls_back_to_stale_cache() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("metaprompt.md");
        std::fs::write(&path, "stale docs").unwrap();

        let cache = MetapromptCache::new(
            &path,
            Some("http://127.0.0.1:1/unreachable".to_string()),
            Duration::ZERO,
        );
        assert_eq!(cache.load().await.unwrap(), "stale docs");
    }

    #[tokio::test]
    async fn test_refresh_without_url_is_error() {
        let dir = TempDir::new().unwrap();
        let cache = MetapromptCache::new(
            dir.path().join("metaprompt.md"),
            None,
            MetapromptCache::DEFAULT_TTL,
        );
        assert!(matches!(
            cache.refresh().await,
            Err(CodeloopError::Metaprompt(_))
        ));
    }

    #[test]
    fn test_clear_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("metaprompt.md");
        std::fs::write(&path, "docs").unwrap();

        let cache = MetapromptCache::new(&path, None, MetapromptCache::DEFAULT_TTL);
        cache.clear().unwrap();
        assert!(!path.exists());
        cache.clear().unwrap();
    }

    #[tokio::test]
    async fn test_failed_fetch_without_cache_is_error() {
        let dir = TempDir::new().unwrap();
        let cache = MetapromptCache::new(
            dir.path().join("missing.md"),
            Some("http://127.0.0.1:1/unreachable".to_string()),
            Duration::ZERO,
        );
        assert!(matches!(
            cache.load().await,
            Err(CodeloopError::Metaprompt(_))
        ));
    }
}
