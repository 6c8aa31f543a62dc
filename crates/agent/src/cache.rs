//! Scrape result cache validation
//!
//! The scrape stage leaves `scrape_metadata.json` next to the raw jobs. A
//! cached scrape is reusable while the search filters file is byte-for-byte
//! unchanged and the scrape is younger than the configured age.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use jobpilot_config::PipelinePaths;

/// Upper bound on the configurable cache age (about a century)
const MAX_CACHE_AGE_HOURS: u64 = 24 * 365 * 100;

/// Written by the scrape stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeMetadata {
    pub config_hash: String,
    /// RFC 3339 timestamp
    pub scraped_at: String,
    #[serde(default)]
    pub job_count: Option<usize>,
}

impl ScrapeMetadata {
    pub fn new(config_hash: impl Into<String>, scraped_at: DateTime<Utc>, job_count: usize) -> Self {
        Self {
            config_hash: config_hash.into(),
            scraped_at: scraped_at.to_rfc3339(),
            job_count: Some(job_count),
        }
    }

    pub fn scraped_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.scraped_at)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

/// Hex SHA-256 of a file's bytes
pub async fn hash_file(path: &Path) -> std::io::Result<String> {
    let bytes = tokio::fs::read(path).await?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

#[derive(Debug, Clone)]
pub struct ScrapeCache {
    raw_jobs: PathBuf,
    metadata: PathBuf,
    search_filters: PathBuf,
    max_age: Duration,
}

impl ScrapeCache {
    pub fn new(paths: &PipelinePaths, max_age_hours: u64) -> Self {
        Self {
            raw_jobs: paths.raw_jobs.clone(),
            metadata: paths.scrape_metadata.clone(),
            search_filters: paths.search_filters.clone(),
            max_age: Duration::hours(max_age_hours.min(MAX_CACHE_AGE_HOURS) as i64),
        }
    }

    pub fn max_age_hours(&self) -> i64 {
        self.max_age.num_hours()
    }

    pub fn has_raw_jobs(&self) -> bool {
        self.raw_jobs.is_file()
    }

    /// Metadata of a cache still valid at `now`, if any
    pub async fn valid_at(&self, now: DateTime<Utc>) -> Option<ScrapeMetadata> {
        if !self.has_raw_jobs() {
            return None;
        }

        let text = tokio::fs::read_to_string(&self.metadata).await.ok()?;
        let metadata: ScrapeMetadata = match serde_json::from_str(&text) {
            Ok(m) => m,
            Err(e) => {
                debug!("unreadable scrape metadata: {}", e);
                return None;
            }
        };

        let current_hash = hash_file(&self.search_filters).await.ok()?;
        if metadata.config_hash != current_hash {
            debug!("search filters changed since last scrape");
            return None;
        }

        let age = now.signed_duration_since(metadata.scraped_at()?);
        if age > self.max_age {
            debug!("cached scrape is {}h old", age.num_hours());
            return None;
        }

        info!(
            "cache: {} jobs scraped {:.1}h ago",
            metadata
                .job_count
                .map(|n| n.to_string())
                .unwrap_or_else(|| "?".to_string()),
            age.num_minutes() as f64 / 60.0
        );
        Some(metadata)
    }

    pub async fn is_valid(&self) -> bool {
        self.valid_at(Utc::now()).await.is_some()
    }

    /// Record a fresh scrape of `job_count` jobs against the current filters
    pub async fn write_metadata(&self, job_count: usize, now: DateTime<Utc>) -> std::io::Result<()> {
        let hash = hash_file(&self.search_filters).await?;
        let metadata = ScrapeMetadata::new(hash, now, job_count);
        let json = serde_json::to_string_pretty(&metadata)?;
        tokio::fs::write(&self.metadata, json).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fixture() -> (tempfile::TempDir, PipelinePaths) {
        let dir = tempfile::tempdir().unwrap();
        let paths = PipelinePaths::new(dir.path());
        paths.ensure_dirs().await.unwrap();
        tokio::fs::write(&paths.search_filters, "keywords: [rust]\n")
            .await
            .unwrap();
        tokio::fs::write(&paths.raw_jobs, "[{}, {}]").await.unwrap();
        (dir, paths)
    }

    #[tokio::test]
    async fn test_fresh_cache_is_valid() {
        let (_dir, paths) = fixture().await;
        let cache = ScrapeCache::new(&paths, 24);
        let now = Utc::now();
        cache.write_metadata(2, now).await.unwrap();

        let metadata = cache.valid_at(now + Duration::hours(23)).await.unwrap();
        assert_eq!(metadata.job_count, Some(2));
    }

    #[tokio::test]
    async fn test_stale_cache_is_invalid() {
        let (_dir, paths) = fixture().await;
        let cache = ScrapeCache::new(&paths, 24);
        let now = Utc::now();
        cache.write_metadata(2, now).await.unwrap();

        assert!(cache.valid_at(now + Duration::hours(25)).await.is_none());
    }

    #[tokio::test]
    async fn test_changed_filters_invalidate_cache() {
        let (_dir, paths) = fixture().await;
        let cache = ScrapeCache::new(&paths, 24);
        let now = Utc::now();
        cache.write_metadata(2, now).await.unwrap();

        tokio::fs::write(&paths.search_filters, "keywords: [go]\n")
            .await
            .unwrap();
        assert!(cache.valid_at(now).await.is_none());
    }

    #[tokio::test]
    async fn test_missing_pieces_invalidate_cache() {
        let (_dir, paths) = fixture().await;
        let cache = ScrapeCache::new(&paths, 24);
        // no metadata yet
        assert!(!cache.is_valid().await);

        cache.write_metadata(2, Utc::now()).await.unwrap();
        assert!(cache.is_valid().await);

        tokio::fs::remove_file(&paths.raw_jobs).await.unwrap();
        assert!(!cache.is_valid().await);
    }

    #[tokio::test]
    async fn test_accepts_offset_timestamps_with_microseconds() {
        let (_dir, paths) = fixture().await;
        let hash = hash_file(&paths.search_filters).await.unwrap();
        let json = format!(
            r#"{{"config_hash": "{}", "scraped_at": "2025-03-01T10:00:00.123456+00:00", "job_count": 2}}"#,
            hash
        );
        tokio::fs::write(&paths.scrape_metadata, json).await.unwrap();

        let cache = ScrapeCache::new(&paths, 24);
        let at = DateTime::parse_from_rfc3339("2025-03-01T20:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert!(cache.valid_at(at).await.is_some());
    }

    #[tokio::test]
    async fn test_hash_is_hex_sha256() {
        let (_dir, paths) = fixture().await;
        let hash = hash_file(&paths.search_filters).await.unwrap();
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
