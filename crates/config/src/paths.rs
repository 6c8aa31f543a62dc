//! Path utilities

use std::path::{Path, PathBuf};

/// Per-user data directory (~/.jobpilot)
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".jobpilot")
}

/// Default configuration file location
pub fn config_path() -> PathBuf {
    data_dir().join("config.json")
}

/// Ensure directory exists
pub async fn ensure_dir(path: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(path).await
}

/// Well-known files exchanged between pipeline stages.
///
/// Every stage reads and writes JSON files under `<root>/.tmp`, while the
/// human-facing artifacts land under `<root>/output`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelinePaths {
    pub root: PathBuf,
    pub tmp_dir: PathBuf,
    pub output_dir: PathBuf,
    pub raw_jobs: PathBuf,
    pub parsed_jobs: PathBuf,
    pub scored_jobs: PathBuf,
    pub selected_jobs: PathBuf,
    pub analyzed_jobs: PathBuf,
    pub scrape_metadata: PathBuf,
    pub search_filters: PathBuf,
    pub user_profile: PathBuf,
    pub applications_dir: PathBuf,
    pub report: PathBuf,
}

impl PipelinePaths {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let tmp_dir = root.join(".tmp");
        let output_dir = root.join("output");
        let config_dir = root.join("config");

        Self {
            raw_jobs: tmp_dir.join("raw_jobs.json"),
            parsed_jobs: tmp_dir.join("parsed_jobs.json"),
            scored_jobs: tmp_dir.join("scored_jobs.json"),
            selected_jobs: tmp_dir.join("selected_jobs.json"),
            analyzed_jobs: tmp_dir.join("analyzed_jobs.json"),
            scrape_metadata: tmp_dir.join("scrape_metadata.json"),
            search_filters: config_dir.join("search_filters.yaml"),
            user_profile: config_dir.join("user_profile.yaml"),
            applications_dir: output_dir.join("applications"),
            report: output_dir.join("summary_report.md"),
            root,
            tmp_dir,
            output_dir,
        }
    }

    /// Create the scratch and output directories
    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        ensure_dir(&self.tmp_dir).await?;
        ensure_dir(&self.applications_dir).await?;
        if let Some(config_dir) = self.search_filters.parent() {
            ensure_dir(config_dir).await?;
        }
        Ok(())
    }
}
