//! Read-only file access for the reasoning backend

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::path_utils::resolve_within_root;
use super::{parse_args, Operation, OperationError};
use crate::clip;
use crate::decision::Params;
use crate::state::PipelineState;

const MAX_FILE_CHARS: usize = 4000;

pub struct ReadFile {
    root: PathBuf,
}

impl ReadFile {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[derive(Deserialize)]
struct ReadFileArgs {
    #[serde(default)]
    path: Option<String>,
}

#[async_trait]
impl Operation for ReadFile {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a file's contents. Takes 'path' (relative or absolute within project)."
    }

    async fn execute(
        &self,
        _state: &mut PipelineState,
        params: Params,
    ) -> Result<String, OperationError> {
        let args: ReadFileArgs = parse_args(params)?;
        let Some(requested) = args.path.filter(|p| !p.trim().is_empty()) else {
            return Ok("Error: 'path' parameter is required.".to_string());
        };

        let path = resolve_within_root(&requested, &self.root).await?;
        debug!("reading {:?}", path);
        if !path.is_file() {
            return Ok(format!("File not found: {}", requested));
        }

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) => return Ok(format!("Error reading file: {}", e)),
        };

        let kept = clip(&content, MAX_FILE_CHARS);
        if kept.len() < content.len() {
            Ok(format!("{}\n... [truncated, file is longer]", kept))
        } else {
            Ok(content)
        }
    }
}

pub struct ListApplications {
    applications_dir: PathBuf,
}

impl ListApplications {
    pub fn new(applications_dir: PathBuf) -> Self {
        Self { applications_dir }
    }
}

#[async_trait]
impl Operation for ListApplications {
    fn name(&self) -> &str {
        "list_applications"
    }

    fn description(&self) -> &str {
        "List all generated application folders and their files."
    }

    async fn execute(
        &self,
        _state: &mut PipelineState,
        _params: Params,
    ) -> Result<String, OperationError> {
        if !self.applications_dir.is_dir() {
            return Ok("No applications directory found.".to_string());
        }

        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.applications_dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            entries.push(entry);
        }
        if entries.is_empty() {
            return Ok("Applications directory is empty.".to_string());
        }
        entries.sort_by_key(|e| e.file_name());

        let mut lines = vec!["Generated applications:".to_string()];
        for entry in entries {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let mut files = Vec::new();
            let mut inner = tokio::fs::read_dir(entry.path()).await?;
            while let Some(file) = inner.next_entry().await? {
                files.push(file.file_name().to_string_lossy().to_string());
            }
            files.sort();
            lines.push(format!(
                "  {}/  ({})",
                entry.file_name().to_string_lossy(),
                files.join(", ")
            ));
        }

        if lines.len() == 1 {
            return Ok("No application folders found.".to_string());
        }
        Ok(lines.join("\n"))
    }
}
