//! Search filter inspection and adjustment
//!
//! The filters live in a YAML file consumed by the scrape and parse stages.
//! Changes are only ever applied after the approval gate has passed.

use async_trait::async_trait;
use serde::Deserialize;
use serde_yaml::{Mapping, Value as YamlValue};
use tracing::info;

use super::{parse_args, Operation, OperationError};
use crate::decision::Params;
use crate::state::PipelineState;

/// Compact single-line rendering of a filter value
fn render(value: &YamlValue) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("{:?}", value))
}

pub struct ReadSearchFilters;

#[async_trait]
impl Operation for ReadSearchFilters {
    fn name(&self) -> &str {
        "read_search_filters"
    }

    fn description(&self) -> &str {
        "Read the current search filters YAML config."
    }

    async fn execute(
        &self,
        state: &mut PipelineState,
        _params: Params,
    ) -> Result<String, OperationError> {
        if !state.search_config_path.is_file() {
            return Ok("Search filters file not found.".to_string());
        }
        let text = tokio::fs::read_to_string(&state.search_config_path).await?;
        let filters: YamlValue = serde_yaml::from_str(&text)?;
        Ok(format!(
            "Current search filters:\n{}",
            serde_yaml::to_string(&filters)?
        ))
    }
}

pub struct ProposeFilterChanges;

#[derive(Deserialize)]
struct ProposeArgs {
    #[serde(default)]
    changes: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    reason: Option<String>,
}

#[async_trait]
impl Operation for ProposeFilterChanges {
    fn name(&self) -> &str {
        "propose_filter_changes"
    }

    fn description(&self) -> &str {
        "Propose changes to search filters. Takes 'changes' (dict of key:value) and 'reason'. User must approve."
    }

    fn requires_approval(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        state: &mut PipelineState,
        params: Params,
    ) -> Result<String, OperationError> {
        let args: ProposeArgs = parse_args(params)?;
        if args.changes.is_empty() {
            return Ok("No changes proposed.".to_string());
        }
        let reason = args.reason.unwrap_or_else(|| "No reason given.".to_string());

        let Ok(text) = tokio::fs::read_to_string(&state.search_config_path).await else {
            return Ok("Could not read current filters.".to_string());
        };
        let mut current: Mapping = match serde_yaml::from_str::<YamlValue>(&text)? {
            YamlValue::Mapping(map) => map,
            YamlValue::Null => Mapping::new(),
            _ => return Ok("Could not read current filters.".to_string()),
        };

        let mut lines = vec![format!("Applied filter changes (reason: {}):", reason)];
        for (key, value) in args.changes {
            let new_value = serde_yaml::to_value(&value)?;
            let old = current
                .get(key.as_str())
                .map(render)
                .unwrap_or_else(|| "not set".to_string());
            lines.push(format!("  {}: {} → {}", key, old, render(&new_value)));
            current.insert(YamlValue::String(key), new_value);
        }

        let yaml = serde_yaml::to_string(&current)?;
        tokio::fs::write(&state.search_config_path, yaml).await?;
        info!("search filters updated");

        lines.push("You should re-scrape and re-score with the new filters.".to_string());
        Ok(lines.join("\n"))
    }
}
