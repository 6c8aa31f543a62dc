//! Picking the jobs worth applying to

use async_trait::async_trait;
use serde::Deserialize;

use jobpilot_config::PipelinePaths;

use super::lenient;
use super::pipeline::{job_line, match_score, read_jobs};
use super::{parse_args, Operation, OperationError};
use crate::decision::Params;
use crate::state::PipelineState;

const DEFAULT_COUNT: usize = 5;
const DEFAULT_THRESHOLD: f64 = 35.0;

/// Takes the top scored jobs at or above a threshold and writes them to the
/// selected jobs file. Scored jobs are expected best-first.
pub struct SelectJobs {
    paths: PipelinePaths,
}

impl SelectJobs {
    pub fn new(paths: PipelinePaths) -> Self {
        Self { paths }
    }
}

#[derive(Deserialize)]
struct SelectArgs {
    #[serde(default, deserialize_with = "lenient::opt_usize")]
    count: Option<usize>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    threshold: Option<f64>,
}

#[async_trait]
impl Operation for SelectJobs {
    fn name(&self) -> &str {
        "select_jobs"
    }

    fn description(&self) -> &str {
        "Select top N jobs from scored results. Takes 'count' (int) and optional 'threshold' (float, default 35)."
    }

    fn requires_approval(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        state: &mut PipelineState,
        params: Params,
    ) -> Result<String, OperationError> {
        let args: SelectArgs = parse_args(params)?;
        let count = args.count.unwrap_or(DEFAULT_COUNT);
        let threshold = args.threshold.unwrap_or(DEFAULT_THRESHOLD);

        if !self.paths.scored_jobs.is_file() {
            return Ok("No scored jobs found. Run scoring first.".to_string());
        }

        let selected: Vec<_> = read_jobs(&self.paths.scored_jobs)
            .await?
            .into_iter()
            .filter(|job| match_score(job) >= threshold)
            .take(count)
            .collect();
        state.record_selected(selected.len());

        if selected.is_empty() {
            return Ok(format!(
                "No jobs scoring ≥{}%. Try lowering the threshold.",
                threshold
            ));
        }

        tokio::fs::create_dir_all(&self.paths.tmp_dir).await?;
        let json = serde_json::to_string_pretty(&selected)?;
        tokio::fs::write(&self.paths.selected_jobs, json).await?;

        let mut lines = vec![format!(
            "Selected {} job(s) for application generation:",
            selected.len()
        )];
        lines.extend(
            selected
                .iter()
                .enumerate()
                .map(|(i, job)| job_line(i + 1, job)),
        );
        Ok(lines.join("\n"))
    }
}
