//! Stage-backed pipeline operations
//!
//! Each operation runs its external stage, reads back the JSON the stage
//! wrote, records the count in `PipelineState` and narrates the outcome.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use jobpilot_config::PipelinePaths;

use super::lenient;
use super::path_utils::{display_relative, resolve_within_root};
use super::stages::{Stage, StageRunner, StageVars};
use super::{parse_args, Operation, OperationError};
use crate::cache::ScrapeCache;
use crate::decision::Params;
use crate::state::PipelineState;

const SCRAPE_METHODS: &[&str] = &["auto", "browser", "api"];
const TOP_MATCHES: usize = 10;
const DEFAULT_BATCH_SIZE: usize = 3;
const DEFAULT_MAX_JOBS: usize = 5;

/// Jobs stored in a stage output file.
///
/// Accepts a bare array or an object wrapping one under `jobs`.
pub async fn read_jobs(path: &Path) -> Result<Vec<Value>, OperationError> {
    let text = tokio::fs::read_to_string(path).await?;
    match serde_json::from_str::<Value>(&text)? {
        Value::Array(jobs) => Ok(jobs),
        Value::Object(mut map) => match map.remove("jobs") {
            Some(Value::Array(jobs)) => Ok(jobs),
            _ => Ok(Vec::new()),
        },
        _ => Ok(Vec::new()),
    }
}

pub(crate) fn match_score(job: &Value) -> f64 {
    job.get("match_score").and_then(Value::as_f64).unwrap_or(0.0)
}

/// `  1. [87%] Senior Engineer at Acme`
pub(crate) fn job_line(rank: usize, job: &Value) -> String {
    let field = |name: &str| job.get(name).and_then(Value::as_str).unwrap_or("?");
    format!(
        "  {}. [{:.0}%] {} at {}",
        rank,
        match_score(job),
        field("title"),
        field("company")
    )
}

/// `12345` → `12,345`
pub(crate) fn thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn vars<const N: usize>(pairs: [(&str, String); N]) -> StageVars {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

pub struct ScrapeJobs {
    paths: PipelinePaths,
    stages: Arc<dyn StageRunner>,
    cache: ScrapeCache,
}

impl ScrapeJobs {
    pub fn new(paths: PipelinePaths, stages: Arc<dyn StageRunner>, cache: ScrapeCache) -> Self {
        Self {
            paths,
            stages,
            cache,
        }
    }
}

#[derive(Deserialize)]
struct ScrapeArgs {
    #[serde(default)]
    method: Option<String>,
}

#[async_trait]
impl Operation for ScrapeJobs {
    fn name(&self) -> &str {
        "scrape_jobs"
    }

    fn description(&self) -> &str {
        "Scrape job listings from hiring.cafe. Takes optional 'method' (auto/browser/api)."
    }

    fn requires_approval(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        state: &mut PipelineState,
        params: Params,
    ) -> Result<String, OperationError> {
        let args: ScrapeArgs = parse_args(params)?;
        let method = args.method.unwrap_or_else(|| "auto".to_string());
        if !SCRAPE_METHODS.contains(&method.as_str()) {
            return Err(OperationError::InvalidParams(format!(
                "method must be one of {}, got '{}'",
                SCRAPE_METHODS.join("/"),
                method
            )));
        }

        self.stages
            .run(Stage::Scrape, &vars([("method", method)]))
            .await?;

        let jobs = read_jobs(&self.paths.raw_jobs).await?;
        state.record_scraped(jobs.len());

        if let Err(e) = self
            .cache
            .write_metadata(jobs.len(), chrono::Utc::now())
            .await
        {
            warn!("could not record scrape metadata: {}", e);
        }

        if jobs.is_empty() {
            return Ok("Scrape completed but returned 0 jobs. The API may be rate-limiting or the search is too narrow.".to_string());
        }
        Ok(format!(
            "Scraped {} jobs and saved to {}.",
            thousands(jobs.len()),
            display_relative(&self.paths.raw_jobs, &self.paths.root)
        ))
    }
}

pub struct ParseJobs {
    paths: PipelinePaths,
    stages: Arc<dyn StageRunner>,
}

impl ParseJobs {
    pub fn new(paths: PipelinePaths, stages: Arc<dyn StageRunner>) -> Self {
        Self { paths, stages }
    }
}

#[async_trait]
impl Operation for ParseJobs {
    fn name(&self) -> &str {
        "parse_jobs"
    }

    fn description(&self) -> &str {
        "Parse, normalize, deduplicate, and filter raw scraped jobs against search criteria."
    }

    async fn execute(
        &self,
        state: &mut PipelineState,
        _params: Params,
    ) -> Result<String, OperationError> {
        self.stages.run(Stage::Parse, &StageVars::new()).await?;

        let parsed = read_jobs(&self.paths.parsed_jobs).await?;
        state.record_parsed(parsed.len());

        if parsed.is_empty() {
            return Ok(
                "Parsing complete but 0 jobs remained after filtering. Filters may be too strict."
                    .to_string(),
            );
        }
        Ok(format!(
            "Parsed and filtered: {} jobs remain (from {} raw).",
            thousands(parsed.len()),
            thousands(state.jobs_scraped())
        ))
    }
}

pub struct ScoreJobs {
    paths: PipelinePaths,
    stages: Arc<dyn StageRunner>,
}

impl ScoreJobs {
    pub fn new(paths: PipelinePaths, stages: Arc<dyn StageRunner>) -> Self {
        Self { paths, stages }
    }
}

#[async_trait]
impl Operation for ScoreJobs {
    fn name(&self) -> &str {
        "score_jobs"
    }

    fn description(&self) -> &str {
        "Score filtered jobs against user profile (skills, experience, education). No LLM needed."
    }

    async fn execute(
        &self,
        state: &mut PipelineState,
        _params: Params,
    ) -> Result<String, OperationError> {
        if !state.has_profile {
            return Ok("Cannot score: no user profile loaded. Use resume-only mode or create a profile.".to_string());
        }

        self.stages.run(Stage::Score, &StageVars::new()).await?;

        let scored = read_jobs(&self.paths.scored_jobs).await?;
        state.record_scored(scored.len());

        if scored.is_empty() {
            return Ok("Scoring complete but produced no results.".to_string());
        }

        let mut lines = vec![format!(
            "Scored {} jobs. Top matches:",
            thousands(scored.len())
        )];
        lines.extend(
            scored
                .iter()
                .take(TOP_MATCHES)
                .enumerate()
                .map(|(i, job)| job_line(i + 1, job)),
        );

        let at_least = |threshold: f64| scored.iter().filter(|j| match_score(j) >= threshold).count();
        lines.push(format!(
            "\nDistribution: {} jobs ≥70%, {} ≥50%, {} ≥35%",
            at_least(70.0),
            at_least(50.0),
            at_least(35.0)
        ));
        Ok(lines.join("\n"))
    }
}

pub struct AnalyzeJobs {
    paths: PipelinePaths,
    stages: Arc<dyn StageRunner>,
}

impl AnalyzeJobs {
    pub fn new(paths: PipelinePaths, stages: Arc<dyn StageRunner>) -> Self {
        Self { paths, stages }
    }
}

#[derive(Deserialize)]
struct AnalyzeArgs {
    #[serde(default)]
    input_path: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_usize")]
    batch_size: Option<usize>,
}

/// Caller-supplied input file, or `default` when none was given
async fn input_path(
    requested: Option<String>,
    default: &Path,
    root: &Path,
) -> Result<PathBuf, OperationError> {
    match requested.filter(|p| !p.trim().is_empty()) {
        Some(p) => resolve_within_root(&p, root).await,
        None => Ok(default.to_path_buf()),
    }
}

#[async_trait]
impl Operation for AnalyzeJobs {
    fn name(&self) -> &str {
        "analyze_jobs"
    }

    fn description(&self) -> &str {
        "LLM-enrich selected jobs with deeper analysis (role summary, red flags, culture). Uses LLM credits."
    }

    fn requires_approval(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        state: &mut PipelineState,
        params: Params,
    ) -> Result<String, OperationError> {
        let args: AnalyzeArgs = parse_args(params)?;
        let input = input_path(args.input_path, &self.paths.selected_jobs, &self.paths.root).await?;
        let batch_size = args.batch_size.unwrap_or(DEFAULT_BATCH_SIZE).max(1);

        self.stages
            .run(
                Stage::Analyze,
                &vars([
                    ("input", input.display().to_string()),
                    ("batch_size", batch_size.to_string()),
                ]),
            )
            .await?;

        let analyzed = read_jobs(&self.paths.analyzed_jobs).await?;
        state.record_analyzed(analyzed.len());

        Ok(format!(
            "Analyzed {} jobs with LLM. Enriched data saved to {}.",
            thousands(analyzed.len()),
            display_relative(&self.paths.analyzed_jobs, &self.paths.root)
        ))
    }
}

pub struct GenerateDocuments {
    paths: PipelinePaths,
    stages: Arc<dyn StageRunner>,
}

impl GenerateDocuments {
    pub fn new(paths: PipelinePaths, stages: Arc<dyn StageRunner>) -> Self {
        Self { paths, stages }
    }
}

#[derive(Deserialize)]
struct GenerateDocumentsArgs {
    #[serde(default)]
    input_path: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_usize")]
    max_jobs: Option<usize>,
}

/// Latest modification time of each application folder, counting the files
/// directly inside it
async fn application_snapshot(dir: &Path) -> std::io::Result<HashMap<OsString, Option<SystemTime>>> {
    let mut snapshot = HashMap::new();
    if !dir.is_dir() {
        return Ok(snapshot);
    }

    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let meta = entry.metadata().await?;
        if !meta.is_dir() {
            continue;
        }
        let mut latest = meta.modified().ok();
        let mut files = tokio::fs::read_dir(entry.path()).await?;
        while let Some(file) = files.next_entry().await? {
            let modified = file.metadata().await?.modified().ok();
            latest = latest.max(modified);
        }
        snapshot.insert(entry.file_name(), latest);
    }
    Ok(snapshot)
}

/// Folders that are new in `after` or changed since `before`
fn touched_folders(
    before: &HashMap<OsString, Option<SystemTime>>,
    after: &HashMap<OsString, Option<SystemTime>>,
) -> usize {
    after
        .iter()
        .filter(|(name, modified)| before.get(*name) != Some(*modified))
        .count()
}

#[async_trait]
impl Operation for GenerateDocuments {
    fn name(&self) -> &str {
        "generate_documents"
    }

    fn description(&self) -> &str {
        "Generate tailored resume + cover letter PDFs for selected jobs. Uses LLM credits."
    }

    fn requires_approval(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        state: &mut PipelineState,
        params: Params,
    ) -> Result<String, OperationError> {
        let args: GenerateDocumentsArgs = parse_args(params)?;
        let input = input_path(args.input_path, &self.paths.analyzed_jobs, &self.paths.root).await?;
        let max_jobs = args.max_jobs.unwrap_or(match state.latest_selection() {
            None | Some(0) => DEFAULT_MAX_JOBS,
            Some(n) => n,
        });
        let base_resume = state
            .resume_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();

        let before = application_snapshot(&self.paths.applications_dir).await?;
        self.stages
            .run(
                Stage::GenerateDocuments,
                &vars([
                    ("input", input.display().to_string()),
                    ("max_jobs", max_jobs.to_string()),
                    ("base_resume", base_resume),
                ]),
            )
            .await?;

        let after = application_snapshot(&self.paths.applications_dir).await?;
        let count = touched_folders(&before, &after);
        debug!("{} application folders written", count);
        state.record_generated(count);

        Ok(format!(
            "Generated application documents for {} job(s). Files in {}/.",
            count,
            display_relative(&self.paths.applications_dir, &self.paths.root)
        ))
    }
}

pub struct GenerateReport {
    paths: PipelinePaths,
    stages: Arc<dyn StageRunner>,
}

impl GenerateReport {
    pub fn new(paths: PipelinePaths, stages: Arc<dyn StageRunner>) -> Self {
        Self { paths, stages }
    }
}

#[async_trait]
impl Operation for GenerateReport {
    fn name(&self) -> &str {
        "generate_report"
    }

    fn description(&self) -> &str {
        "Generate summary report with rankings and skill gaps at output/summary_report.md."
    }

    async fn execute(
        &self,
        state: &mut PipelineState,
        _params: Params,
    ) -> Result<String, OperationError> {
        if !state.has_profile {
            return Ok(
                "Cannot generate report: no user profile for skill gap analysis.".to_string(),
            );
        }

        self.stages
            .run(Stage::GenerateReport, &StageVars::new())
            .await?;
        state.mark_report_generated();

        Ok(format!(
            "Summary report generated at {}.",
            display_relative(&self.paths.report, &self.paths.root)
        ))
    }
}
