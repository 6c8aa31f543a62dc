//! Prompt assembly for the reasoning backend

use chrono::{DateTime, Utc};
use tracing::debug;

use jobpilot_config::PipelinePaths;

use crate::cache::ScrapeCache;
use crate::operations::pipeline::{read_jobs, thousands};
use crate::operations::OperationDescriptor;
use crate::state::PipelineState;

const PREAMBLE: &str = "You are the orchestrator of an Agentic Job Search Pipeline. You reason about what to do, call tools, observe results, and adapt.";

const RESPONSE_FORMAT: &str = r#"## Response Format
You MUST respond in exactly this format every turn:

Thought: <your reasoning about what to do next, 1-3 sentences>
Action: <tool_name>
Action Input: <JSON object with parameters, or {} if no parameters>"#;

const RULES: &str = r#"## Rules
1. ALWAYS follow the Thought/Action/Action Input format. Never skip any field.
2. Call exactly ONE tool per turn.
3. The typical pipeline order is: scrape_jobs → parse_jobs → score_jobs → select_jobs → analyze_jobs → generate_documents → generate_report → finish
4. You CAN deviate from this order when it makes sense (e.g., re-scrape after filter changes, skip analysis, evaluate documents after generation).
5. MANDATORY CHECK-INS: you MUST use check_in:
   - After scoring: show the user top matches and ask how many to generate for
   - Before any tool marked [REQUIRES USER APPROVAL]: confirm the action
   - If you detect poor results (e.g., 0 jobs above 50%): propose filter changes
   - If an error is unrecoverable: ask the user how to proceed
6. SELF-EVALUATION: after generate_documents completes:
   - Use read_file to read at least one cover_letter.md
   - Use evaluate_document to get a quality score
   - If the recommendation is REWRITE, regenerate that job's documents
7. ADAPTIVE SEARCH: if scoring shows poor results:
   - Use read_search_filters to check current config
   - Propose specific filter changes via check_in (explain your reasoning)
   - If user approves, use propose_filter_changes then re-scrape and re-score
8. Always call finish when you're done, with a summary of what was accomplished."#;

/// How the run should treat previously scraped jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScrapeMode {
    /// Reuse a valid cache, otherwise scrape
    #[default]
    Auto,
    /// Always work from the cached raw jobs
    Skip,
    /// Ignore the cache
    Force,
}

/// Builds the system turn and the opening user turn
pub struct ContextBuilder {
    operations: Vec<OperationDescriptor>,
}

impl ContextBuilder {
    pub fn new(operations: Vec<OperationDescriptor>) -> Self {
        Self { operations }
    }

    fn catalog(&self) -> String {
        self.operations
            .iter()
            .map(|op| {
                let mut line = format!("  - {}: {}", op.name, op.description);
                if op.requires_approval {
                    line.push_str(" [REQUIRES USER APPROVAL]");
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// System turn reflecting the live pipeline state
    pub fn build_system_prompt(&self, state: &PipelineState) -> String {
        format!(
            "{}\n\n## Available Tools\n{}\n\n{}\n\n{}\n\n## Current State\n\
             - Jobs scraped: {}\n\
             - Jobs parsed: {}\n\
             - Jobs scored: {}\n\
             - Jobs selected: {}\n\
             - Jobs analyzed: {}\n\
             - Documents generated: {}\n\
             - Report generated: {}\n\
             - Has user profile: {}\n\
             - Resume provided: {}\n\
             - Errors so far: {}\n",
            PREAMBLE,
            self.catalog(),
            RESPONSE_FORMAT,
            RULES,
            state.jobs_scraped(),
            state.jobs_parsed(),
            state.jobs_scored(),
            state.jobs_selected(),
            state.jobs_analyzed(),
            state.jobs_generated(),
            state.report_generated(),
            state.has_profile,
            state.has_resume(),
            state.errors().len(),
        )
    }

    /// Opening user turn.
    ///
    /// Reusing cached raw jobs also records them as scraped in `state`.
    pub async fn initial_context(
        &self,
        mode: ScrapeMode,
        paths: &PipelinePaths,
        cache: &ScrapeCache,
        state: &mut PipelineState,
        now: DateTime<Utc>,
    ) -> String {
        let mut context = String::from("Begin the pipeline. ");

        match mode {
            ScrapeMode::Skip if cache.has_raw_jobs() => {
                let count = cached_job_count(paths).await;
                state.record_scraped(count);
                context.push_str(&format!(
                    "Scraping is skipped — using cached raw_jobs.json ({} jobs). Start with parse_jobs.",
                    thousands(count)
                ));
            }
            ScrapeMode::Skip => {
                context.push_str(
                    "Scraping is skipped but no cached data exists. Ask the user what to do.",
                );
            }
            ScrapeMode::Force => {
                context.push_str("The user requested a fresh scrape. Start with scrape_jobs.");
            }
            ScrapeMode::Auto => match cache.valid_at(now).await {
                Some(_) => {
                    let count = cached_job_count(paths).await;
                    state.record_scraped(count);
                    context.push_str(&format!(
                        "Cached scrape data found ({} jobs, less than {}h old). You can skip scraping or re-scrape if needed.",
                        thousands(count),
                        cache.max_age_hours()
                    ));
                }
                None => context.push_str("No valid cached data. Start with scrape_jobs."),
            },
        }

        if !state.has_profile && !state.has_resume() {
            context.push_str(" WARNING: No user profile or resume found — scoring will not work.");
        }
        context
    }
}

async fn cached_job_count(paths: &PipelinePaths) -> usize {
    match read_jobs(&paths.raw_jobs).await {
        Ok(jobs) => jobs.len(),
        Err(e) => {
            debug!("cached raw jobs unreadable: {}", e);
            0
        }
    }
}
