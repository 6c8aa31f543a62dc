//! Pipeline progress for one run

use std::path::PathBuf;

use jobpilot_config::PipelinePaths;

/// Progress tracked across the loop.
///
/// Stage counts only ever grow within a run: re-running a stage that yields
/// fewer items does not lower the recorded count.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineState {
    jobs_scraped: usize,
    jobs_parsed: usize,
    jobs_scored: usize,
    jobs_selected: usize,
    jobs_analyzed: usize,
    jobs_generated: usize,
    latest_selection: Option<usize>,
    report_generated: bool,
    pub search_config_path: PathBuf,
    pub profile_path: PathBuf,
    pub resume_path: Option<PathBuf>,
    pub has_profile: bool,
    errors: Vec<String>,
}

impl PipelineState {
    pub fn new(search_config_path: impl Into<PathBuf>, profile_path: impl Into<PathBuf>) -> Self {
        Self {
            jobs_scraped: 0,
            jobs_parsed: 0,
            jobs_scored: 0,
            jobs_selected: 0,
            jobs_analyzed: 0,
            jobs_generated: 0,
            latest_selection: None,
            report_generated: false,
            search_config_path: search_config_path.into(),
            profile_path: profile_path.into(),
            resume_path: None,
            has_profile: false,
            errors: Vec::new(),
        }
    }

    /// Fresh state for a pipeline root; the profile counts as loaded if
    /// its file exists
    pub fn from_paths(paths: &PipelinePaths, resume_path: Option<PathBuf>) -> Self {
        let mut state = Self::new(&paths.search_filters, &paths.user_profile);
        state.has_profile = paths.user_profile.is_file();
        state.resume_path = resume_path;
        state
    }

    pub fn jobs_scraped(&self) -> usize {
        self.jobs_scraped
    }

    pub fn jobs_parsed(&self) -> usize {
        self.jobs_parsed
    }

    pub fn jobs_scored(&self) -> usize {
        self.jobs_scored
    }

    pub fn jobs_selected(&self) -> usize {
        self.jobs_selected
    }

    /// Size of the most recent selection, which may be smaller than
    /// `jobs_selected`
    pub fn latest_selection(&self) -> Option<usize> {
        self.latest_selection
    }

    pub fn jobs_analyzed(&self) -> usize {
        self.jobs_analyzed
    }

    pub fn jobs_generated(&self) -> usize {
        self.jobs_generated
    }

    pub fn report_generated(&self) -> bool {
        self.report_generated
    }

    pub fn has_resume(&self) -> bool {
        self.resume_path.is_some()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn record_scraped(&mut self, count: usize) {
        self.jobs_scraped = self.jobs_scraped.max(count);
    }

    pub fn record_parsed(&mut self, count: usize) {
        self.jobs_parsed = self.jobs_parsed.max(count);
    }

    pub fn record_scored(&mut self, count: usize) {
        self.jobs_scored = self.jobs_scored.max(count);
    }

    pub fn record_selected(&mut self, count: usize) {
        self.jobs_selected = self.jobs_selected.max(count);
        self.latest_selection = Some(count);
    }

    pub fn record_analyzed(&mut self, count: usize) {
        self.jobs_analyzed = self.jobs_analyzed.max(count);
    }

    pub fn record_generated(&mut self, count: usize) {
        self.jobs_generated = self.jobs_generated.max(count);
    }

    pub fn mark_report_generated(&mut self) {
        self.report_generated = true;
    }

    pub fn record_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    /// The stage counters as one comparable tuple
    pub fn counters(&self) -> [usize; 6] {
        [
            self.jobs_scraped,
            self.jobs_parsed,
            self.jobs_scored,
            self.jobs_selected,
            self.jobs_analyzed,
            self.jobs_generated,
        ]
    }

    /// Closing summary printed after every run
    pub fn summary(&self) -> String {
        let mut lines = vec![
            "  Final state:".to_string(),
            format!(
                "    Scraped: {} | Parsed: {} | Scored: {}",
                self.jobs_scraped, self.jobs_parsed, self.jobs_scored
            ),
            format!(
                "    Selected: {} | Analyzed: {} | Generated: {}",
                self.jobs_selected, self.jobs_analyzed, self.jobs_generated
            ),
            format!(
                "    Report: {}",
                if self.report_generated { "yes" } else { "no" }
            ),
        ];
        if !self.errors.is_empty() {
            lines.push(format!("    Errors: {}", self.errors.len()));
        }
        lines.join("\n")
    }
}
