//! External pipeline stages
//!
//! Scraping, parsing, scoring, analysis, document and report generation run
//! as external commands. Each writes its result to a well-known path under
//! the pipeline root; operations only read those files back.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::{Captures, Regex};
use tokio::process::Command;
use tracing::{debug, info};

use jobpilot_config::{PipelinePaths, StageCommands};

use super::OperationError;
use crate::clip;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([a-z_]+)\}").expect("placeholder pattern"));

/// Stderr kept in a failure message
const STDERR_TAIL_CHARS: usize = 500;

/// Placeholder values for one stage invocation
pub type StageVars = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Scrape,
    Parse,
    Score,
    Analyze,
    GenerateDocuments,
    GenerateReport,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Scrape => "scrape",
            Stage::Parse => "parse",
            Stage::Score => "score",
            Stage::Analyze => "analyze",
            Stage::GenerateDocuments => "generate_documents",
            Stage::GenerateReport => "generate_report",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Captured output of a finished stage
#[derive(Debug, Clone, Default)]
pub struct StageOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs pipeline stages to completion
#[async_trait]
pub trait StageRunner: Send + Sync {
    async fn run(&self, stage: Stage, vars: &StageVars) -> Result<StageOutput, OperationError>;
}

/// Runs each stage as a configured subprocess inside the pipeline root
pub struct CommandStageRunner {
    commands: StageCommands,
    working_dir: PathBuf,
    path_vars: StageVars,
    timeout: Duration,
}

impl CommandStageRunner {
    pub fn new(commands: StageCommands, paths: &PipelinePaths) -> Self {
        let timeout = Duration::from_secs(commands.timeout_secs);
        Self {
            commands,
            working_dir: paths.root.clone(),
            path_vars: path_vars(paths),
            timeout,
        }
    }

    fn argv_template(&self, stage: Stage) -> &[String] {
        match stage {
            Stage::Scrape => &self.commands.scrape,
            Stage::Parse => &self.commands.parse,
            Stage::Score => &self.commands.score,
            Stage::Analyze => &self.commands.analyze,
            Stage::GenerateDocuments => &self.commands.generate_documents,
            Stage::GenerateReport => &self.commands.generate_report,
        }
    }

    /// Concrete argv for `stage`; call-specific `vars` shadow path values
    pub fn render(&self, stage: Stage, vars: &StageVars) -> Result<Vec<String>, OperationError> {
        let template = self.argv_template(stage);
        if template.is_empty() {
            return Err(OperationError::Stage {
                stage,
                message: "no command configured".to_string(),
            });
        }

        let mut missing = Vec::new();
        let argv: Vec<String> = template
            .iter()
            .map(|arg| {
                PLACEHOLDER
                    .replace_all(arg, |caps: &Captures| {
                        let key = &caps[1];
                        match vars.get(key).or_else(|| self.path_vars.get(key)) {
                            Some(value) => value.clone(),
                            None => {
                                missing.push(key.to_string());
                                caps[0].to_string()
                            }
                        }
                    })
                    .into_owned()
            })
            .collect();

        if !missing.is_empty() {
            return Err(OperationError::Stage {
                stage,
                message: format!("unresolved placeholders: {}", missing.join(", ")),
            });
        }
        Ok(argv)
    }
}

#[async_trait]
impl StageRunner for CommandStageRunner {
    async fn run(&self, stage: Stage, vars: &StageVars) -> Result<StageOutput, OperationError> {
        let argv = self.render(stage, vars)?;
        info!("running {} stage", stage);
        debug!("exec: {}", argv.join(" "));

        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(OperationError::Stage {
                    stage,
                    message: format!("could not start '{}': {}", argv[0], e),
                })
            }
            Err(_) => {
                return Err(OperationError::Timeout {
                    stage,
                    secs: self.timeout.as_secs(),
                })
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            let trimmed = stderr.trim();
            let skip = trimmed.chars().count().saturating_sub(STDERR_TAIL_CHARS);
            let tail: String = trimmed.chars().skip(skip).collect();
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            return Err(OperationError::Stage {
                stage,
                message: if tail.is_empty() {
                    format!("exit status {}", code)
                } else {
                    format!("exit status {}: {}", code, tail)
                },
            });
        }

        debug!("{} stage output: {}", stage, clip(stdout.trim(), 200));
        Ok(StageOutput { stdout, stderr })
    }
}

fn path_vars(paths: &PipelinePaths) -> StageVars {
    let entries = [
        ("root", &paths.root),
        ("tmp_dir", &paths.tmp_dir),
        ("output_dir", &paths.output_dir),
        ("raw_jobs", &paths.raw_jobs),
        ("parsed_jobs", &paths.parsed_jobs),
        ("scored_jobs", &paths.scored_jobs),
        ("selected_jobs", &paths.selected_jobs),
        ("analyzed_jobs", &paths.analyzed_jobs),
        ("search_filters", &paths.search_filters),
        ("user_profile", &paths.user_profile),
        ("applications_dir", &paths.applications_dir),
        ("report", &paths.report),
    ];
    entries
        .into_iter()
        .map(|(key, path)| (key.to_string(), path.display().to_string()))
        .collect()
}
