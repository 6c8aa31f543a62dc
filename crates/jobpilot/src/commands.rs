//! jobpilot command implementations

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use jobpilot_agent::operations::CommandStageRunner;
use jobpilot_agent::{
    default_registry, AgentLoop, ConsoleHuman, ContextBuilder, HumanInterface, LoopState,
    PipelineState, ScrapeCache, ScrapeMode,
};
use jobpilot_config::{self, Config};
use jobpilot_provider::{Completer, FailoverClient};

/// Flags of the `run` command
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub resume: Option<PathBuf>,
    pub mode: ScrapeMode,
    pub max_iterations: Option<u32>,
}

fn resolve_config_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit.unwrap_or_else(jobpilot_config::config_path)
}

/// An explicitly named config must exist; the default one may not
async fn load_config(explicit: Option<PathBuf>) -> Result<(PathBuf, Config)> {
    let config = match &explicit {
        Some(path) => Config::load_required(path).await,
        None => Config::load().await,
    }
    .context("loading config")?;
    Ok((resolve_config_path(explicit), config))
}

fn mark(exists: bool) -> &'static str {
    if exists {
        "[OK]"
    } else {
        "[Missing]"
    }
}

/// Initialize config and pipeline directories
pub async fn init_command(config_path: Option<PathBuf>) -> Result<()> {
    let path = resolve_config_path(config_path);
    let existed = path.exists();

    let config = jobpilot_config::init(&path)
        .await
        .with_context(|| format!("initializing {}", path.display()))?;

    if existed {
        println!("✓ Config already present at {}", path.display());
    } else {
        println!("✓ Config written to {}", path.display());
    }
    println!(
        "✓ Pipeline directories ready under {}",
        config.pipeline_root().display()
    );
    println!("\nNext steps:");
    println!("  1. Set at least one of: {}", config.expected_key_names());
    println!(
        "  2. Put your search filters in {}",
        config.pipeline_paths().search_filters.display()
    );
    println!("  3. Run: jobpilot run --resume <path>");
    Ok(())
}

/// Show providers, pipeline files and cache state
pub async fn status_command(config_path: Option<PathBuf>) -> Result<()> {
    let (path, config) = load_config(config_path).await?;
    let paths = config.pipeline_paths();
    let cache = ScrapeCache::new(&paths, config.pipeline.cache_max_age_hours);

    println!("◆ jobpilot Status");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Config:    {} {}", path.display(), mark(path.exists()));
    println!(
        "Pipeline:  {} {}",
        paths.root.display(),
        mark(paths.root.is_dir())
    );
    println!("Filters:   {}", mark(paths.search_filters.is_file()));
    println!("Profile:   {}", mark(paths.user_profile.is_file()));

    match cache.valid_at(Utc::now()).await {
        Some(metadata) => println!(
            "Cache:     valid ({} jobs, scraped {})",
            metadata
                .job_count
                .map(|n| n.to_string())
                .unwrap_or_else(|| "?".to_string()),
            metadata.scraped_at
        ),
        None if cache.has_raw_jobs() => println!("Cache:     stale"),
        None => println!("Cache:     none"),
    }

    println!("Max iterations: {}", config.agent.max_iterations);
    println!(
        "{}",
        FailoverClient::from_config(&config).status_report()
    );
    Ok(())
}

fn print_header(client: &FailoverClient, state: &PipelineState) {
    let rule = "=".repeat(60);
    println!("{}", rule);
    println!("  Agentic Job Search Pipeline - Agent Mode");
    println!("{}", rule);
    println!("{}", client.status_report());
    println!(
        "  Profile:     {}",
        if state.has_profile { "loaded" } else { "none" }
    );
    if let Some(resume) = &state.resume_path {
        println!("  Resume:      {}", resume.display());
    }
    println!();
}

fn check_resume(resume: &Path) {
    if !resume.is_file() {
        warn!("resume {} does not exist", resume.display());
    }
}

/// Run the agent loop over the pipeline
pub async fn run_command(config_path: Option<PathBuf>, options: RunOptions) -> Result<()> {
    let (_, config) = load_config(config_path).await?;

    if config.configured_providers().is_empty() {
        bail!(
            "No LLM provider configured. Set at least one of: {}",
            config.expected_key_names()
        );
    }
    let client = FailoverClient::from_config(&config);
    info!("providers in failover order: {}", client.configured_names().join(", "));

    let paths = config.pipeline_paths();
    paths
        .ensure_dirs()
        .await
        .with_context(|| format!("preparing pipeline root {}", paths.root.display()))?;

    if let Some(resume) = &options.resume {
        check_resume(resume);
    }
    let mut state = PipelineState::from_paths(&paths, options.resume.clone());
    print_header(&client, &state);

    let completer: Arc<dyn Completer> = Arc::new(client);
    let human: Arc<dyn HumanInterface> = Arc::new(ConsoleHuman);
    let stages = Arc::new(CommandStageRunner::new(config.stages.clone(), &paths));
    let cache = ScrapeCache::new(&paths, config.pipeline.cache_max_age_hours);
    let registry = default_registry(
        &paths,
        stages,
        Arc::clone(&completer),
        Arc::clone(&human),
        cache.clone(),
    );
    let initial_context = ContextBuilder::new(registry.describe())
        .initial_context(options.mode, &paths, &cache, &mut state, Utc::now())
        .await;

    let mut agent = AgentLoop::new(registry, completer, human, &config.agent);
    if let Some(max_iterations) = options.max_iterations {
        agent = agent.with_max_iterations(max_iterations);
    }

    let outcome = agent
        .run(&mut state, &initial_context)
        .await
        .context("starting the agent loop")?;
    match outcome.state {
        LoopState::Finished => info!("run finished after {} iterations", outcome.iterations),
        LoopState::MaxIterationsReached => warn!("run stopped at the iteration cap"),
    }

    println!("\n{}", state.summary());
    Ok(())
}
