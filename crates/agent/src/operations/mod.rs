//! Operation catalog
//!
//! Each pipeline action is an `Operation`. The registry keeps them in
//! registration order, renders their descriptions for the system prompt, and
//! turns handler failures into observation text so the loop only ever sees
//! strings.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use jobpilot_config::PipelinePaths;
use jobpilot_provider::{Completer, ProviderError};

use crate::cache::ScrapeCache;
use crate::decision::Params;
use crate::human::HumanInterface;
use crate::state::PipelineState;
use crate::{AgentError, Result};

pub mod evaluate;
pub mod files;
pub mod filters;
pub mod interaction;
pub mod lenient;
pub mod path_utils;
pub mod pipeline;
pub mod select;
pub mod stages;

pub use evaluate::EvaluateDocument;
pub use files::{ListApplications, ReadFile};
pub use filters::{ProposeFilterChanges, ReadSearchFilters};
pub use interaction::{CheckIn, Finish};
pub use pipeline::{AnalyzeJobs, GenerateDocuments, GenerateReport, ParseJobs, ScoreJobs, ScrapeJobs};
pub use select::SelectJobs;
pub use stages::{CommandStageRunner, Stage, StageOutput, StageRunner, StageVars};

/// Failure inside one operation; never escapes the registry
#[derive(Error, Debug)]
pub enum OperationError {
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("path {path} is outside the pipeline root {root}")]
    OutsideRoot { path: String, root: PathBuf },

    #[error("{stage} stage failed: {message}")]
    Stage { stage: Stage, message: String },

    #[error("{stage} stage timed out after {secs}s")]
    Timeout { stage: Stage, secs: u64 },

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Coerce the untyped parameter bag into an operation's argument struct
pub fn parse_args<T: DeserializeOwned>(params: Params) -> std::result::Result<T, OperationError> {
    serde_json::from_value(Value::Object(params))
        .map_err(|e| OperationError::InvalidParams(e.to_string()))
}

/// A named pipeline action
#[async_trait]
pub trait Operation: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;

    /// Whether the human must confirm before this runs
    fn requires_approval(&self) -> bool {
        false
    }

    async fn execute(
        &self,
        state: &mut PipelineState,
        params: Params,
    ) -> std::result::Result<String, OperationError>;
}

/// Catalog entry as shown to the reasoning backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationDescriptor {
    pub name: String,
    pub description: String,
    pub requires_approval: bool,
}

/// Ordered operation catalog
#[derive(Default)]
pub struct OperationRegistry {
    operations: Vec<Box<dyn Operation>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an operation; a later registration under the same name replaces
    /// the earlier one in place
    pub fn register<O: Operation + 'static>(&mut self, operation: O) {
        match self
            .operations
            .iter()
            .position(|op| op.name() == operation.name())
        {
            Some(idx) => self.operations[idx] = Box::new(operation),
            None => self.operations.push(Box::new(operation)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&dyn Operation> {
        self.operations
            .iter()
            .find(|op| op.name() == name)
            .map(|op| op.as_ref())
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<&str> {
        self.operations.iter().map(|op| op.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn describe(&self) -> Vec<OperationDescriptor> {
        self.operations
            .iter()
            .map(|op| OperationDescriptor {
                name: op.name().to_string(),
                description: op.description().to_string(),
                requires_approval: op.requires_approval(),
            })
            .collect()
    }

    /// Run `name` against the state.
    ///
    /// Only an unknown name is an error; handler failures come back as an
    /// observation and are recorded in `state.errors`.
    pub async fn invoke(
        &self,
        name: &str,
        state: &mut PipelineState,
        params: Params,
    ) -> Result<String> {
        let operation = self
            .get(name)
            .ok_or_else(|| AgentError::UnknownOperation(name.to_string()))?;

        debug!("invoking {}", name);
        match operation.execute(state, params).await {
            Ok(observation) => Ok(observation),
            Err(e) => {
                warn!("{} failed: {}", name, e);
                state.record_error(format!("{}: {}", name, e));
                Ok(format!("{} failed: {}", name, e))
            }
        }
    }
}

/// The full pipeline catalog
pub fn default_registry(
    paths: &PipelinePaths,
    stages: Arc<dyn StageRunner>,
    completer: Arc<dyn Completer>,
    human: Arc<dyn HumanInterface>,
    cache: ScrapeCache,
) -> OperationRegistry {
    let mut registry = OperationRegistry::new();

    registry.register(ScrapeJobs::new(paths.clone(), Arc::clone(&stages), cache));
    registry.register(ParseJobs::new(paths.clone(), Arc::clone(&stages)));
    registry.register(ScoreJobs::new(paths.clone(), Arc::clone(&stages)));
    registry.register(SelectJobs::new(paths.clone()));
    registry.register(AnalyzeJobs::new(paths.clone(), Arc::clone(&stages)));
    registry.register(GenerateDocuments::new(paths.clone(), Arc::clone(&stages)));
    registry.register(GenerateReport::new(paths.clone(), stages));

    registry.register(ReadFile::new(paths.root.clone()));
    registry.register(EvaluateDocument::new(paths.root.clone(), completer));
    registry.register(ReadSearchFilters);
    registry.register(ProposeFilterChanges);
    registry.register(ListApplications::new(paths.applications_dir.clone()));

    registry.register(CheckIn::new(human));
    registry.register(Finish);

    registry
}
