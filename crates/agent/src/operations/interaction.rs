//! Talking to the human and ending the run

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::{parse_args, Operation, OperationError};
use crate::decision::{Params, CHECK_IN, FINISH};
use crate::human::HumanInterface;
use crate::state::PipelineState;

pub struct CheckIn {
    human: Arc<dyn HumanInterface>,
}

impl CheckIn {
    pub fn new(human: Arc<dyn HumanInterface>) -> Self {
        Self { human }
    }
}

#[derive(Deserialize)]
struct CheckInArgs {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    options: Vec<Value>,
}

#[async_trait]
impl Operation for CheckIn {
    fn name(&self) -> &str {
        CHECK_IN
    }

    fn description(&self) -> &str {
        "Pause and ask the user a question. Takes 'message' (str) and optional 'options' (list of strings)."
    }

    async fn execute(
        &self,
        _state: &mut PipelineState,
        params: Params,
    ) -> Result<String, OperationError> {
        let args: CheckInArgs = parse_args(params)?;
        let message = args
            .message
            .unwrap_or_else(|| "How would you like to proceed?".to_string());
        let options: Vec<String> = args
            .options
            .into_iter()
            .map(|opt| match opt {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect();

        let choice = self.human.ask(&message, &options);
        Ok(format!("User responded: {}", choice))
    }
}

pub struct Finish;

#[derive(Deserialize)]
struct FinishArgs {
    #[serde(default)]
    summary: Option<String>,
}

#[async_trait]
impl Operation for Finish {
    fn name(&self) -> &str {
        FINISH
    }

    fn description(&self) -> &str {
        "End the agent loop. Takes 'summary' (str) with a final summary for the user."
    }

    async fn execute(
        &self,
        _state: &mut PipelineState,
        params: Params,
    ) -> Result<String, OperationError> {
        let args: FinishArgs = parse_args(params)?;
        Ok(format!(
            "FINISH: {}",
            args.summary
                .unwrap_or_else(|| "Pipeline complete.".to_string())
        ))
    }
}
