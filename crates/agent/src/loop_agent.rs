//! Agent loop - reason, act, observe

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use jobpilot_config::AgentConfig;
use jobpilot_provider::{Completer, Message};

use crate::clip;
use crate::context::ContextBuilder;
use crate::decision::{Decision, FINISH};
use crate::human::HumanInterface;
use crate::operations::OperationRegistry;
use crate::parser::parse_decision;
use crate::state::PipelineState;
use crate::window::ContextWindow;
use crate::{AgentError, Result};

/// Stand-in response when every provider is exhausted
const REASONING_FALLBACK: &str = "Thought: Reasoning LLM failed.\nAction: check_in\nAction Input: {\"message\": \"My reasoning LLM hit an error. How should I proceed?\"}";

const TRUNCATION_MARKER: &str = "\n... [truncated]";

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Finished,
    MaxIterationsReached,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub state: LoopState,
    /// Iterations started, including the finishing one
    pub iterations: u32,
    /// Text returned by the finish operation
    pub closing_message: Option<String>,
    /// Final conversation, after the last bounding
    pub conversation: Vec<Message>,
}

/// The control loop
pub struct AgentLoop {
    registry: OperationRegistry,
    completer: Arc<dyn Completer>,
    human: Arc<dyn HumanInterface>,
    window: ContextWindow,
    max_iterations: u32,
    max_observation_chars: usize,
    reasoning_max_tokens: u32,
}

impl AgentLoop {
    pub fn new(
        registry: OperationRegistry,
        completer: Arc<dyn Completer>,
        human: Arc<dyn HumanInterface>,
        config: &AgentConfig,
    ) -> Self {
        Self {
            registry,
            completer,
            human,
            window: ContextWindow::from_config(config),
            max_iterations: config.max_iterations,
            max_observation_chars: config.max_observation_chars,
            reasoning_max_tokens: config.reasoning_max_tokens,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Drive the pipeline until the backend finishes or the iteration cap
    /// is hit.
    ///
    /// Only a catalog without operations, or without `finish`, is an error;
    /// every other failure becomes an observation.
    pub async fn run(&self, state: &mut PipelineState, initial_context: &str) -> Result<RunOutcome> {
        if self.registry.is_empty() {
            return Err(AgentError::NoOperations);
        }
        if !self.registry.has(FINISH) {
            return Err(AgentError::MissingFinish);
        }

        let context = ContextBuilder::new(self.registry.describe());
        let mut conversation = vec![
            Message::system(context.build_system_prompt(state)),
            Message::user(initial_context),
        ];

        for iteration in 1..=self.max_iterations {
            conversation = self.window.bound(conversation);
            if let Some(system) = conversation.first_mut() {
                *system = Message::system(context.build_system_prompt(state));
            }

            let response = match self
                .completer
                .complete(&conversation, self.reasoning_max_tokens)
                .await
            {
                Ok(text) => text,
                Err(e) => {
                    error!("reasoning call failed: {}", e);
                    println!("\n  Agent reasoning error: {}", e);
                    println!("  Falling back to check-in...");
                    REASONING_FALLBACK.to_string()
                }
            };

            let decision = parse_decision(&response, |name| self.registry.has(name));
            print_step(iteration, &decision);

            if decision.is_finish() {
                let closing = self
                    .registry
                    .invoke(FINISH, state, decision.into_params())
                    .await?;
                let banner = "=".repeat(60);
                println!("\n{}", banner);
                println!("  {}", closing);
                println!("{}", banner);
                info!("finished after {} iterations", iteration);

                conversation.push(Message::assistant(response));
                return Ok(RunOutcome {
                    state: LoopState::Finished,
                    iterations: iteration,
                    closing_message: Some(closing),
                    conversation,
                });
            }

            let observation = self.act(state, decision).await?;
            let observation = truncate_observation(observation, self.max_observation_chars);
            println!("  Result: {}", clip(&observation, 150));

            conversation.push(Message::assistant(response));
            conversation.push(Message::user(format!("Observation: {}", observation)));

            let delay = self.completer.call_delay();
            if !delay.is_zero() {
                debug!("waiting {:?} before the next reasoning call", delay);
                tokio::time::sleep(delay).await;
            }
        }

        warn!("iteration cap of {} reached", self.max_iterations);
        println!(
            "\n  Agent hit maximum iterations ({}). Stopping.",
            self.max_iterations
        );
        Ok(RunOutcome {
            state: LoopState::MaxIterationsReached,
            iterations: self.max_iterations,
            closing_message: None,
            conversation,
        })
    }

    /// Dispatch one non-terminal decision through the approval gate
    async fn act(&self, state: &mut PipelineState, decision: Decision) -> Result<String> {
        let name = decision.operation().to_string();
        let Some(operation) = self.registry.get(&name) else {
            debug!("unknown operation {}", name);
            return Ok(format!(
                "Unknown tool: {}. Available tools: {}",
                name,
                self.registry.names().join(", ")
            ));
        };

        if operation.requires_approval() {
            println!("\n  This action requires your approval.");
            if !decision.params().is_empty() {
                println!("  Parameters: {}", render_params(&decision));
            }
            if !self.human.confirm(&format!("Proceed with {}?", name)) {
                info!("{} declined", name);
                return Ok(format!("User declined to run {}.", name));
            }
        }

        self.registry
            .invoke(&name, state, decision.into_params())
            .await
    }
}

fn render_params(decision: &Decision) -> String {
    serde_json::to_string(decision.params()).unwrap_or_else(|_| "{}".to_string())
}

fn print_step(iteration: u32, decision: &Decision) {
    println!("\n{}", "─".repeat(50));
    println!("  Step {}: {}", iteration, clip(decision.rationale(), 120));
    println!(
        "  → {}({})",
        decision.operation(),
        clip(&render_params(decision), 80)
    );
}

fn truncate_observation(observation: String, max_chars: usize) -> String {
    let kept = clip(&observation, max_chars);
    if kept.len() < observation.len() {
        format!("{}{}", kept, TRUNCATION_MARKER)
    } else {
        observation
    }
}
