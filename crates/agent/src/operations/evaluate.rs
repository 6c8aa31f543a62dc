//! Self-critique of generated documents

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use jobpilot_provider::{Completer, Message};

use super::path_utils::resolve_within_root;
use super::{parse_args, Operation, OperationError};
use crate::clip;
use crate::decision::Params;
use crate::state::PipelineState;

const MAX_DOCUMENT_CHARS: usize = 3000;
const EVALUATION_MAX_TOKENS: u32 = 500;

fn reviewer_prompt(doc_type: &str) -> String {
    format!(
        "You are a hiring manager reviewing a {}. \
         Score it 1-10 and give a brief assessment. Format:\n\
         Score: X/10\n\
         Strengths: ...\n\
         Weaknesses: ...\n\
         Recommendation: KEEP | REVISE | REWRITE",
        doc_type
    )
}

/// Asks the reasoning backend to review a resume or cover letter
pub struct EvaluateDocument {
    root: PathBuf,
    completer: Arc<dyn Completer>,
}

impl EvaluateDocument {
    pub fn new(root: PathBuf, completer: Arc<dyn Completer>) -> Self {
        Self { root, completer }
    }
}

#[derive(Deserialize)]
struct EvaluateArgs {
    #[serde(default)]
    path: Option<String>,
    #[serde(default, rename = "type")]
    doc_type: Option<String>,
}

#[async_trait]
impl Operation for EvaluateDocument {
    fn name(&self) -> &str {
        "evaluate_document"
    }

    fn description(&self) -> &str {
        "LLM critiques a generated document (resume/cover letter). Takes 'path' and 'type'. Returns score and KEEP/REVISE/REWRITE."
    }

    async fn execute(
        &self,
        _state: &mut PipelineState,
        params: Params,
    ) -> Result<String, OperationError> {
        let args: EvaluateArgs = parse_args(params)?;
        let requested = args.path.unwrap_or_default();
        let doc_type = args.doc_type.unwrap_or_else(|| "cover letter".to_string());

        if requested.trim().is_empty() {
            return Ok("Document not found: ".to_string());
        }
        let path = resolve_within_root(&requested, &self.root).await?;
        if !path.is_file() {
            return Ok(format!("Document not found: {}", requested));
        }

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) => return Ok(format!("Error reading document: {}", e)),
        };

        let messages = [
            Message::system(reviewer_prompt(&doc_type)),
            Message::user(clip(&content, MAX_DOCUMENT_CHARS)),
        ];
        let review = self
            .completer
            .complete(&messages, EVALUATION_MAX_TOKENS)
            .await?;

        Ok(format!("Evaluation of {}:\n{}", requested, review))
    }
}
