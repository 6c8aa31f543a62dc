//! Reasoning output parser
//!
//! The backend answers in a loose `Thought:` / `Action:` / `Action Input:`
//! format. Anything that does not name a registered operation becomes a
//! check-in with the human rather than an error.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::clip;
use crate::decision::{Decision, Params};

static THOUGHT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)Thought:\s*(.+?)(?:\nAction:|\z)").expect("thought pattern")
});

static ACTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Action:\s*(\S+)").expect("action pattern"));

static ACTION_INPUT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)Action Input:\s*(.+)").expect("action input pattern"));

const RATIONALE_FALLBACK_CHARS: usize = 200;
const DIAGNOSTIC_CHARS: usize = 300;

/// Turn raw reasoning output into a `Decision`.
///
/// `is_known` decides whether an extracted operation name is registered.
pub fn parse_decision(text: &str, is_known: impl Fn(&str) -> bool) -> Decision {
    let thought = THOUGHT
        .captures(text)
        .map(|c| c[1].trim().to_string())
        .unwrap_or_default();

    let action = ACTION
        .captures(text)
        .map(|c| clean_operation_name(&c[1]))
        .unwrap_or_default();

    let params = ACTION_INPUT
        .captures(text)
        .map(|c| extract_params(c[1].trim()))
        .unwrap_or_default();

    if action.is_empty() || !is_known(&action) {
        warn!("could not extract a known operation (got '{}')", action);
        let rationale = if thought.is_empty() {
            clip(text, RATIONALE_FALLBACK_CHARS).to_string()
        } else {
            thought
        };
        return Decision::check_in(
            rationale,
            format!(
                "I couldn't determine my next action. My response was: {}",
                clip(text, DIAGNOSTIC_CHARS)
            ),
        );
    }

    debug!("parsed decision: {} {:?}", action, params);
    Decision::new(thought, action, params)
}

/// Strip markdown and punctuation noise around an operation name
fn clean_operation_name(raw: &str) -> String {
    raw.trim_matches(|c: char| matches!(c, '`' | '*' | '"' | '\'' | ',' | '.' | ':' | '(' | ')'))
        .to_string()
}

/// Decode the `Action Input:` segment, falling back to the first balanced
/// `{...}` region, then to an empty bag
fn extract_params(raw: &str) -> Params {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(raw) {
        return map;
    }

    if let Some(region) = first_balanced_object(raw) {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(region) {
            return map;
        }
    }

    debug!("no decodable parameters in: {}", clip(raw, 80));
    Params::new()
}

/// First `{...}` region with balanced braces, ignoring braces inside JSON
/// string literals
fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::CHECK_IN;

    fn known(name: &str) -> bool {
        matches!(
            name,
            "scrape_jobs" | "select_jobs" | "check_in" | "finish" | "read_file"
        )
    }

    #[test]
    fn test_well_formed_response() {
        let text = "Thought: Nothing scraped yet, start there.\nAction: scrape_jobs\nAction Input: {\"method\": \"api\"}";
        let decision = parse_decision(text, known);
        assert_eq!(decision.operation(), "scrape_jobs");
        assert_eq!(decision.rationale(), "Nothing scraped yet, start there.");
        assert_eq!(decision.params()["method"], "api");
    }

    #[test]
    fn test_multiline_thought() {
        let text = "Thought: Scores look weak.\nOnly 2 jobs above 50%.\nAction: check_in\nAction Input: {}";
        let decision = parse_decision(text, known);
        assert_eq!(decision.operation(), "check_in");
        assert_eq!(decision.rationale(), "Scores look weak.\nOnly 2 jobs above 50%.");
        assert!(decision.params().is_empty());
    }

    #[test]
    fn test_markdown_wrapped_action_name() {
        let text = "Thought: done\nAction: `finish`\nAction Input: {\"summary\": \"ok\"}";
        let decision = parse_decision(text, known);
        assert_eq!(decision.operation(), "finish");
        assert_eq!(decision.params()["summary"], "ok");
    }

    #[test]
    fn test_trailing_noise_after_json() {
        let text = "Thought: pick\nAction: select_jobs\nAction Input: {\"count\": 3, \"threshold\": 50}\nObservation: (waiting)";
        let decision = parse_decision(text, known);
        assert_eq!(decision.operation(), "select_jobs");
        assert_eq!(decision.params()["count"], 3);
        assert_eq!(decision.params()["threshold"], 50);
    }

    #[test]
    fn test_json_inside_code_fence() {
        let text = "Thought: read it\nAction: read_file\nAction Input: ```json\n{\"path\": \"output/a/{x}.md\"}\n```";
        let decision = parse_decision(text, known);
        assert_eq!(decision.params()["path"], "output/a/{x}.md");
    }

    #[test]
    fn test_undecodable_input_gives_empty_bag() {
        let text = "Thought: go\nAction: scrape_jobs\nAction Input: method=api";
        let decision = parse_decision(text, known);
        assert_eq!(decision.operation(), "scrape_jobs");
        assert!(decision.params().is_empty());
    }

    #[test]
    fn test_non_object_json_gives_empty_bag() {
        let text = "Thought: go\nAction: scrape_jobs\nAction Input: [1, 2]";
        assert!(parse_decision(text, known).params().is_empty());
    }

    #[test]
    fn test_missing_action_falls_back_to_check_in() {
        let text = "I think we should probably scrape some jobs first.";
        let decision = parse_decision(text, known);
        assert_eq!(decision.operation(), CHECK_IN);
        assert_eq!(decision.rationale(), text);
        let message = decision.params()["message"].as_str().unwrap();
        assert!(message.starts_with("I couldn't determine my next action."));
        assert!(message.contains(text));
    }

    #[test]
    fn test_unknown_action_falls_back_to_check_in() {
        let text = "Thought: Let me fly.\nAction: launch_rocket\nAction Input: {}";
        let decision = parse_decision(text, known);
        assert_eq!(decision.operation(), CHECK_IN);
        assert_eq!(decision.rationale(), "Let me fly.");
    }

    #[test]
    fn test_fallback_clips_long_text() {
        let text = "x".repeat(1000);
        let decision = parse_decision(&text, known);
        assert_eq!(decision.rationale().len(), 200);
        let message = decision.params()["message"].as_str().unwrap();
        assert!(message.ends_with(&"x".repeat(300)));
        assert!(!message.contains(&"x".repeat(301)));
    }

    #[test]
    fn test_empty_text() {
        let decision = parse_decision("", known);
        assert_eq!(decision.operation(), CHECK_IN);
        assert_eq!(decision.rationale(), "");
    }

    #[test]
    fn test_first_balanced_object() {
        assert_eq!(first_balanced_object("a {\"b\": {\"c\": 1}} d"), Some("{\"b\": {\"c\": 1}}"));
        assert_eq!(first_balanced_object("{\"s\": \"}\"} tail"), Some("{\"s\": \"}\"}"));
        assert_eq!(first_balanced_object("{ unclosed"), None);
        assert_eq!(first_balanced_object("no braces"), None);
    }
}
