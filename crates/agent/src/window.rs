//! Conversation size bounding

use jobpilot_config::AgentConfig;
use jobpilot_provider::Message;
use tracing::debug;

/// Synthetic turn standing in for elided history
pub const ELISION_NOTICE: &str = "[Earlier conversation was trimmed to save context. The agent has been working through the pipeline steps. Recent history follows.]";

/// Keeps the conversation under a character budget by replacing the aged
/// middle with a single notice
#[derive(Debug, Clone)]
pub struct ContextWindow {
    max_chars: usize,
    keep_recent: usize,
}

impl ContextWindow {
    pub fn new(max_chars: usize, keep_recent: usize) -> Self {
        Self {
            max_chars,
            keep_recent,
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(config.max_context_chars, config.keep_recent_turns)
    }

    pub fn total_chars(conversation: &[Message]) -> usize {
        conversation.iter().map(Message::char_len).sum()
    }

    /// Bound `conversation` to the budget.
    ///
    /// Within budget the input comes back unchanged. Over budget the result
    /// is the system turn, the elision notice and the last `keep_recent`
    /// turns; without a leading system turn only the tail survives. When
    /// nothing older than the tail exists there is nothing to elide and the
    /// input is returned as is.
    pub fn bound(&self, conversation: Vec<Message>) -> Vec<Message> {
        let total = Self::total_chars(&conversation);
        if total <= self.max_chars {
            return conversation;
        }

        let has_system = conversation.first().is_some_and(Message::is_system);
        let body_start = usize::from(has_system);
        if conversation.len() - body_start <= self.keep_recent {
            return conversation;
        }

        let tail_start = conversation.len() - self.keep_recent;
        debug!(
            "context over budget ({} > {} chars), eliding {} turns",
            total,
            self.max_chars,
            tail_start - body_start
        );

        let mut conversation = conversation;
        let recent = conversation.split_off(tail_start);
        if !has_system {
            return recent;
        }

        let system = conversation.swap_remove(0);
        let mut bounded = Vec::with_capacity(recent.len() + 2);
        bounded.push(system);
        bounded.push(Message::user(ELISION_NOTICE));
        bounded.extend(recent);

        // the notice must never make the result larger than what it replaced
        if Self::total_chars(&bounded) >= total {
            bounded.remove(1);
        }
        bounded
    }
}
