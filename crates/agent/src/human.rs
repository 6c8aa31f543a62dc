//! Human-in-the-loop prompts
//!
//! Approval gates and check-ins are plain blocking line I/O; the loop is
//! sequential so nothing else runs while the human thinks.

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::sync::Mutex;

/// Where approvals and answers come from
pub trait HumanInterface: Send + Sync {
    /// Yes/no question; anything but `y`/`yes` is a decline
    fn confirm(&self, prompt: &str) -> bool;

    /// Free-form question, optionally with numbered options
    fn ask(&self, question: &str, options: &[String]) -> String;
}

/// True for an affirmative answer
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Terminal-backed human
#[derive(Debug, Default)]
pub struct ConsoleHuman;

impl ConsoleHuman {
    fn read_line(prompt: &str) -> String {
        print!("{}", prompt);
        let _ = io::stdout().flush();

        let mut input = String::new();
        if io::stdin().lock().read_line(&mut input).is_err() {
            return String::new();
        }
        input.trim().to_string()
    }
}

impl HumanInterface for ConsoleHuman {
    fn confirm(&self, prompt: &str) -> bool {
        is_affirmative(&Self::read_line(&format!("  {} (y/n) ", prompt)))
    }

    fn ask(&self, question: &str, options: &[String]) -> String {
        let rule = "─".repeat(50);
        println!("\n{}", rule);
        println!("  Agent check-in: {}", question);
        for (i, option) in options.iter().enumerate() {
            println!("    {}. {}", i + 1, option);
        }
        println!("{}", rule);

        if options.is_empty() {
            Self::read_line("  Your response: ")
        } else {
            Self::read_line("  Your choice (number or text): ")
        }
    }
}

/// Pre-recorded answers, for unattended runs and tests.
///
/// Answers are consumed in order by both `confirm` and `ask`; once they run
/// out, confirmations decline and questions get an empty answer.
#[derive(Debug, Default)]
pub struct ScriptedHuman {
    answers: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedHuman {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Every prompt shown so far
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn next_answer(&self, prompt: &str) -> String {
        self.prompts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(prompt.to_string());
        self.answers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
            .unwrap_or_default()
    }
}

impl HumanInterface for ScriptedHuman {
    fn confirm(&self, prompt: &str) -> bool {
        is_affirmative(&self.next_answer(prompt))
    }

    fn ask(&self, question: &str, _options: &[String]) -> String {
        self.next_answer(question)
    }
}
