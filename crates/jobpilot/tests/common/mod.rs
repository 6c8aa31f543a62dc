//! Shared fixtures for jobpilot CLI tests
#![allow(dead_code)]

use assert_cmd::Command;
use serde_json::json;
use std::path::PathBuf;
use tempfile::{tempdir, TempDir};

/// Credential variables of the default provider catalog
pub const KEY_VARS: &[&str] = &[
    "SAMBANOVA_API_KEY",
    "CEREBRAS_API_KEY",
    "GROQ_API_KEY",
    "GEMINI_API_KEY",
    "LLM_MODEL",
];

/// Isolated home directory and pipeline root
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub config_path: PathBuf,
    pub pipeline_root: PathBuf,
}

impl TestEnv {
    pub fn new() -> anyhow::Result<Self> {
        let temp_dir = tempdir()?;
        let config_path = temp_dir.path().join("config.json");
        let pipeline_root = temp_dir.path().join("work");

        Ok(Self {
            temp_dir,
            config_path,
            pipeline_root,
        })
    }

    /// jobpilot with no provider credentials leaking in from the host
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_jobpilot"));
        cmd.env("HOME", self.temp_dir.path());
        cmd.current_dir(self.temp_dir.path());
        for var in KEY_VARS {
            cmd.env_remove(var);
        }
        cmd
    }

    /// Config pointing at the test pipeline root, with the given providers
    pub fn write_config(&self, providers: serde_json::Value) -> anyhow::Result<()> {
        let config = json!({
            "pipeline": { "root": self.pipeline_root.display().to_string() },
            "providers": providers,
        });
        std::fs::write(&self.config_path, serde_json::to_string_pretty(&config)?)?;
        Ok(())
    }

    /// Single provider served by a local mock endpoint
    pub fn write_mock_provider_config(&self, endpoint: &str) -> anyhow::Result<()> {
        self.write_config(json!([{
            "id": "mock",
            "display_name": "MockLLM",
            "key_env": "JOBPILOT_TEST_UNUSED_KEY",
            "api_key": "test-key",
            "endpoint": endpoint,
            "model": "mock-model",
            "delay_secs": 0,
            "cooldown_secs": 1
        }]))
    }
}

/// Chat completions body whose content is `text`
pub fn completion(text: &str) -> String {
    json!({
        "choices": [{
            "message": { "role": "assistant", "content": text },
            "finish_reason": "stop"
        }]
    })
    .to_string()
}
