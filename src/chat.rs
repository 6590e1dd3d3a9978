//! Provider-agnostic request and result values.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatMode {
    /// Natural language in, a single shell command out.
    Translate,
    /// A shell command in, an explanation of its syntax and effect out.
    ExplainCommand,
    /// Natural language in, a command plus a teaching explanation out.
    ExplainNl,
    /// A failed command and its output in, likely causes and fixes out.
    DiagnoseFailure,
}

impl ChatMode {
    pub fn max_tokens(self) -> Option<u32> {
        match self {
            ChatMode::Translate => None,
            ChatMode::ExplainCommand | ChatMode::ExplainNl => Some(1500),
            ChatMode::DiagnoseFailure => Some(500),
        }
    }
}

/// Temperature and nucleus sampling defaults, read once from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingDefaults {
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for SamplingDefaults {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            top_p: 0.7,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub prompt: String,
    pub system_instruction: String,
    pub temperature: f32,
    pub top_p: f32,
    pub mode: ChatMode,
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    pub fn new(
        mode: ChatMode,
        system_instruction: impl Into<String>,
        prompt: impl Into<String>,
        sampling: SamplingDefaults,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            system_instruction: system_instruction.into(),
            temperature: sampling.temperature,
            top_p: sampling.top_p,
            mode,
            max_tokens: mode.max_tokens(),
        }
    }

    /// Rejects sampling values outside `[0, 1]`.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("temperature", self.temperature), ("top_p", self.top_p)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!("{} must be within [0, 1], got {}", name, value)));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatResult {
    /// Model output with any reasoning block removed.
    pub raw_text: String,
    pub parsed_command: Option<String>,
    pub parsed_explanation: Option<String>,
    /// Thinking output, kept for display in the explain modes only.
    pub reasoning: Option<String>,
    pub provider_id: String,
    pub model: String,
    pub latency: Duration,
    pub usage: Option<Usage>,
}
