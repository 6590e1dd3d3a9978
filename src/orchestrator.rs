//! Top-level request flow: input in, a gated decision or an explanation out.
//!
//! The orchestrator never executes anything. A generated command is always
//! returned as a [`CommandDecision`] that carries its safety verdict, so the
//! caller has to go through [`CommandDecision::approve`] before running it.

use std::future::Future;
use tracing::{debug, info};

use crate::chat::{ChatMode, ChatRequest, ChatResult, SamplingDefaults};
use crate::decision::{BlockPolicy, CommandDecision};
use crate::error::{Error, Result};
use crate::input_kind::{self, InputAssessment, InputShape};
use crate::prompts;
use crate::router::ModelRouter;
use crate::safety::SafetyGate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessMode {
    /// Translate a request into a command to run.
    Shell,
    /// Teach: a request in prose, answered with a command and an explanation.
    TeachExplainNl,
    /// Teach: a command, answered with an explanation only.
    TeachExplainCmd,
}

/// A teaching answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Explanation {
    pub text: String,
    /// Command suggested alongside the explanation, already gated.
    pub command: Option<CommandDecision>,
    pub reasoning: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorResult {
    /// Blank input; nothing was sent.
    NoOp,
    Command(CommandDecision),
    Explanation(Explanation),
}

pub struct CommandOrchestrator {
    router: ModelRouter,
    gate: SafetyGate,
    sampling: SamplingDefaults,
    block_policy: BlockPolicy,
}

impl CommandOrchestrator {
    pub fn new(router: ModelRouter, gate: SafetyGate, sampling: SamplingDefaults, block_policy: BlockPolicy) -> Self {
        Self {
            router,
            gate,
            sampling,
            block_policy,
        }
    }

    pub fn router(&self) -> &ModelRouter {
        &self.router
    }

    pub fn gate(&self) -> &SafetyGate {
        &self.gate
    }

    pub fn set_sampling(&mut self, sampling: SamplingDefaults) {
        self.sampling = sampling;
    }

    pub fn set_block_policy(&mut self, policy: BlockPolicy) {
        self.block_policy = policy;
    }

    /// Picks the teach mode for free-form input.
    ///
    /// Only input that clearly looks like a command is explained as one;
    /// anything unclear is sent as a request in prose.
    pub fn teach_mode_for(input: &str) -> ProcessMode {
        Self::teach_mode_from(input_kind::assess(input))
    }

    fn teach_mode_from(assessment: InputAssessment) -> ProcessMode {
        match assessment.shape {
            InputShape::Command => ProcessMode::TeachExplainCmd,
            InputShape::NaturalLanguage | InputShape::Ambiguous => ProcessMode::TeachExplainNl,
        }
    }

    pub async fn process(&self, input: &str, mode: ProcessMode) -> Result<OrchestratorResult> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(OrchestratorResult::NoOp);
        }

        match mode {
            ProcessMode::Shell => self.translate(input).await,
            ProcessMode::TeachExplainNl => self.explain_request(input).await,
            ProcessMode::TeachExplainCmd => {
                let assessment = input_kind::assess(input);
                if assessment.shape == InputShape::NaturalLanguage {
                    debug!(
                        "Input reads as prose (confidence {:.2}), explaining it as a request",
                        assessment.confidence
                    );
                    self.explain_request(input).await
                } else {
                    self.explain_command(input).await
                }
            }
        }
    }

    /// Like [`Self::process`], but gives up with [`Error::Cancelled`] as soon
    /// as `cancel` completes. The rate-limit slot of an interrupted call stays used.
    pub async fn process_with_cancel<C>(&self, input: &str, mode: ProcessMode, cancel: C) -> Result<OrchestratorResult>
    where
        C: Future<Output = ()>,
    {
        tokio::select! {
            result = self.process(input, mode) => result,
            _ = cancel => {
                info!("Request cancelled by user");
                Err(Error::Cancelled)
            }
        }
    }

    /// Asks the model why `command` failed and how to fix it.
    pub async fn diagnose_failure(
        &self,
        command: &str,
        stdout: &str,
        stderr: &str,
        exit_code: Option<i32>,
    ) -> Result<String> {
        let request = self.request(
            ChatMode::DiagnoseFailure,
            prompts::DIAGNOSE_SYSTEM,
            prompts::diagnose_prompt(command, stdout, stderr, exit_code),
        );
        let result = self.router.dispatch(&request).await?;
        Ok(result.parsed_explanation.unwrap_or(result.raw_text))
    }

    async fn translate(&self, input: &str) -> Result<OrchestratorResult> {
        let request = self.request(
            ChatMode::Translate,
            prompts::translate_system(),
            prompts::translate_prompt(input),
        );
        let result = self.router.dispatch(&request).await?;
        let command = result
            .parsed_command
            .ok_or_else(|| Error::provider(None, "model returned no command"))?;

        Ok(OrchestratorResult::Command(self.decide(command, None)))
    }

    async fn explain_request(&self, input: &str) -> Result<OrchestratorResult> {
        let request = self.request(ChatMode::ExplainNl, prompts::EXPLAIN_NL_SYSTEM, prompts::explain_nl_prompt(input));
        let result = self.router.dispatch(&request).await?;
        let command = result
            .parsed_command
            .clone()
            .map(|c| self.decide(c, result.parsed_explanation.clone()));
        Ok(OrchestratorResult::Explanation(Self::explanation(result, command)))
    }

    async fn explain_command(&self, input: &str) -> Result<OrchestratorResult> {
        let request = self.request(
            ChatMode::ExplainCommand,
            prompts::EXPLAIN_COMMAND_SYSTEM,
            prompts::explain_command_prompt(input),
        );
        let result = self.router.dispatch(&request).await?;
        Ok(OrchestratorResult::Explanation(Self::explanation(result, None)))
    }

    fn request(&self, mode: ChatMode, system: impl Into<String>, prompt: impl Into<String>) -> ChatRequest {
        ChatRequest::new(mode, system, prompt, self.sampling)
    }

    fn decide(&self, command: String, explanation: Option<String>) -> CommandDecision {
        let decision = CommandDecision::new(&self.gate, command, explanation, self.block_policy);
        debug!("Safety verdict for generated command: {}", decision.level());
        decision
    }

    fn explanation(result: ChatResult, command: Option<CommandDecision>) -> Explanation {
        Explanation {
            text: result.parsed_explanation.unwrap_or(result.raw_text),
            command,
            reasoning: result.reasoning,
        }
    }
}
