//! Confirmation requirements for generated commands.
//!
//! A [`CommandDecision`] always carries the safety verdict next to the
//! command. The only way to get something the executor will run is
//! [`CommandDecision::approve`], which checks the user's acknowledgment
//! against the verdict level.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{info, warn};

use crate::safety::{SafetyGate, SafetyLevel, SafetyVerdict};

/// Acknowledgment that confirms a safe command (`yes` is accepted as well).
pub const SAFE_ACK: &str = "y";
/// Acknowledgment that confirms a command with a warning verdict.
pub const WARN_ACK: &str = "yes";
/// Acknowledgment that overrides a block verdict. Case-sensitive.
pub const FORCE_ACK: &str = "FORCE";

/// What to do with commands the safety gate blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockPolicy {
    /// Allow execution after the user types [`FORCE_ACK`].
    #[default]
    Force,
    /// Never execute blocked commands.
    Refuse,
}

impl fmt::Display for BlockPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockPolicy::Force => f.write_str("force"),
            BlockPolicy::Refuse => f.write_str("refuse"),
        }
    }
}

impl FromStr for BlockPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "force" => Ok(BlockPolicy::Force),
            "refuse" => Ok(BlockPolicy::Refuse),
            other => Err(format!("unknown block policy '{}', expected force or refuse", other)),
        }
    }
}

/// Text the user typed in answer to a confirmation prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acknowledgment(String);

impl Acknowledgment {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Why a decision was not turned into an [`ApprovedCommand`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Refusal {
    #[error("command was not confirmed")]
    NotConfirmed,
    #[error("command blocked by safety rule '{rule}' and the block policy refuses it")]
    Blocked { rule: String },
}

/// A command the user has confirmed at the level its verdict requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovedCommand {
    command: String,
    level: SafetyLevel,
}

impl ApprovedCommand {
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn level(&self) -> SafetyLevel {
        self.level
    }
}

/// A generated command bundled with its safety verdict.
///
/// Fields are read-only so the verdict always belongs to the command text it
/// was computed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDecision {
    command: String,
    verdict: SafetyVerdict,
    explanation: Option<String>,
    policy: BlockPolicy,
}

impl CommandDecision {
    /// Classifies `command` with `gate` and bundles it with the verdict.
    pub fn new(
        gate: &SafetyGate,
        command: impl Into<String>,
        explanation: Option<String>,
        policy: BlockPolicy,
    ) -> Self {
        let command = command.into();
        let verdict = gate.classify(&command);
        Self {
            command,
            verdict,
            explanation,
            policy,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn verdict(&self) -> &SafetyVerdict {
        &self.verdict
    }

    pub fn explanation(&self) -> Option<&str> {
        self.explanation.as_deref()
    }

    pub fn level(&self) -> SafetyLevel {
        self.verdict.level
    }

    pub fn policy(&self) -> BlockPolicy {
        self.policy
    }

    /// The text the user has to type, or `None` when the command can never run.
    pub fn required_acknowledgment(&self) -> Option<&'static str> {
        match (self.verdict.level, self.policy) {
            (SafetyLevel::Safe, _) => Some(SAFE_ACK),
            (SafetyLevel::Warn, _) => Some(WARN_ACK),
            (SafetyLevel::Block, BlockPolicy::Force) => Some(FORCE_ACK),
            (SafetyLevel::Block, BlockPolicy::Refuse) => None,
        }
    }

    pub fn is_refused(&self) -> bool {
        self.required_acknowledgment().is_none()
    }

    /// Turns the decision into an executable command if `ack` is strong enough.
    pub fn approve(&self, ack: &Acknowledgment) -> Result<ApprovedCommand, Refusal> {
        let accepted = match self.verdict.level {
            SafetyLevel::Safe => {
                ack.as_str().eq_ignore_ascii_case(SAFE_ACK) || ack.as_str().eq_ignore_ascii_case(WARN_ACK)
            }
            SafetyLevel::Warn => ack.as_str().eq_ignore_ascii_case(WARN_ACK),
            SafetyLevel::Block => {
                if self.policy == BlockPolicy::Refuse {
                    let rule = self.verdict.matched_rule.clone().unwrap_or_default();
                    warn!("Refusing blocked command (rule '{}')", rule);
                    return Err(Refusal::Blocked { rule });
                }
                ack.as_str() == FORCE_ACK
            }
        };

        if !accepted {
            return Err(Refusal::NotConfirmed);
        }

        if self.verdict.level == SafetyLevel::Block {
            warn!(
                "Blocked command forced by user (rule '{}')",
                self.verdict.matched_rule.as_deref().unwrap_or("?")
            );
        } else {
            info!("Command confirmed at level {}", self.verdict.level);
        }

        Ok(ApprovedCommand {
            command: self.command.clone(),
            level: self.verdict.level,
        })
    }
}
