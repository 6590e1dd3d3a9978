//! Terminal prompts for confirming generated commands.
//!
//! Every prompt has a `_with_io` variant taking explicit reader/writer
//! streams; the plain variants use stdin/stdout.

use anyhow::Result;
use std::io::{self, BufRead, Write};
use tracing::info;

use crate::decision::{Acknowledgment, ApprovedCommand, CommandDecision, Refusal};
use crate::orchestrator::Explanation;
use crate::safety::SafetyLevel;

/// Shows a generated command with its safety verdict and asks for the
/// acknowledgment that verdict requires.
///
/// # Example
///
/// ```no_run
/// use shellwise::confirm_ui::ConfirmationUi;
/// use shellwise::decision::{BlockPolicy, CommandDecision};
/// use shellwise::safety::SafetyGate;
///
/// let decision = CommandDecision::new(&SafetyGate::new(), "ls -la", None, BlockPolicy::Force);
///
/// let ui = ConfirmationUi::new(false);
/// if let Some(approved) = ui.confirm(&decision)? {
///     println!("running {}", approved.command());
/// }
/// # Ok::<(), anyhow::Error>(())
/// ```
pub struct ConfirmationUi {
    quiet: bool,
}

impl ConfirmationUi {
    /// Creates a new `ConfirmationUi`.
    ///
    /// # Arguments
    ///
    /// * `quiet` - If true, safe commands are shown without the verdict banner
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }

    // =========================================================================
    // Core methods with I/O injection (testable)
    // =========================================================================

    /// Asks the user to confirm `decision` using custom I/O streams.
    ///
    /// # Returns
    ///
    /// The approved command, or `None` when the user declined or the block
    /// policy refuses the command outright. End of input counts as declining.
    ///
    /// # Errors
    ///
    /// Returns an error if I/O operations fail.
    pub fn confirm_with_io<R: BufRead, W: Write>(
        &self,
        decision: &CommandDecision,
        input: &mut R,
        output: &mut W,
    ) -> Result<Option<ApprovedCommand>> {
        self.display_decision_with_io(decision, output)?;

        let Some(required) = decision.required_acknowledgment() else {
            writeln!(output, "⛔ This command is blocked and will not be executed.")?;
            return Ok(None);
        };

        match decision.level() {
            SafetyLevel::Safe => write!(output, "Execute? [{}/N]: ", required)?,
            SafetyLevel::Warn => write!(output, "Type '{}' to execute, anything else to cancel: ", required)?,
            SafetyLevel::Block => write!(output, "Type '{}' to execute anyway, anything else to cancel: ", required)?,
        }
        output.flush()?;

        let mut line = String::new();
        input.read_line(&mut line)?;

        match decision.approve(&Acknowledgment::new(line)) {
            Ok(approved) => Ok(Some(approved)),
            Err(Refusal::NotConfirmed) => {
                info!("User declined command at level {}", decision.level());
                writeln!(output, "Cancelled.")?;
                Ok(None)
            }
            Err(refusal @ Refusal::Blocked { .. }) => {
                writeln!(output, "⛔ {}", refusal)?;
                Ok(None)
            }
        }
    }

    fn display_decision_with_io<W: Write>(&self, decision: &CommandDecision, output: &mut W) -> Result<()> {
        writeln!(output)?;
        writeln!(output, "📋 Command: {}", decision.command())?;

        match decision.level() {
            SafetyLevel::Safe => {
                if !self.quiet {
                    writeln!(output, "✅ No destructive pattern recognised")?;
                }
            }
            SafetyLevel::Warn => {
                writeln!(output, "{}", "-".repeat(60))?;
                writeln!(output, "⚠️  WARNING: {}", decision.verdict().human_reason)?;
                writeln!(output, "{}", "-".repeat(60))?;
            }
            SafetyLevel::Block => {
                writeln!(output, "{}", "=".repeat(60))?;
                writeln!(output, "🛑 DANGEROUS: {}", decision.verdict().human_reason)?;
                if let Some(rule) = &decision.verdict().matched_rule {
                    writeln!(output, "   Rule: {}", rule)?;
                }
                writeln!(output, "{}", "=".repeat(60))?;
            }
        }

        if let Some(explanation) = decision.explanation() {
            writeln!(output, "📝 {}", explanation)?;
        }
        Ok(())
    }

    /// Writes a teaching answer, including a suggested command if there is one.
    pub fn show_explanation_with_io<W: Write>(&self, explanation: &Explanation, output: &mut W) -> Result<()> {
        if let Some(reasoning) = &explanation.reasoning {
            if !self.quiet {
                writeln!(output, "💭 {}", reasoning)?;
                writeln!(output)?;
            }
        }
        writeln!(output, "{}", explanation.text)?;

        if let Some(command) = &explanation.command {
            if command.level() != SafetyLevel::Safe {
                writeln!(output)?;
                writeln!(
                    output,
                    "⚠️  Note: '{}' is classified as {} ({})",
                    command.command(),
                    command.level(),
                    command.verdict().human_reason
                )?;
            }
        }
        Ok(())
    }

    // =========================================================================
    // Convenience methods using standard I/O
    // =========================================================================

    /// Asks for confirmation on stdin/stdout.
    ///
    /// This is a convenience wrapper around [`Self::confirm_with_io`].
    pub fn confirm(&self, decision: &CommandDecision) -> Result<Option<ApprovedCommand>> {
        let stdin = io::stdin();
        let mut input = stdin.lock();
        let mut output = io::stdout();
        self.confirm_with_io(decision, &mut input, &mut output)
    }

    /// Writes a teaching answer to stdout.
    pub fn show_explanation(&self, explanation: &Explanation) {
        let mut output = io::stdout();
        let _ = self.show_explanation_with_io(explanation, &mut output);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::BlockPolicy;
    use crate::safety::SafetyGate;
    use std::io::Cursor;

    fn decision(command: &str, policy: BlockPolicy) -> CommandDecision {
        CommandDecision::new(&SafetyGate::new(), command, None, policy)
    }

    fn run(ui: &ConfirmationUi, decision: &CommandDecision, typed: &str) -> (Option<ApprovedCommand>, String) {
        let mut input = Cursor::new(typed.as_bytes().to_vec());
        let mut output = Vec::new();
        let approved = ui.confirm_with_io(decision, &mut input, &mut output).unwrap();
        (approved, String::from_utf8(output).unwrap())
    }

    #[test]
    fn test_safe_command_confirmed_with_y() {
        let ui = ConfirmationUi::new(false);
        let (approved, output) = run(&ui, &decision("ls -la", BlockPolicy::Force), "y\n");

        assert_eq!(approved.unwrap().command(), "ls -la");
        assert!(output.contains("ls -la"));
        assert!(output.contains("[y/N]"));
    }

    #[test]
    fn test_safe_command_declined_by_default() {
        let ui = ConfirmationUi::new(false);
        let (approved, output) = run(&ui, &decision("ls -la", BlockPolicy::Force), "\n");

        assert!(approved.is_none());
        assert!(output.contains("Cancelled"));
    }

    #[test]
    fn test_end_of_input_declines() {
        let ui = ConfirmationUi::new(true);
        let (approved, _) = run(&ui, &decision("pwd", BlockPolicy::Force), "");
        assert!(approved.is_none());
    }

    #[test]
    fn test_warn_command_shows_reason_and_needs_yes() {
        let ui = ConfirmationUi::new(false);
        let d = decision("sudo reboot", BlockPolicy::Force);

        let (approved, output) = run(&ui, &d, "y\n");
        assert!(approved.is_none());
        assert!(output.contains("WARNING"));
        assert!(output.contains("restarts the machine"));
        assert!(output.contains("'yes'"));

        let (approved, _) = run(&ui, &d, "yes\n");
        assert!(approved.is_some());
    }

    #[test]
    fn test_blocked_command_needs_force() {
        let ui = ConfirmationUi::new(false);
        let d = decision("dd if=/dev/zero of=/dev/sda", BlockPolicy::Force);

        let (approved, output) = run(&ui, &d, "yes\n");
        assert!(approved.is_none());
        assert!(output.contains("DANGEROUS"));
        assert!(output.contains("dd-to-device"));
        assert!(output.contains("'FORCE'"));

        let (approved, _) = run(&ui, &d, "FORCE\n");
        assert_eq!(approved.unwrap().level(), SafetyLevel::Block);
    }

    #[test]
    fn test_refused_command_does_not_read_input() {
        let ui = ConfirmationUi::new(false);
        let d = decision("rm -rf /", BlockPolicy::Refuse);

        let mut input = Cursor::new(b"FORCE\n".to_vec());
        let mut output = Vec::new();
        let approved = ui.confirm_with_io(&d, &mut input, &mut output).unwrap();

        assert!(approved.is_none());
        assert_eq!(input.position(), 0);
        assert!(String::from_utf8(output).unwrap().contains("will not be executed"));
    }

    #[test]
    fn test_quiet_mode_hides_safe_banner() {
        let (_, loud) = run(&ConfirmationUi::new(false), &decision("ls", BlockPolicy::Force), "n\n");
        let (_, quiet) = run(&ConfirmationUi::new(true), &decision("ls", BlockPolicy::Force), "n\n");
        assert!(loud.contains("No destructive pattern"));
        assert!(!quiet.contains("No destructive pattern"));
    }

    #[test]
    fn test_show_explanation_flags_risky_suggestion() {
        let ui = ConfirmationUi::new(false);
        let explanation = Explanation {
            text: "【解释】递归修改权限".into(),
            command: Some(decision("chmod -R 777 /", BlockPolicy::Force)),
            reasoning: Some("user asked about permissions".into()),
        };
        let mut output = Vec::new();
        ui.show_explanation_with_io(&explanation, &mut output).unwrap();

        let output = String::from_utf8(output).unwrap();
        assert!(output.contains("递归修改权限"));
        assert!(output.contains("user asked about permissions"));
        assert!(output.contains("classified as block"));
    }
}
