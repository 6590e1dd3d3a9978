//! The interactive prompt and the one-shot query mode.

use anyhow::Result;
use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::Config;
use crate::confirm_ui::ConfirmationUi;
use crate::credentials::Credentials;
use crate::error::Error;
use crate::executor::{ExecutionLog, ExecutionOutcome, Executor};
use crate::orchestrator::{CommandOrchestrator, OrchestratorResult, ProcessMode};

const HISTORY_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitAction {
    On,
    Off,
    Status,
}

/// One line typed at the main prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Empty,
    Exit,
    Help,
    History,
    Clear,
    Config,
    /// `config <key> <value>`
    ConfigSet(String, String),
    /// `model` alone lists models; with a name it switches.
    Model(Option<String>),
    RateLimit(RateLimitAction),
    /// Request in prose, answered with a command and an explanation.
    Explain(String),
    Teach,
    Usage(&'static str),
    Query(String),
}

impl ReplCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let mut words = line.split_whitespace();
        let first = words.next().map(str::to_lowercase);

        match first.as_deref() {
            None => ReplCommand::Empty,
            Some("exit" | "quit" | "q") if words.clone().next().is_none() => ReplCommand::Exit,
            Some("help" | "h") if words.clone().next().is_none() => ReplCommand::Help,
            Some("history") if words.clone().next().is_none() => ReplCommand::History,
            Some("clear" | "cls") if words.clone().next().is_none() => ReplCommand::Clear,
            Some("config") => match (words.next(), words.next(), words.next()) {
                (None, _, _) => ReplCommand::Config,
                (Some(key), Some(value), None) => ReplCommand::ConfigSet(key.to_string(), value.to_string()),
                _ => ReplCommand::Usage("config [<key> <value>]"),
            },
            Some("model") => match (words.next(), words.next()) {
                (None, _) => ReplCommand::Model(None),
                (Some(name), None) => ReplCommand::Model(Some(name.to_string())),
                _ => ReplCommand::Usage("model [model_name]"),
            },
            Some("rate_limit" | "ratelimit") => match words.next().map(str::to_lowercase).as_deref() {
                Some("on") => ReplCommand::RateLimit(RateLimitAction::On),
                Some("off") => ReplCommand::RateLimit(RateLimitAction::Off),
                Some("status") | None => ReplCommand::RateLimit(RateLimitAction::Status),
                Some(_) => ReplCommand::Usage("rate_limit on|off|status"),
            },
            Some("explain") => {
                let rest = line["explain".len()..].trim();
                if rest.is_empty() {
                    ReplCommand::Usage("explain <what you want to do>")
                } else {
                    ReplCommand::Explain(rest.to_string())
                }
            }
            Some("teach") if words.clone().next().is_none() => ReplCommand::Teach,
            _ => ReplCommand::Query(line.to_string()),
        }
    }
}

/// One line typed inside teach mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeachCommand {
    Empty,
    Exit,
    Help,
    /// Request in prose.
    Explain(String),
    /// Anything else: explained as a command unless it reads as prose.
    Input(String),
}

impl TeachCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        match line.to_lowercase().as_str() {
            "" => TeachCommand::Empty,
            "exit" | "quit" | "q" => TeachCommand::Exit,
            "help" | "h" => TeachCommand::Help,
            "explain" => TeachCommand::Explain(String::new()),
            lower if lower.starts_with("explain ") => TeachCommand::Explain(line["explain ".len()..].trim().to_string()),
            _ => TeachCommand::Input(line.to_string()),
        }
    }
}

/// Runs the prompt loop on top of an orchestrator.
pub struct InteractiveShell {
    orchestrator: CommandOrchestrator,
    executor: Executor,
    ui: ConfirmationUi,
    config: Config,
    config_path: PathBuf,
    credentials: Credentials,
    history: VecDeque<String>,
}

impl InteractiveShell {
    pub fn new(
        orchestrator: CommandOrchestrator,
        config: Config,
        config_path: PathBuf,
        credentials: Credentials,
    ) -> Self {
        Self {
            orchestrator,
            executor: Self::executor_for(&config),
            ui: ConfirmationUi::new(config.quiet_mode),
            config,
            config_path,
            credentials,
            history: VecDeque::new(),
        }
    }

    fn executor_for(config: &Config) -> Executor {
        let executor = Executor::new(config.command_timeout(), !config.quiet_mode);
        match ExecutionLog::default_location() {
            Some(log) if config.command_log => executor.with_log(log),
            _ => executor,
        }
    }

    /// Translates a single request, confirms it and runs it.
    pub async fn run_once(&mut self, query: &str) -> Result<()> {
        self.handle_query(query).await
    }

    pub async fn run(&mut self) -> Result<()> {
        self.show_welcome();
        let stdin = io::stdin();

        loop {
            print!("[{}] > ", self.orchestrator.router().active_model());
            io::stdout().flush()?;

            let mut line = String::new();
            if stdin.lock().read_line(&mut line)? == 0 {
                println!();
                break;
            }

            let keep_going = match ReplCommand::parse(&line) {
                ReplCommand::Empty => true,
                ReplCommand::Exit => false,
                ReplCommand::Help => {
                    self.show_help();
                    true
                }
                ReplCommand::History => {
                    self.show_history();
                    true
                }
                ReplCommand::Clear => {
                    print!("\x1B[2J\x1B[1;1H");
                    true
                }
                ReplCommand::Config => {
                    self.show_config()?;
                    true
                }
                ReplCommand::ConfigSet(key, value) => {
                    self.handle_config_set(&key, &value);
                    true
                }
                ReplCommand::Model(name) => {
                    self.handle_model(name.as_deref());
                    true
                }
                ReplCommand::RateLimit(action) => {
                    self.handle_rate_limit(action);
                    true
                }
                ReplCommand::Explain(text) => {
                    self.handle_teach_input(&text, ProcessMode::TeachExplainNl).await?;
                    true
                }
                ReplCommand::Teach => {
                    self.run_teach_mode().await?;
                    true
                }
                ReplCommand::Usage(usage) => {
                    println!("Usage: {}", usage);
                    true
                }
                ReplCommand::Query(text) => {
                    self.handle_query(&text).await?;
                    true
                }
            };

            if !keep_going {
                break;
            }
        }

        println!("Bye!");
        Ok(())
    }

    async fn run_teach_mode(&mut self) -> Result<()> {
        self.show_teach_help();
        let stdin = io::stdin();

        loop {
            print!("[teach] > ");
            io::stdout().flush()?;

            let mut line = String::new();
            if stdin.lock().read_line(&mut line)? == 0 {
                println!();
                return Ok(());
            }

            match TeachCommand::parse(&line) {
                TeachCommand::Empty => {}
                TeachCommand::Exit => {
                    println!("Leaving teach mode.");
                    return Ok(());
                }
                TeachCommand::Help => self.show_teach_help(),
                TeachCommand::Explain(text) if text.is_empty() => {
                    println!("Usage: explain <what you want to do>");
                }
                TeachCommand::Explain(text) => self.handle_teach_input(&text, ProcessMode::TeachExplainNl).await?,
                TeachCommand::Input(text) => self.handle_teach_input(&text, ProcessMode::TeachExplainCmd).await?,
            }
        }
    }

    async fn handle_query(&mut self, query: &str) -> Result<()> {
        let result = self
            .orchestrator
            .process_with_cancel(query, ProcessMode::Shell, interrupted())
            .await;

        let decision = match result {
            Ok(OrchestratorResult::Command(decision)) => decision,
            Ok(OrchestratorResult::Explanation(explanation)) => {
                self.ui.show_explanation(&explanation);
                return Ok(());
            }
            Ok(OrchestratorResult::NoOp) => return Ok(()),
            Err(err) => {
                report(&err);
                return Ok(());
            }
        };

        let Some(approved) = self.ui.confirm(&decision)? else {
            return Ok(());
        };

        self.remember(approved.command());
        match self.executor.execute(&approved).await {
            Ok(outcome) if outcome.success => Ok(()),
            Ok(outcome) => {
                self.diagnose(approved.command(), &outcome).await;
                Ok(())
            }
            Err(err) => {
                println!("❌ {}", err);
                Ok(())
            }
        }
    }

    async fn handle_teach_input(&mut self, text: &str, mode: ProcessMode) -> Result<()> {
        match self.orchestrator.process_with_cancel(text, mode, interrupted()).await {
            Ok(OrchestratorResult::Explanation(explanation)) => self.ui.show_explanation(&explanation),
            Ok(OrchestratorResult::Command(decision)) => println!("{}", decision.command()),
            Ok(OrchestratorResult::NoOp) => {}
            Err(err) => report(&err),
        }
        Ok(())
    }

    async fn diagnose(&self, command: &str, outcome: &ExecutionOutcome) {
        match outcome.exit_code {
            Some(code) => println!("\n❌ Command failed with exit code {}", code),
            None => println!("\n❌ Command was terminated"),
        }
        println!("Asking the model for possible fixes...");

        let request = self
            .orchestrator
            .diagnose_failure(command, &outcome.stdout, &outcome.stderr, outcome.exit_code);
        let advice = tokio::select! {
            advice = request => advice,
            _ = interrupted() => Err(Error::Cancelled),
        };

        match advice {
            Ok(text) => println!("\n💡 {}\n", text),
            Err(err) => report(&err),
        }
    }

    fn handle_model(&mut self, name: Option<&str>) {
        let router = self.orchestrator.router();
        let Some(name) = name else {
            let active = router.active_model();
            println!("Current model: {}", active);
            println!("Available models:");
            for model in router.available_models() {
                let marker = if model == active { "*" } else { " " };
                println!("  {} {}", marker, model);
            }
            return;
        };

        match router.switch_model(name) {
            Ok(()) => {
                let profile = router.active_profile();
                println!("Switched to {}", profile.name);
                if !router.has_credential(&profile) {
                    let hint = Credentials::env_var_for(&profile.provider_id).unwrap_or("the config file");
                    println!("⚠️  No API key for provider '{}'; set {}", profile.provider_id, hint);
                }
                self.config.model = profile.name;
                if let Err(err) = self.config.save(Some(&self.config_path)) {
                    warn!("Could not save model selection: {}", err);
                }
            }
            Err(err) => report(&err),
        }
    }

    /// Updates one setting, applies it to the running session and saves it.
    fn handle_config_set(&mut self, key: &str, value: &str) {
        if key == "model" {
            self.handle_model(Some(value));
            return;
        }

        if let Err(err) = self.config.set(key, value) {
            report(&err);
            return;
        }

        match key {
            "temperature" | "top_p" => self.orchestrator.set_sampling(self.config.sampling()),
            "block_policy" => self.orchestrator.set_block_policy(self.config.block_policy),
            "rate_limit_enabled" => {
                self.orchestrator.router().set_rate_limit_enabled(self.config.rate_limit_enabled)
            }
            "quiet_mode" | "command_timeout_secs" | "command_log" => {
                self.executor = Self::executor_for(&self.config);
                self.ui = ConfirmationUi::new(self.config.quiet_mode);
            }
            _ => println!("ℹ️  {} takes effect in the next session", key),
        }

        match self.config.save(Some(&self.config_path)) {
            Ok(()) => println!("✅ {} set to {}", key, value),
            Err(err) => {
                warn!("Could not save config: {}", err);
                println!("⚠️  {} set for this session only; saving failed: {}", key, err);
            }
        }
    }

    fn handle_rate_limit(&self, action: RateLimitAction) {
        let router = self.orchestrator.router();
        match action {
            RateLimitAction::On => {
                router.set_rate_limit_enabled(true);
                println!("✅ Rate limiting enabled");
            }
            RateLimitAction::Off => {
                router.set_rate_limit_enabled(false);
                println!("✅ Rate limiting disabled");
            }
            RateLimitAction::Status => {
                let state = if router.rate_limit_enabled() { "on" } else { "off" };
                println!("📊 Rate limiting: {}", state);
                for usage in router.rate_limit_usage() {
                    println!("  {:<6} {}/{}", usage.window, usage.used, usage.limit);
                }
            }
        }
        info!("Rate limit command: {:?}", action);
    }

    fn remember(&mut self, command: &str) {
        if self.history.len() == HISTORY_SIZE {
            self.history.pop_front();
        }
        self.history.push_back(command.to_string());
    }

    fn show_history(&self) {
        if self.history.is_empty() {
            println!("No commands executed yet.");
            return;
        }
        for (i, command) in self.history.iter().enumerate() {
            println!("  {}. {}", i + 1, command);
        }
    }

    fn show_config(&self) -> Result<()> {
        let mut config = self.config.clone();
        config.model = self.orchestrator.router().active_model();
        config.rate_limit_enabled = self.orchestrator.router().rate_limit_enabled();
        config.show_config_with_io(
            &self.config_path,
            &self.credentials,
            &[crate::credentials::ECNU, crate::credentials::MODELSCOPE],
            &mut io::stdout(),
        )
    }

    fn show_welcome(&self) {
        println!("shellwise: describe what you want to do, get a shell command.");
        println!("Model: {}. Type 'help' for commands, 'exit' or Ctrl-D to quit.", self.orchestrator.router().active_model());
        if !self.config.quiet_mode {
            println!("Ctrl-C cancels a request that is in progress.");
        }
        println!();
    }

    fn show_help(&self) {
        println!("Type a request in plain language; the generated command is shown and");
        println!("only runs after you confirm it.");
        println!();
        println!("  help                     Show this help");
        println!("  exit | quit | q          Quit");
        println!("  history                  Commands executed in this session");
        println!("  clear | cls              Clear the screen");
        println!("  config                   Show the current configuration");
        println!("  config <key> <value>     Change and save one setting");
        println!("  model [name]             Show models or switch to another one");
        println!("  rate_limit on|off|status Control the local request limits");
        println!("  explain <request>        Get a command with a detailed explanation");
        println!("  teach                    Enter teach mode");
        println!();
        println!("Confirmation: 'y' for safe commands, 'yes' for commands with a warning,");
        println!("'FORCE' for commands flagged as dangerous (unless the block policy is 'refuse').");
    }

    fn show_teach_help(&self) {
        println!("{}", "=".repeat(50));
        println!("🎓 Teach mode");
        println!("{}", "=".repeat(50));
        println!("  explain <request>  Turn a request into a command and explain it");
        println!("  <command>          Explain a command's syntax, options and effect");
        println!("  help               Show this help");
        println!("  exit               Leave teach mode");
        println!("{}", "=".repeat(50));
    }
}

/// Completes when the user presses Ctrl-C.
async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn report(err: &Error) {
    match err {
        Error::Cancelled => println!("\n⏹  Cancelled"),
        Error::RateLimit { .. } => println!("⏳ {}. Use 'rate_limit off' to disable local limits.", err),
        Error::Config(_) => println!("⚙️  {}", err),
        _ => println!("❌ {}", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_builtin_commands() {
        assert_eq!(ReplCommand::parse("  "), ReplCommand::Empty);
        assert_eq!(ReplCommand::parse("exit"), ReplCommand::Exit);
        assert_eq!(ReplCommand::parse("Q"), ReplCommand::Exit);
        assert_eq!(ReplCommand::parse("help"), ReplCommand::Help);
        assert_eq!(ReplCommand::parse("config"), ReplCommand::Config);
        assert_eq!(ReplCommand::parse("teach"), ReplCommand::Teach);
        assert_eq!(ReplCommand::parse("history"), ReplCommand::History);
    }

    #[test]
    fn test_parse_clear_and_config_set() {
        assert_eq!(ReplCommand::parse("clear"), ReplCommand::Clear);
        assert_eq!(ReplCommand::parse("CLS"), ReplCommand::Clear);
        assert_eq!(
            ReplCommand::parse("config temperature 0.3"),
            ReplCommand::ConfigSet("temperature".into(), "0.3".into())
        );
        assert!(matches!(ReplCommand::parse("config temperature"), ReplCommand::Usage(_)));
        assert!(matches!(ReplCommand::parse("config a b c"), ReplCommand::Usage(_)));
        assert_eq!(ReplCommand::parse("clear the tmp folder"), ReplCommand::Query("clear the tmp folder".into()));
    }

    #[test]
    fn test_parse_model() {
        assert_eq!(ReplCommand::parse("model"), ReplCommand::Model(None));
        assert_eq!(
            ReplCommand::parse("model Qwen/Qwen3-32B"),
            ReplCommand::Model(Some("Qwen/Qwen3-32B".into()))
        );
        assert!(matches!(ReplCommand::parse("model a b"), ReplCommand::Usage(_)));
    }

    #[test]
    fn test_parse_rate_limit() {
        assert_eq!(ReplCommand::parse("rate_limit off"), ReplCommand::RateLimit(RateLimitAction::Off));
        assert_eq!(ReplCommand::parse("ratelimit ON"), ReplCommand::RateLimit(RateLimitAction::On));
        assert_eq!(ReplCommand::parse("rate_limit"), ReplCommand::RateLimit(RateLimitAction::Status));
        assert!(matches!(ReplCommand::parse("rate_limit maybe"), ReplCommand::Usage(_)));
    }

    #[test]
    fn test_parse_explain_keeps_original_text() {
        assert_eq!(
            ReplCommand::parse("explain 列出当前目录的文件"),
            ReplCommand::Explain("列出当前目录的文件".into())
        );
        assert!(matches!(ReplCommand::parse("explain"), ReplCommand::Usage(_)));
    }

    #[test]
    fn test_builtin_words_inside_requests_are_queries() {
        assert_eq!(
            ReplCommand::parse("exit code of the last command"),
            ReplCommand::Query("exit code of the last command".into())
        );
        assert_eq!(
            ReplCommand::parse("help me find big files"),
            ReplCommand::Query("help me find big files".into())
        );
        assert_eq!(ReplCommand::parse("show disk usage"), ReplCommand::Query("show disk usage".into()));
    }

    #[test]
    fn test_parse_teach_commands() {
        assert_eq!(TeachCommand::parse(""), TeachCommand::Empty);
        assert_eq!(TeachCommand::parse("EXIT"), TeachCommand::Exit);
        assert_eq!(TeachCommand::parse("explain 压缩目录"), TeachCommand::Explain("压缩目录".into()));
        assert_eq!(TeachCommand::parse("ls -la"), TeachCommand::Input("ls -la".into()));
    }
}
