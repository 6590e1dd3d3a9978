use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::process::Command;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use shellwise::http_client::HttpResponse;
use shellwise::prelude::*;
use shellwise::rate_limiter::{RateLimitSettings, Window};
use shellwise::router::RouterSettings;

/// Helper to run the shellwise binary and capture output
fn run_shellwise(args: &[&str]) -> Result<std::process::Output> {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_shellwise"));
    cmd.args(args);
    cmd.env("RUST_LOG", "error");
    cmd.env_remove("ECNU_API_KEY");
    cmd.env_remove("MODEL_SCOPE_API");
    Ok(cmd.output()?)
}

/// Replays canned chat-completion replies and records request bodies.
#[derive(Default)]
struct CannedProvider {
    replies: Mutex<VecDeque<(u16, String)>>,
    bodies: Mutex<Vec<(String, Value)>>,
}

impl CannedProvider {
    fn with_replies(contents: &[&str]) -> Arc<Self> {
        let provider = Self::default();
        for content in contents {
            let body = json!({
                "choices": [{ "message": { "role": "assistant", "content": content } }],
                "usage": { "prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15 }
            });
            provider.replies.lock().unwrap().push_back((200, body.to_string()));
        }
        Arc::new(provider)
    }

    fn bodies(&self) -> Vec<(String, Value)> {
        self.bodies.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for CannedProvider {
    async fn post_json(
        &self,
        url: &str,
        _headers: &[(String, String)],
        body: &Value,
        _timeout: Duration,
    ) -> shellwise::error::Result<HttpResponse> {
        self.bodies.lock().unwrap().push((url.to_string(), body.clone()));
        let (status, body) = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or((503, "no reply".to_string()));
        Ok(HttpResponse { status, body })
    }
}

fn orchestrator(http: Arc<CannedProvider>, model: &str, rpm: usize, policy: BlockPolicy) -> CommandOrchestrator {
    let credentials = Credentials::new()
        .with_token("ecnu", "ecnu-test-token")
        .with_token("modelscope", "ms-test-token");
    let router = ModelRouter::new(
        ProfileCatalog::builtin(),
        credentials,
        RouterSettings {
            initial_model: model.to_string(),
            request_timeout: Duration::from_secs(5),
            rate_limit: RateLimitSettings {
                rpm,
                ..RateLimitSettings::default()
            },
        },
        http,
    )
    .unwrap();
    CommandOrchestrator::new(router, SafetyGate::new(), SamplingDefaults::default(), policy)
}

#[tokio::test]
async fn test_translate_confirm_flow() -> Result<()> {
    let http = CannedProvider::with_replies(&["```bash\nfind . -name '*.log' -size +10M\n```"]);
    let orch = orchestrator(http.clone(), "ecnu-plus", 10, BlockPolicy::Force);

    let result = orch.process("find log files larger than 10MB", ProcessMode::Shell).await?;
    let OrchestratorResult::Command(decision) = result else {
        panic!("expected a command");
    };

    assert_eq!(decision.command(), "find . -name '*.log' -size +10M");
    assert_eq!(decision.level(), SafetyLevel::Safe);
    assert!(decision.approve(&Acknowledgment::new("n")).is_err());
    assert_eq!(decision.approve(&Acknowledgment::new("y"))?.command(), decision.command());

    let bodies = http.bodies();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0].0, "https://chat.ecnu.edu.cn/open/api/v1/chat/completions");
    assert_eq!(bodies[0].1["model"], "ecnu-plus");
    assert_eq!(bodies[0].1["stream"], false);
    Ok(())
}

#[tokio::test]
async fn test_blocked_command_cannot_be_approved_under_refuse_policy() -> Result<()> {
    let http = CannedProvider::with_replies(&[":(){ :|:& };:"]);
    let orch = orchestrator(http, "GLM-4.6", 10, BlockPolicy::Refuse);

    let OrchestratorResult::Command(decision) = orch.process("stress test my machine", ProcessMode::Shell).await?
    else {
        panic!("expected a command");
    };

    assert_eq!(decision.level(), SafetyLevel::Block);
    assert!(decision.approve(&Acknowledgment::new("FORCE")).is_err());
    Ok(())
}

#[tokio::test]
async fn test_qwen_requests_carry_thinking_switch() -> Result<()> {
    let http = CannedProvider::with_replies(&["<think>the user wants the kernel version</think>uname -r"]);
    let orch = orchestrator(http.clone(), "ecnu-max", 10, BlockPolicy::Force);

    orch.router().switch_model("qwen/qwen3-32b")?;
    let OrchestratorResult::Command(decision) = orch.process("kernel version", ProcessMode::Shell).await? else {
        panic!("expected a command");
    };

    assert_eq!(decision.command(), "uname -r");
    let body = &http.bodies()[0].1;
    assert_eq!(body["model"], "Qwen/Qwen3-32B");
    assert_eq!(body["enable_thinking"], false);
    Ok(())
}

#[tokio::test]
async fn test_minute_ceiling_is_enforced_across_modes() -> Result<()> {
    let http = CannedProvider::with_replies(&["ls", "【命令】\nls\n【解释】\n列出文件"]);
    let orch = orchestrator(http.clone(), "GLM-4.6", 2, BlockPolicy::Force);

    orch.process("list files", ProcessMode::Shell).await?;
    orch.process("ls", ProcessMode::TeachExplainCmd).await?;

    match orch.process("list files again", ProcessMode::Shell).await {
        Err(Error::RateLimit { window, retry_after }) => {
            assert_eq!(window, Window::Minute);
            assert!(retry_after <= Duration::from_secs(60));
        }
        other => panic!("expected a rate limit error, got {:?}", other.map(|_| ())),
    }
    assert_eq!(http.bodies().len(), 2);

    // Blank input never touches the limiter or the network.
    assert_eq!(orch.process("   ", ProcessMode::Shell).await?, OrchestratorResult::NoOp);

    orch.router().set_rate_limit_enabled(false);
    assert!(orch.process("ls", ProcessMode::TeachExplainCmd).await.is_err()); // provider has no replies left
    assert_eq!(http.bodies().len(), 3);
    Ok(())
}

#[test]
fn test_list_models_runs_offline() -> Result<()> {
    let output = run_shellwise(&["--list-models"])?;
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    for name in ["ecnu-plus", "GLM-4.6", "Qwen/Qwen3-32B", "minimax-m2"] {
        assert!(stdout.contains(name), "missing {name} in:\n{stdout}");
    }
    assert!(stdout.contains("ZhipuAI/GLM-4.6"));
    Ok(())
}

#[test]
fn test_show_config_uses_given_file_and_hides_keys() -> Result<()> {
    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"model": "ecnu-max", "api_keys": {"ECNU_API_KEY": "super-secret"}}"#)?;

    let output = run_shellwise(&["-c", path.to_str().unwrap(), "--show-config"])?;
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Model: ecnu-max"));
    assert!(stdout.contains("API key [ecnu] (ECNU_API_KEY): Set"));
    assert!(!stdout.contains("super-secret"));
    Ok(())
}

#[test]
fn test_timeout_flag_sets_command_timeout() -> Result<()> {
    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join("config.json");

    let output = run_shellwise(&["-c", path.to_str().unwrap(), "-t", "7", "--show-config"])?;
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Command timeout: 7s"));
    assert!(stdout.contains("Request timeout: 30s"));
    Ok(())
}

#[test]
fn test_unknown_model_flag_fails() -> Result<()> {
    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join("missing.json");

    let output = run_shellwise(&["-c", path.to_str().unwrap(), "-m", "gpt-9", "-k", "x", "list files"])?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown model"));
    Ok(())
}
