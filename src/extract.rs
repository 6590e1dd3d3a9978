//! Post-processing of model output into commands and explanations.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::chat::ChatMode;

static THINK_BLOCK_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\s*<think>(.*?)</think>").unwrap());

static CODE_BLOCK_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)```").unwrap());

const COMMAND_PREFIXES: &[&str] = &["命令:", "命令：", "bash:", "shell:", "Command:", "$ "];

const COMMAND_SECTION: &str = "【命令】";

/// Splits an inline `<think>…</think>` prefix off the content.
pub fn split_reasoning(content: &str) -> (String, Option<String>) {
    match THINK_BLOCK_REGEX.captures(content) {
        Some(caps) => {
            let reasoning = caps.get(1).map_or("", |m| m.as_str()).trim().to_string();
            let rest = content[caps.get(0).map_or(0, |m| m.end())..].trim().to_string();
            (rest, Some(reasoning).filter(|r| !r.is_empty()))
        }
        None => (content.trim().to_string(), None),
    }
}

/// Reduces a translate-mode answer to the bare command.
///
/// Code fences and leading labels are removed and runs of whitespace inside
/// each line are collapsed. Multi-line answers keep their line breaks.
pub fn clean_command(text: &str) -> Option<String> {
    let body = match CODE_BLOCK_REGEX.captures(text) {
        Some(caps) => caps.get(1).map_or("", |m| m.as_str()).to_string(),
        None => text.replace("```", ""),
    };

    let lines: Vec<String> = body
        .lines()
        .map(strip_prefix)
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

fn strip_prefix(line: &str) -> &str {
    let line = line.trim();
    COMMAND_PREFIXES
        .iter()
        .find_map(|p| line.strip_prefix(p))
        .map_or(line, str::trim)
}

/// Pulls the command out of a teaching answer.
///
/// The command is taken from the `【命令】` section when present, otherwise
/// from the first fenced block. The explanation is what follows the command
/// section, or the whole answer.
pub fn split_explained_command(text: &str) -> (Option<String>, String) {
    if let Some(start) = text.find(COMMAND_SECTION) {
        let after = &text[start + COMMAND_SECTION.len()..];
        let end = after.find('【').unwrap_or(after.len());
        let command = clean_command(&after[..end])
            .and_then(|c| c.lines().next().map(str::to_string));
        let explanation = after[end..].trim();
        let explanation = if explanation.is_empty() { text.trim() } else { explanation };
        return (command, explanation.to_string());
    }

    let command = CODE_BLOCK_REGEX
        .captures(text)
        .and_then(|caps| clean_command(caps.get(1).map_or("", |m| m.as_str())));
    (command, text.trim().to_string())
}

/// Fills the parsed fields of a result according to the request mode.
pub fn interpret(mode: ChatMode, text: &str) -> (Option<String>, Option<String>) {
    match mode {
        ChatMode::Translate => (clean_command(text), None),
        ChatMode::ExplainNl => {
            let (command, explanation) = split_explained_command(text);
            (command, Some(explanation))
        }
        ChatMode::ExplainCommand | ChatMode::DiagnoseFailure => (None, Some(text.trim().to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_command_strips_fences() {
        assert_eq!(clean_command("```bash\nls -la\n```").as_deref(), Some("ls -la"));
        assert_eq!(clean_command("```\ndf -h\n```").as_deref(), Some("df -h"));
    }

    #[test]
    fn test_clean_command_strips_prefixes_and_collapses_spaces() {
        assert_eq!(clean_command("$ ls    -la   /tmp").as_deref(), Some("ls -la /tmp"));
        assert_eq!(clean_command("命令: du -sh *").as_deref(), Some("du -sh *"));
        assert_eq!(clean_command("  bash:  pwd \n").as_deref(), Some("pwd"));
    }

    #[test]
    fn test_clean_command_keeps_line_breaks() {
        let cleaned = clean_command("```sh\nmkdir demo\ncd demo\n```").unwrap();
        assert_eq!(cleaned, "mkdir demo\ncd demo");
    }

    #[test]
    fn test_clean_command_empty_is_none() {
        assert!(clean_command("```\n\n```").is_none());
        assert!(clean_command("   ").is_none());
    }

    #[test]
    fn test_split_reasoning() {
        let (rest, reasoning) = split_reasoning("<think>user wants files</think>\nls -la");
        assert_eq!(rest, "ls -la");
        assert_eq!(reasoning.as_deref(), Some("user wants files"));

        let (rest, reasoning) = split_reasoning("ls -la");
        assert_eq!(rest, "ls -la");
        assert!(reasoning.is_none());
    }

    #[test]
    fn test_split_explained_command_uses_section() {
        let text = "【命令】\nfind . -name '*.log'\n【解释】\n按名称查找日志文件\n【示例】\n...";
        let (command, explanation) = split_explained_command(text);
        assert_eq!(command.as_deref(), Some("find . -name '*.log'"));
        assert!(explanation.starts_with("【解释】"));
        assert!(explanation.contains("按名称查找日志文件"));
    }

    #[test]
    fn test_split_explained_command_falls_back_to_code_block() {
        let text = "Use this:\n```bash\ngrep -rn TODO src\n```\nIt searches recursively.";
        let (command, explanation) = split_explained_command(text);
        assert_eq!(command.as_deref(), Some("grep -rn TODO src"));
        assert_eq!(explanation, text);
    }

    #[test]
    fn test_interpret_explain_command_has_no_command() {
        let (command, explanation) = interpret(ChatMode::ExplainCommand, " ls lists files ");
        assert!(command.is_none());
        assert_eq!(explanation.as_deref(), Some("ls lists files"));
    }
}
