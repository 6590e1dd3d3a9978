//! Guessing whether teach-mode input is a shell command or a request in prose.
//!
//! The guess is a weighted score over surface features of the text. It will
//! misclassify some inputs; callers treat an uncertain result as a reason to
//! ask the model rather than as an error.

use std::fmt;
use which::which;

/// Scores at or above this are treated as commands.
pub const COMMAND_THRESHOLD: f32 = 0.65;
/// Scores at or below this are treated as natural language.
pub const NATURAL_LANGUAGE_THRESHOLD: f32 = 0.35;

const BASE_SCORE: f32 = 0.3;

const KNOWN_COMMANDS: &[&str] = &[
    "apt", "awk", "cat", "cd", "chmod", "chown", "cp", "curl", "cut", "date", "dd", "df", "diff",
    "dig", "dnf", "docker", "du", "echo", "env", "export", "file", "find", "free", "git", "grep",
    "gzip", "head", "history", "hostname", "htop", "id", "ifconfig", "ip", "journalctl", "kill",
    "killall", "less", "ln", "ls", "lsblk", "lsof", "make", "man", "mkdir", "more", "mount", "mv",
    "nano", "netstat", "nohup", "npm", "ping", "pip", "ps", "pwd", "python", "python3", "rm",
    "rmdir", "rsync", "scp", "sed", "sort", "ss", "ssh", "stat", "sudo", "systemctl", "tail",
    "tar", "tee", "top", "touch", "tr", "uname", "uniq", "unzip", "uptime", "vi", "vim", "wc",
    "wget", "whereis", "which", "whoami", "xargs", "yum", "zip",
];

const NATURAL_LANGUAGE_WORDS: &[&str] = &[
    "how", "what", "where", "which", "why", "please", "can", "could", "would", "should", "i",
    "me", "my", "want", "need", "the", "all", "show", "list", "create", "delete", "files",
    "directory", "folder",
];

const NATURAL_LANGUAGE_MARKERS: &[&str] = &["我想", "请", "帮", "怎么", "如何", "查看", "显示", "吗"];

const SHELL_OPERATORS: &[&str] = &["|", ">", "<", "&&", "||", ";", "$(", "`", "*"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputShape {
    Command,
    NaturalLanguage,
    Ambiguous,
}

impl fmt::Display for InputShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InputShape::Command => "command",
            InputShape::NaturalLanguage => "natural language",
            InputShape::Ambiguous => "ambiguous",
        };
        f.write_str(name)
    }
}

/// Result of [`assess`]: a score in `[0, 1]` where 1 means "surely a command".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputAssessment {
    pub shape: InputShape,
    pub confidence: f32,
}

/// Scores `input` using the real `PATH` for unknown leading words.
pub fn assess(input: &str) -> InputAssessment {
    assess_with(input, |program| which(program).is_ok())
}

/// Scores `input`, asking `on_path` whether an unknown leading word is installed.
pub fn assess_with<F>(input: &str, on_path: F) -> InputAssessment
where
    F: Fn(&str) -> bool,
{
    let text = input.trim();
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let Some(first) = tokens.first() else {
        return InputAssessment {
            shape: InputShape::Ambiguous,
            confidence: 0.5,
        };
    };

    let mut score = BASE_SCORE;

    let has_shell_syntax = SHELL_OPERATORS.iter().any(|op| text.contains(op));
    let has_flags = tokens.iter().skip(1).any(|t| t.starts_with('-') && t.len() > 1);
    let has_paths = tokens
        .iter()
        .skip(1)
        .any(|t| t.starts_with('/') || t.starts_with("./") || t.starts_with("~/") || t.contains('.'));

    if KNOWN_COMMANDS.contains(first) {
        score += 0.5;
    } else if first.chars().all(|c| c.is_ascii_alphanumeric() || "-_.".contains(c)) && on_path(first) {
        score += 0.35;
    }
    if has_flags {
        score += 0.2;
    }
    if has_shell_syntax {
        score += 0.2;
    }
    if has_paths {
        score += 0.1;
    }
    if tokens.len() == 1 {
        score += 0.1;
    }

    if text.chars().any(is_cjk) {
        score -= 0.6;
    }
    if NATURAL_LANGUAGE_MARKERS.iter().any(|m| text.contains(m)) {
        score -= 0.2;
    }

    let prose_words = tokens
        .iter()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| NATURAL_LANGUAGE_WORDS.contains(&w.as_str()))
        .count();
    if prose_words > 0 {
        score -= (0.15 * prose_words as f32).min(0.45);
    }
    if text.ends_with('?') || text.ends_with('？') {
        score -= 0.3;
    }
    if !has_flags && !has_shell_syntax && !has_paths && tokens.len() > 2 && text.len() > 10 {
        score -= 0.15;
    }

    let confidence = score.clamp(0.0, 1.0);
    let shape = if confidence >= COMMAND_THRESHOLD {
        InputShape::Command
    } else if confidence <= NATURAL_LANGUAGE_THRESHOLD {
        InputShape::NaturalLanguage
    } else {
        InputShape::Ambiguous
    };

    InputAssessment { shape, confidence }
}

fn is_cjk(c: char) -> bool {
    matches!(c, '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}' | '\u{3000}'..='\u{303F}' | '\u{FF00}'..='\u{FFEF}')
}
