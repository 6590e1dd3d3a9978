//! Destructive-command detection.
//!
//! This is best-effort pattern matching over the command text, not a
//! sandbox and not a security boundary. There is no shell parsing: quoting,
//! variables, aliases and scripts fetched at run time all go unseen. It only
//! catches the obvious destructive shapes before they reach a shell.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyLevel {
    Safe,
    Warn,
    Block,
}

impl fmt::Display for SafetyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SafetyLevel::Safe => "safe",
            SafetyLevel::Warn => "warn",
            SafetyLevel::Block => "block",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetyVerdict {
    pub level: SafetyLevel,
    pub matched_rule: Option<String>,
    pub human_reason: String,
}

impl SafetyVerdict {
    pub fn safe() -> Self {
        Self {
            level: SafetyLevel::Safe,
            matched_rule: None,
            human_reason: "no destructive pattern recognised".to_string(),
        }
    }
}

/// One entry of the ordered rule table.
#[derive(Debug, Clone)]
pub struct SafetyRule {
    pub name: String,
    pub level: SafetyLevel,
    pub reason: String,
    pattern: Regex,
}

impl SafetyRule {
    pub fn new(name: &str, level: SafetyLevel, pattern: &str, reason: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.to_string(),
            level,
            reason: reason.to_string(),
            pattern: Regex::new(pattern)?,
        })
    }

    pub fn matches(&self, command: &str) -> bool {
        self.pattern.is_match(command)
    }
}

// Root-level and system directories, used as rm/chmod targets.
const SYSTEM_DIRS: &str = r"(?:bin|boot|dev|etc|lib|lib32|lib64|opt|proc|root|sbin|srv|sys|usr|var|home)";
// End of a shell word.
const WORD_END: &str = r"(?:[\s;&|)]|$)";

/// Built-in rules, most specific first.
static DEFAULT_RULES: Lazy<Vec<SafetyRule>> = Lazy::new(|| {
    use SafetyLevel::*;

    let rm_recursive = r"\brm\s+(?:-\S+\s+)*(?:-[a-zA-Z]*[rR][a-zA-Z]*|--recursive)\s+(?:-\S+\s+)*";
    let table: Vec<(&str, SafetyLevel, String, &str)> = vec![
        (
            "fork-bomb",
            Block,
            r":\s*\(\s*\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:".to_string(),
            "fork bomb exhausts the process table",
        ),
        (
            "rm-root",
            Block,
            format!(r#"{}["']?(?:/\*?|~/?\*?|\$HOME/?\*?)["']?{}"#, rm_recursive, WORD_END),
            "recursive delete of the root or home directory",
        ),
        (
            "rm-system-dir",
            Block,
            format!(r"{}/{}/?\*?{}", rm_recursive, SYSTEM_DIRS, WORD_END),
            "recursive delete of a system directory",
        ),
        (
            "mkfs",
            Block,
            r"(?:^\s*|[;&|(]\s*|\bsudo\s+)mkfs(?:\.\w+)?\b".to_string(),
            "creating a filesystem wipes the target device",
        ),
        (
            "dd-to-device",
            Block,
            r"\bdd\b.*\bof=/dev/(?:sd|hd|vd|xvd|nvme|mmcblk|disk)".to_string(),
            "raw write to a disk device",
        ),
        (
            "wipe-device",
            Block,
            r"\b(?:shred|wipefs|blkdiscard)\b.*/dev/".to_string(),
            "disk wiping utility aimed at a device",
        ),
        (
            "redirect-to-device",
            Block,
            r"(?:^|[^>])>\s*/dev/(?:sd|hd|vd|xvd|nvme|mmcblk|disk)".to_string(),
            "output redirected onto a disk device",
        ),
        (
            "truncate-critical-file",
            Block,
            r"(?:^|[^>])>\s*/etc/(?:passwd|shadow|group|gshadow|sudoers|fstab|hosts)\b".to_string(),
            "truncates a file the system needs to boot or log in",
        ),
        (
            "chmod-system-dir",
            Block,
            {
                let args = r"(?:[^;&|\n]*\s)?";
                let flag = r"(?:-[a-zA-Z]*R[a-zA-Z]*|--recursive)";
                let target = format!(r"/(?:{}/?)?", SYSTEM_DIRS);
                format!(
                    r"\bch(?:mod|own|grp)\s+{args}(?:{flag}\s+{args}{target}{end}|{target}\s+{args}{flag}{end})",
                    args = args,
                    flag = flag,
                    target = target,
                    end = WORD_END
                )
            },
            "recursive permission or owner change on a system directory",
        ),
        (
            "redirect-into-etc",
            Warn,
            r"(?:^|[^>])>\s*/etc/".to_string(),
            "overwrites a system configuration file",
        ),
        (
            "chmod-777",
            Warn,
            r"\bchmod\s+(?:-\S+\s+)*0?777\b".to_string(),
            "world-writable permissions",
        ),
        (
            "rm-recursive-force",
            Warn,
            r"\brm\s+(?:-\S+\s+)*-[a-zA-Z]*(?:r[a-zA-Z]*f|f[a-zA-Z]*r)".to_string(),
            "recursive forced delete",
        ),
        (
            "rm-after-failure",
            Warn,
            r"\|\|\s*(?:sudo\s+)?rm\b".to_string(),
            "deletes files when the previous command fails",
        ),
        (
            "dd-write",
            Warn,
            r"\bdd\b.*\bof=".to_string(),
            "dd overwrites its output target",
        ),
        (
            "pipe-to-shell",
            Warn,
            r"\b(?:curl|wget)\b[^|]*\|\s*(?:sudo\s+)?(?:ba|z|da)?sh\b".to_string(),
            "runs a script downloaded from the network",
        ),
        (
            "power-state",
            Warn,
            r"\b(?:shutdown|reboot|poweroff|halt)\b|\binit\s+[06]\b".to_string(),
            "shuts down or restarts the machine",
        ),
    ];

    table
        .into_iter()
        .map(|(name, level, pattern, reason)| {
            SafetyRule::new(name, level, &pattern, reason).unwrap()
        })
        .collect()
});

/// Classifies commands against an ordered rule table; the first match wins.
#[derive(Debug, Clone)]
pub struct SafetyGate {
    rules: Vec<SafetyRule>,
}

impl SafetyGate {
    pub fn new() -> Self {
        Self::with_rules(DEFAULT_RULES.clone())
    }

    pub fn with_rules(rules: Vec<SafetyRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[SafetyRule] {
        &self.rules
    }

    pub fn classify(&self, command: &str) -> SafetyVerdict {
        match self.rules.iter().find(|rule| rule.matches(command)) {
            Some(rule) => {
                debug!("Command matched safety rule '{}' ({})", rule.name, rule.level);
                SafetyVerdict {
                    level: rule.level,
                    matched_rule: Some(rule.name.clone()),
                    human_reason: rule.reason.clone(),
                }
            }
            None => SafetyVerdict::safe(),
        }
    }
}

impl Default for SafetyGate {
    fn default() -> Self {
        Self::new()
    }
}
