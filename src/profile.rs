//! Supported models and the provider family each one speaks.

use std::fmt;

/// Wire-shape family; selects the adapter used for a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderFamily {
    Ecnu,
    Zhipu,
    Qwen,
    MiniMax,
}

impl fmt::Display for ProviderFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderFamily::Ecnu => "ecnu",
            ProviderFamily::Zhipu => "zhipu",
            ProviderFamily::Qwen => "qwen",
            ProviderFamily::MiniMax => "minimax",
        };
        f.write_str(name)
    }
}

pub const ECNU_BASE_URL: &str = "https://chat.ecnu.edu.cn/open/api/v1";
pub const MODELSCOPE_BASE_URL: &str = "https://api-inference.modelscope.cn/v1";
pub const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";
pub const DEFAULT_MODEL: &str = "GLM-4.6";

/// Static description of one selectable model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    /// Short name typed by the user, e.g. `GLM-4.6`.
    pub name: String,
    /// Credential key, shared by every model served from the same vendor.
    pub provider_id: String,
    pub family: ProviderFamily,
    pub base_url: String,
    /// Identifier sent on the wire, e.g. `ZhipuAI/GLM-4.6`.
    pub model_id: String,
    pub requires_extra_body: bool,
    pub supports_thinking: bool,
}

impl ProviderProfile {
    fn builtin(
        name: &str,
        provider_id: &str,
        family: ProviderFamily,
        base_url: &str,
        model_id: &str,
        requires_extra_body: bool,
        supports_thinking: bool,
    ) -> Self {
        Self {
            name: name.to_string(),
            provider_id: provider_id.to_string(),
            family,
            base_url: base_url.to_string(),
            model_id: model_id.to_string(),
            requires_extra_body,
            supports_thinking,
        }
    }

    pub fn endpoint_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), CHAT_COMPLETIONS_PATH)
    }
}

/// The fixed, read-only set of profiles known to the process.
#[derive(Debug, Clone)]
pub struct ProfileCatalog {
    profiles: Vec<ProviderProfile>,
}

impl ProfileCatalog {
    pub fn builtin() -> Self {
        use ProviderFamily::*;
        use crate::credentials::{ECNU, MODELSCOPE};

        Self::from_profiles(vec![
            ProviderProfile::builtin("ecnu-plus", ECNU, Ecnu, ECNU_BASE_URL, "ecnu-plus", false, false),
            ProviderProfile::builtin("ecnu-max", ECNU, Ecnu, ECNU_BASE_URL, "ecnu-max", false, false),
            ProviderProfile::builtin("ChatECNU", ECNU, Ecnu, ECNU_BASE_URL, "ChatECNU", false, false),
            ProviderProfile::builtin("GLM-4.6", MODELSCOPE, Zhipu, MODELSCOPE_BASE_URL, "ZhipuAI/GLM-4.6", false, true),
            ProviderProfile::builtin("Qwen/Qwen3-32B", MODELSCOPE, Qwen, MODELSCOPE_BASE_URL, "Qwen/Qwen3-32B", true, true),
            ProviderProfile::builtin("minimax", MODELSCOPE, MiniMax, MODELSCOPE_BASE_URL, "MiniMax/MiniMax-M1-80k", false, true),
            ProviderProfile::builtin("minimax-m2", MODELSCOPE, MiniMax, MODELSCOPE_BASE_URL, "MiniMax/MiniMax-M2", false, true),
        ])
    }

    pub fn from_profiles(profiles: Vec<ProviderProfile>) -> Self {
        Self { profiles }
    }

    /// Looks a model up by exact name, falling back to a case-insensitive match.
    pub fn get(&self, name: &str) -> Option<&ProviderProfile> {
        self.profiles
            .iter()
            .find(|p| p.name == name)
            .or_else(|| self.profiles.iter().find(|p| p.name.eq_ignore_ascii_case(name)))
    }

    pub fn names(&self) -> Vec<&str> {
        self.profiles.iter().map(|p| p.name.as_str()).collect()
    }
}

impl Default for ProfileCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
