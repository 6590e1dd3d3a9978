//! Per-provider API tokens.
//!
//! Tokens come from a command-line flag, the environment or the config file,
//! in that order of precedence. They are resolved once at startup and never
//! printed: the `Debug` output only lists which providers have a token.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::error::{Error, Result};

pub const ECNU: &str = "ecnu";
pub const MODELSCOPE: &str = "modelscope";
/// Group id sent alongside MiniMax requests, not a bearer token.
pub const MINIMAX_GROUP: &str = "minimax-group";

const ENV_VARS: &[(&str, &str)] = &[
    (ECNU, "ECNU_API_KEY"),
    (MODELSCOPE, "MODEL_SCOPE_API"),
    (MINIMAX_GROUP, "MINIMAX_GROUP_ID"),
];

#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    tokens: BTreeMap<String, String>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, provider_id: &str, token: &str) -> Self {
        self.insert(provider_id, token);
        self
    }

    fn insert(&mut self, provider_id: &str, token: &str) {
        let token = token.trim();
        if !token.is_empty() {
            self.tokens.insert(provider_id.to_string(), token.to_string());
        }
    }

    /// Resolves tokens with precedence flag > environment > file.
    ///
    /// File entries may be keyed either by provider id (`modelscope`) or by
    /// the environment variable name (`MODEL_SCOPE_API`).
    pub fn resolve<F>(flag: Option<(&str, &str)>, env: F, file: &HashMap<String, String>) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut creds = Self::new();

        // Provider-id keys first, so an env-var-named key in the same file wins.
        for (key, token) in file.iter().filter(|(key, _)| Self::id_for_env_var(key).is_none()) {
            creds.insert(key, token);
        }
        for (id, var) in ENV_VARS {
            if let Some(token) = file.get(*var) {
                creds.insert(id, token);
            }
        }

        for (id, var) in ENV_VARS {
            if let Some(token) = env(var) {
                creds.insert(id, &token);
            }
        }

        if let Some((id, token)) = flag {
            creds.insert(id, token);
        }

        creds
    }

    fn id_for_env_var(var: &str) -> Option<&'static str> {
        ENV_VARS.iter().find(|(_, name)| *name == var).map(|(id, _)| *id)
    }

    /// Resolves against the real process environment.
    pub fn from_env(flag: Option<(&str, &str)>, file: &HashMap<String, String>) -> Self {
        Self::resolve(flag, |var| std::env::var(var).ok(), file)
    }

    pub fn get(&self, provider_id: &str) -> Option<&str> {
        self.tokens.get(provider_id).map(String::as_str)
    }

    /// Returns the token or a configuration error telling the user where to set it.
    pub fn require(&self, provider_id: &str) -> Result<&str> {
        self.get(provider_id).ok_or_else(|| {
            let hint = Self::env_var_for(provider_id)
                .map(|var| format!(": set {} or add it under \"api_keys\" in the config file", var))
                .unwrap_or_default();
            Error::Config(format!("no API key for provider '{}'{}", provider_id, hint))
        })
    }

    pub fn env_var_for(provider_id: &str) -> Option<&'static str> {
        ENV_VARS.iter().find(|(id, _)| *id == provider_id).map(|(_, var)| *var)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.tokens.keys().map(|k| (k, "<redacted>")))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_from(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |var| pairs.iter().find(|(k, _)| *k == var).map(|(_, v)| v.to_string())
    }

    #[test]
    fn test_flag_beats_env_beats_file() {
        let mut file = HashMap::new();
        file.insert("modelscope".to_string(), "file-token".to_string());
        file.insert("ecnu".to_string(), "file-ecnu".to_string());

        let env = env_from(&[("MODEL_SCOPE_API", "env-token"), ("ECNU_API_KEY", "env-ecnu")]);
        let creds = Credentials::resolve(Some(("modelscope", "flag-token")), env, &file);

        assert_eq!(creds.get(MODELSCOPE), Some("flag-token"));
        assert_eq!(creds.get(ECNU), Some("env-ecnu"));
    }

    #[test]
    fn test_file_keys_may_use_env_var_names() {
        let mut file = HashMap::new();
        file.insert("MODEL_SCOPE_API".to_string(), "  ms-token\n".to_string());

        let creds = Credentials::resolve(None, |_| None, &file);
        assert_eq!(creds.get(MODELSCOPE), Some("ms-token"));
    }

    #[test]
    fn test_env_var_named_file_key_beats_provider_id_key() {
        let pairs = [
            ("modelscope", "by-id"),
            ("MODEL_SCOPE_API", "by-var"),
            ("ecnu", "ecnu-by-id"),
            ("ECNU_API_KEY", " "),
        ];

        // Each map gets a fresh hasher seed, so iteration order varies.
        for _ in 0..20 {
            let file: HashMap<String, String> =
                pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
            let creds = Credentials::resolve(None, |_| None, &file);
            assert_eq!(creds.get(MODELSCOPE), Some("by-var"));
            assert_eq!(creds.get(ECNU), Some("ecnu-by-id"));
        }
    }

    #[test]
    fn test_empty_tokens_count_as_missing() {
        let env = env_from(&[("ECNU_API_KEY", "   ")]);
        let creds = Credentials::resolve(None, env, &HashMap::new());
        assert!(creds.get(ECNU).is_none());

        let err = creds.require(ECNU).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("ECNU_API_KEY"));
    }

    #[test]
    fn test_debug_output_never_shows_tokens() {
        let creds = Credentials::new().with_token(ECNU, "sk-very-secret");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("ecnu"));
        assert!(!debug.contains("sk-very-secret"));
    }
}
