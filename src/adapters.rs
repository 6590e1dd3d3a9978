//! Translation between the canonical chat types and each provider's wire shape.
//!
//! Every adapter is pure: building a request and parsing a response touch
//! no network and no shared state, so both sides are tested directly.

use serde_json::{Map, Value, json};
use std::fmt;
use std::time::Duration;

use crate::chat::{ChatMode, ChatRequest, ChatResult, Usage};
use crate::credentials::{Credentials, MINIMAX_GROUP};
use crate::error::{Error, Result};
use crate::extract;
use crate::profile::{ProviderFamily, ProviderProfile};

const MAX_ERROR_BODY: usize = 500;

/// A fully assembled HTTP POST, ready for the transport.
#[derive(Clone, PartialEq)]
pub struct WireRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

impl WireRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Debug for WireRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: Vec<(&str, &str)> = self
            .headers
            .iter()
            .map(|(k, v)| {
                if k.eq_ignore_ascii_case("authorization") {
                    (k.as_str(), "<redacted>")
                } else {
                    (k.as_str(), v.as_str())
                }
            })
            .collect();
        f.debug_struct("WireRequest")
            .field("url", &self.url)
            .field("headers", &headers)
            .field("body", &self.body)
            .finish()
    }
}

/// Per-family request/response translation.
///
/// The default methods implement the OpenAI-compatible chat-completions
/// shape; families override only what differs.
pub trait ProviderAdapter: Send + Sync {
    fn family(&self) -> ProviderFamily;

    fn auth_headers(&self, token: &str, _credentials: &Credentials) -> Vec<(String, String)> {
        vec![("Authorization".to_string(), format!("Bearer {}", token))]
    }

    /// Auxiliary top-level fields. Only families that know how to build one
    /// accept a profile that asks for it.
    fn extra_body(&self, profile: &ProviderProfile) -> Result<Option<Map<String, Value>>> {
        if profile.requires_extra_body {
            return Err(Error::provider(
                None,
                format!(
                    "model '{}' requires an auxiliary parameter block the {} adapter does not provide",
                    profile.name,
                    self.family()
                ),
            ));
        }
        Ok(None)
    }

    fn build_wire_request(
        &self,
        request: &ChatRequest,
        profile: &ProviderProfile,
        credentials: &Credentials,
    ) -> Result<WireRequest> {
        let token = credentials.require(&profile.provider_id)?;
        request.validate()?;

        let mut body = json!({
            "model": profile.model_id,
            "messages": [
                { "role": "system", "content": request.system_instruction },
                { "role": "user", "content": request.prompt },
            ],
            "temperature": request.temperature,
            "top_p": request.top_p,
            "stream": false,
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let (Some(extra), Some(obj)) = (self.extra_body(profile)?, body.as_object_mut()) {
            obj.extend(extra);
        }

        let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];
        headers.extend(self.auth_headers(token, credentials));

        Ok(WireRequest {
            url: profile.endpoint_url(),
            headers,
            body,
        })
    }

    /// Hook for vendors that report failures inside a 2xx body.
    fn check_body_status(&self, _status: u16, _body: &Value) -> Result<()> {
        Ok(())
    }

    fn parse_wire_response(
        &self,
        profile: &ProviderProfile,
        mode: ChatMode,
        status: u16,
        body: &str,
        latency: Duration,
    ) -> Result<ChatResult> {
        if !(200..300).contains(&status) {
            return Err(Error::provider(Some(status), describe_failure(status, body)));
        }

        let value: Value = serde_json::from_str(body).map_err(|_| Error::bad_response_shape())?;
        self.check_body_status(status, &value)?;

        let message = value
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|arr| arr.first())
            .and_then(|choice| choice.get("message"))
            .ok_or_else(Error::bad_response_shape)?;

        let content = match message.get("content") {
            Some(Value::String(s)) => s.as_str(),
            Some(Value::Null) | None => "",
            Some(_) => return Err(Error::bad_response_shape()),
        };
        let field_reasoning = ["reasoning_content", "reasoning"]
            .iter()
            .find_map(|key| message.get(*key).and_then(|v| v.as_str()))
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);

        let (text, inline_reasoning) = extract::split_reasoning(content);
        if text.is_empty() {
            return Err(Error::bad_response_shape());
        }

        let (parsed_command, parsed_explanation) = extract::interpret(mode, &text);
        let reasoning = match mode {
            ChatMode::ExplainCommand | ChatMode::ExplainNl => field_reasoning.or(inline_reasoning),
            _ => None,
        };
        let usage = value
            .get("usage")
            .and_then(|u| serde_json::from_value::<Usage>(u.clone()).ok());

        Ok(ChatResult {
            raw_text: text,
            parsed_command,
            parsed_explanation,
            reasoning,
            provider_id: profile.provider_id.clone(),
            model: profile.name.clone(),
            latency,
            usage,
        })
    }
}

pub struct EcnuAdapter;
pub struct ZhipuAdapter;
pub struct QwenAdapter;
pub struct MiniMaxAdapter;

impl ProviderAdapter for EcnuAdapter {
    fn family(&self) -> ProviderFamily {
        ProviderFamily::Ecnu
    }
}

impl ProviderAdapter for ZhipuAdapter {
    fn family(&self) -> ProviderFamily {
        ProviderFamily::Zhipu
    }
}

impl ProviderAdapter for QwenAdapter {
    fn family(&self) -> ProviderFamily {
        ProviderFamily::Qwen
    }

    /// Qwen3 rejects non-streaming calls unless deep reasoning is switched off.
    fn extra_body(&self, profile: &ProviderProfile) -> Result<Option<Map<String, Value>>> {
        if !profile.requires_extra_body {
            return Ok(None);
        }
        if !profile.supports_thinking {
            return Err(Error::provider(
                None,
                format!("model '{}' has no thinking switch to configure", profile.name),
            ));
        }
        let mut extra = Map::new();
        extra.insert("enable_thinking".to_string(), Value::Bool(false));
        Ok(Some(extra))
    }
}

impl ProviderAdapter for MiniMaxAdapter {
    fn family(&self) -> ProviderFamily {
        ProviderFamily::MiniMax
    }

    fn auth_headers(&self, token: &str, credentials: &Credentials) -> Vec<(String, String)> {
        let mut headers = vec![("Authorization".to_string(), format!("Bearer {}", token))];
        if let Some(group) = credentials.get(MINIMAX_GROUP) {
            headers.push(("X-Minimax-GroupId".to_string(), group.to_string()));
        }
        headers
    }

    fn check_body_status(&self, status: u16, body: &Value) -> Result<()> {
        let Some(base) = body.get("base_resp") else {
            return Ok(());
        };
        let code = base.get("status_code").and_then(|c| c.as_i64()).unwrap_or(0);
        if code == 0 {
            return Ok(());
        }
        let message = base
            .get("status_msg")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown error");
        Err(Error::provider(Some(status), format!("MiniMax error {}: {}", code, message)))
    }
}

static ECNU: EcnuAdapter = EcnuAdapter;
static ZHIPU: ZhipuAdapter = ZhipuAdapter;
static QWEN: QwenAdapter = QwenAdapter;
static MINIMAX: MiniMaxAdapter = MiniMaxAdapter;

pub fn adapter_for(family: ProviderFamily) -> &'static dyn ProviderAdapter {
    match family {
        ProviderFamily::Ecnu => &ECNU,
        ProviderFamily::Zhipu => &ZHIPU,
        ProviderFamily::Qwen => &QWEN,
        ProviderFamily::MiniMax => &MINIMAX,
    }
}

pub fn build_wire_request(
    request: &ChatRequest,
    profile: &ProviderProfile,
    credentials: &Credentials,
) -> Result<WireRequest> {
    adapter_for(profile.family).build_wire_request(request, profile, credentials)
}

pub fn parse_wire_response(
    profile: &ProviderProfile,
    mode: ChatMode,
    status: u16,
    body: &str,
    latency: Duration,
) -> Result<ChatResult> {
    adapter_for(profile.family).parse_wire_response(profile, mode, status, body, latency)
}

fn status_hint(status: u16) -> Option<&'static str> {
    match status {
        400 => Some("request parameters were rejected"),
        401 => Some("authentication failed, check the API key"),
        403 => Some("access denied, the API key may lack permission or have expired"),
        404 => Some("endpoint or model not found"),
        429 => Some("the provider is throttling requests"),
        500 => Some("provider internal error"),
        502 => Some("bad gateway"),
        503 => Some("service unavailable"),
        504 => Some("gateway timeout"),
        _ => None,
    }
}

fn describe_failure(status: u16, body: &str) -> String {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message").or(Some(e)))
                .or_else(|| v.get("message"))
                .and_then(|m| m.as_str().map(str::to_string))
        })
        .unwrap_or_else(|| body.chars().take(MAX_ERROR_BODY).collect::<String>());

    match (status_hint(status), detail.trim()) {
        (Some(hint), "") => hint.to_string(),
        (Some(hint), detail) => format!("{}: {}", hint, detail),
        (None, "") => format!("unexpected status {}", status),
        (None, detail) => detail.to_string(),
    }
}
