//! Per-vendor request construction and response normalization.
//!
//! Kept free of I/O so both transports share one translation and the
//! shapes can be tested without a network.

use std::collections::BTreeMap;

use serde_json::{Value, json};

use super::error::BackendError;
use super::types::{BackendId, BackendRequest, Role};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Per-backend base URL overrides (proxies, mock servers).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Endpoints {
    overrides: BTreeMap<BackendId, String>,
}

impl Endpoints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_override(mut self, backend: BackendId, base_url: impl Into<String>) -> Self {
        self.overrides.insert(backend, base_url.into());
        self
    }

    pub fn set(&mut self, backend: BackendId, base_url: impl Into<String>) {
        self.overrides.insert(backend, base_url.into());
    }

    /// The override for `backend`, or its public API root.
    pub fn base_url(&self, backend: BackendId) -> &str {
        self.overrides
            .get(&backend)
            .map(String::as_str)
            .unwrap_or_else(|| backend.default_base_url())
    }
}

/// A fully-resolved HTTP POST, ready for any transport.
#[derive(Clone)]
pub struct WireRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

impl std::fmt::Debug for WireRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // URL and headers can carry the key.
        f.debug_struct("WireRequest")
            .field("url", &self.url.split('?').next().unwrap_or_default())
            .field(
                "headers",
                &self.headers.iter().map(|(k, _)| k).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Build the vendor-specific request for `req` against `base_url`.
pub fn build_request(base_url: &str, req: &BackendRequest<'_>) -> WireRequest {
    let base = base_url.trim_end_matches('/');
    match req.backend {
        BackendId::Anthropic => anthropic_request(base, req),
        BackendId::Google => google_request(base, req),
        BackendId::Groq | BackendId::Openai | BackendId::Openrouter => {
            chat_completions_request(base, req)
        }
    }
}

fn anthropic_request(base: &str, req: &BackendRequest<'_>) -> WireRequest {
    let messages: Vec<Value> = req
        .conversation
        .iter()
        .map(|turn| {
            json!({
                "role": match turn.role {
                    Role::User => "user",
                    Role::Agent => "assistant",
                },
                "content": turn.content,
            })
        })
        .collect();

    WireRequest {
        url: format!("{base}/v1/messages"),
        headers: vec![
            ("content-type".into(), "application/json".into()),
            ("x-api-key".into(), req.credential.to_string()),
            ("anthropic-version".into(), ANTHROPIC_VERSION.into()),
        ],
        body: json!({
            "model": req.model,
            "max_tokens": req.options.max_output_tokens,
            "system": req.system_prompt,
            "messages": messages,
        }),
    }
}

fn google_request(base: &str, req: &BackendRequest<'_>) -> WireRequest {
    let contents: Vec<Value> = req
        .conversation
        .iter()
        .map(|turn| {
            json!({
                "role": match turn.role {
                    Role::User => "user",
                    Role::Agent => "model",
                },
                "parts": [{ "text": turn.content }],
            })
        })
        .collect();

    WireRequest {
        url: format!(
            "{base}/v1beta/models/{}:generateContent?key={}",
            req.model, req.credential
        ),
        headers: vec![("content-type".into(), "application/json".into())],
        body: json!({
            "system_instruction": { "parts": [{ "text": req.system_prompt }] },
            "contents": contents,
            "generationConfig": { "maxOutputTokens": req.options.max_output_tokens },
        }),
    }
}

fn chat_completions_request(base: &str, req: &BackendRequest<'_>) -> WireRequest {
    let mut messages = Vec::with_capacity(req.conversation.len() + 1);
    messages.push(json!({ "role": "system", "content": req.system_prompt }));
    messages.extend(req.conversation.iter().map(|turn| {
        json!({
            "role": match turn.role {
                Role::User => "user",
                Role::Agent => "assistant",
            },
            "content": turn.content,
        })
    }));

    WireRequest {
        url: format!("{base}/v1/chat/completions"),
        headers: vec![
            ("content-type".into(), "application/json".into()),
            (
                "authorization".into(),
                format!("Bearer {}", req.credential),
            ),
        ],
        body: json!({
            "model": req.model,
            "max_tokens": req.options.max_output_tokens,
            "messages": messages,
        }),
    }
}

/// Map an HTTP status and body onto reply text or a [`BackendError`].
pub fn decode_response(backend: BackendId, status: u16, body: &str) -> Result<String, BackendError> {
    if !(200..300).contains(&status) {
        return Err(BackendError::from_status(backend, status, body));
    }

    let value: Value = serde_json::from_str(body).map_err(|e| BackendError::Malformed {
        backend,
        message: e.to_string(),
    })?;

    match extract_text(backend, &value) {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(BackendError::EmptyResponse { backend }),
    }
}

/// Pull the generated text out of a successful response body.
pub fn extract_text(backend: BackendId, value: &Value) -> Option<String> {
    match backend {
        BackendId::Anthropic => {
            let blocks = value.get("content")?.as_array()?;
            let text: Vec<&str> = blocks
                .iter()
                .filter(|b| b.get("type").and_then(Value::as_str).unwrap_or("text") == "text")
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect();
            Some(text.concat())
        }
        BackendId::Google => {
            let parts = value
                .get("candidates")?
                .get(0)?
                .get("content")?
                .get("parts")?
                .as_array()?;
            let text: Vec<&str> = parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect();
            Some(text.concat())
        }
        BackendId::Groq | BackendId::Openai | BackendId::Openrouter => value
            .get("choices")?
            .get(0)?
            .get("message")?
            .get("content")?
            .as_str()
            .map(str::to_string),
    }
}
