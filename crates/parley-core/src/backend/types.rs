//! Core types shared by every backend transport.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// BackendId
// ---------------------------------------------------------------------------

/// The closed set of model backends parley can dispatch to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendId {
    Anthropic,
    Google,
    Groq,
    Openai,
    Openrouter,
}

impl BackendId {
    /// Every backend, in the order the provider resolver tries them.
    pub const ALL: [BackendId; 5] = [
        Self::Anthropic,
        Self::Google,
        Self::Groq,
        Self::Openai,
        Self::Openrouter,
    ];

    /// Model used when an agent falls back onto this backend.
    pub fn default_model(self) -> &'static str {
        match self {
            Self::Anthropic => "claude-sonnet-4-20250514",
            Self::Google => "gemini-2.0-flash",
            Self::Groq => "llama-3.3-70b-versatile",
            Self::Openai => "gpt-4o",
            Self::Openrouter => "nvidia/nemotron-nano-9b-v2:free",
        }
    }

    /// Cheapest model for health-check pings.
    pub fn ping_model(self) -> &'static str {
        match self {
            Self::Openai => "gpt-4o-mini",
            other => other.default_model(),
        }
    }

    /// Public API root for this backend.
    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::Anthropic => "https://api.anthropic.com",
            Self::Google => "https://generativelanguage.googleapis.com",
            Self::Groq => "https://api.groq.com/openai",
            Self::Openai => "https://api.openai.com",
            Self::Openrouter => "https://openrouter.ai/api",
        }
    }

    /// Whether this backend speaks the OpenAI chat-completions dialect.
    pub fn is_openai_compatible(self) -> bool {
        matches!(self, Self::Groq | Self::Openai | Self::Openrouter)
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Anthropic => "anthropic",
            Self::Google => "google",
            Self::Groq => "groq",
            Self::Openai => "openai",
            Self::Openrouter => "openrouter",
        };
        f.write_str(s)
    }
}

impl FromStr for BackendId {
    type Err = BackendIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "anthropic" => Ok(Self::Anthropic),
            "google" | "gemini" => Ok(Self::Google),
            "groq" => Ok(Self::Groq),
            "openai" => Ok(Self::Openai),
            "openrouter" => Ok(Self::Openrouter),
            other => Err(BackendIdParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an unknown backend id.
#[derive(Debug, Clone)]
pub struct BackendIdParseError(pub String);

impl fmt::Display for BackendIdParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown backend: {:?} (expected anthropic, google, groq, openai or openrouter)",
            self.0
        )
    }
}

impl std::error::Error for BackendIdParseError {}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// API keys per backend, assembled by the embedder.
///
/// Empty strings are treated as absent.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    keys: BTreeMap<BackendId, String>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, backend: BackendId, key: impl Into<String>) -> Self {
        self.insert(backend, key);
        self
    }

    /// Set the key for `backend`. Blank keys are ignored.
    pub fn insert(&mut self, backend: BackendId, key: impl Into<String>) {
        let key = key.into();
        let trimmed = key.trim();
        if trimmed.is_empty() {
            return;
        }
        self.keys.insert(backend, trimmed.to_string());
    }

    /// Set the key only if none is present yet.
    pub fn insert_if_absent(&mut self, backend: BackendId, key: impl Into<String>) {
        if !self.contains(backend) {
            self.insert(backend, key);
        }
    }

    pub fn get(&self, backend: BackendId) -> Option<&str> {
        self.keys.get(&backend).map(String::as_str)
    }

    pub fn contains(&self, backend: BackendId) -> bool {
        self.keys.contains_key(&backend)
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Backends that have a credential, in resolver order.
    pub fn available(&self) -> Vec<BackendId> {
        BackendId::ALL
            .into_iter()
            .filter(|b| self.contains(*b))
            .collect()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.keys.iter().map(|(k, v)| (k, mask_key(v))))
            .finish()
    }
}

/// `first8...last4`, or `***` for keys too short to reveal anything.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 12 {
        return "***".to_string();
    }
    let head: String = chars[..8].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// Who authored a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Agent,
}

/// One message in an agent's conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn agent(content: impl Into<String>) -> Self {
        Self {
            role: Role::Agent,
            content: content.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Per-call limits handed to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallOptions {
    pub max_output_tokens: u32,
    pub timeout: Duration,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            max_output_tokens: 2048,
            timeout: Duration::from_secs(120),
        }
    }
}

/// Everything a transport needs to issue one generation request.
#[derive(Clone, Copy)]
pub struct BackendRequest<'a> {
    pub backend: BackendId,
    pub credential: &'a str,
    pub model: &'a str,
    pub system_prompt: &'a str,
    pub conversation: &'a [ConversationTurn],
    pub options: CallOptions,
}

impl fmt::Debug for BackendRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRequest")
            .field("backend", &self.backend)
            .field("credential", &mask_key(self.credential))
            .field("model", &self.model)
            .field("system_prompt_len", &self.system_prompt.len())
            .field("turns", &self.conversation.len())
            .field("options", &self.options)
            .finish()
    }
}
