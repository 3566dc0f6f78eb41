//! Preflight: ping every configured backend and preview provider resolution
//! before spending tokens on a negotiation.

use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

use super::{BrainMode, ResolvedProvider, resolve};
use crate::backend::{BackendAdapter, BackendError, BackendId, CallOptions, ConversationTurn, Credentials};
use crate::profile::AgentProfile;

pub const PING_SYSTEM: &str = "You are a health-check responder. Reply with exactly: OK";
pub const PING_USER: &str = "Respond with the single word OK.";

const SNIPPET_CHARS: usize = 60;
const DETAIL_CHARS: usize = 120;

// ---------------------------------------------------------------------------
// Ping results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PingStatus {
    Ok,
    /// Reachable but replied with no text.
    Warn,
    Fail,
    /// No credential configured.
    Skip,
}

impl std::fmt::Display for PingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Ok => "OK",
            Self::Warn => "WARN",
            Self::Fail => "FAIL",
            Self::Skip => "SKIP",
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PingResult {
    pub backend: BackendId,
    pub status: PingStatus,
    pub detail: String,
    pub latency_ms: Option<u64>,
    pub snippet: Option<String>,
    /// Attempts made, retries included.
    pub attempts: u32,
}

/// How many extra attempts a backend gets, with linear back-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    /// Wait before attempt `n` is `n * step`.
    pub step: Duration,
}

impl RetryPolicy {
    pub const NONE: Self = Self {
        retries: 0,
        step: Duration::ZERO,
    };

    /// openrouter's free tier drops requests under load; everything else
    /// gets a single attempt.
    pub fn for_backend(backend: BackendId, step: Duration) -> Self {
        match backend {
            BackendId::Openrouter => Self { retries: 2, step },
            _ => Self::NONE,
        }
    }
}

// ---------------------------------------------------------------------------
// Resolution preview & verdict
// ---------------------------------------------------------------------------

/// What the negotiation would use for one agent.
#[derive(Debug, Clone)]
pub struct AgentPreview {
    /// Seat label, e.g. "agent_a" or "critic".
    pub seat: String,
    pub profile_name: String,
    pub preferred: BackendId,
    pub provider: Option<ResolvedProvider>,
    /// Principals are required; the critic is not.
    pub required: bool,
}

impl AgentPreview {
    /// The arbiter seat pinned to `backend`. No fallback: the run uses that
    /// backend's default model or fails at Init.
    pub fn arbiter(backend: BackendId, credentials: &Credentials) -> Self {
        Self {
            seat: "arbiter".to_string(),
            profile_name: format!("Arbiter ({backend})"),
            preferred: backend,
            provider: ResolvedProvider::on_backend(backend, credentials),
            required: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    /// Negotiation cannot run.
    Blocked { reason: String },
    /// Some backend failed, but no agent depends on it.
    PassWithWarnings {
        failed: Vec<BackendId>,
        critic_available: bool,
    },
    /// Everything needed works; the critic is unavailable.
    Pass,
    AllClear,
}

impl Verdict {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked { .. })
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blocked { reason } => write!(f, "BLOCKED: {reason}"),
            Self::PassWithWarnings { failed, .. } => {
                let names: Vec<String> = failed.iter().map(ToString::to_string).collect();
                write!(
                    f,
                    "PASS with warnings: {} failed but no agent depends on it",
                    names.join(", ")
                )
            }
            Self::Pass => f.write_str("PASS: critic unavailable, stress test will be skipped"),
            Self::AllClear => f.write_str("ALL CLEAR"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PreflightReport {
    pub pings: Vec<PingResult>,
    pub agents: Vec<AgentPreview>,
    pub brain_mode: BrainMode,
}

impl PreflightReport {
    pub fn count(&self, status: PingStatus) -> usize {
        self.pings.iter().filter(|p| p.status == status).count()
    }

    /// Failures on a backend some agent resolves to block the run; other
    /// failures only warn.
    pub fn verdict(&self) -> Verdict {
        let needed: Vec<BackendId> = self
            .agents
            .iter()
            .filter_map(|a| a.provider.as_ref().map(|p| p.backend))
            .collect();

        let failed: Vec<BackendId> = self
            .pings
            .iter()
            .filter(|p| p.status == PingStatus::Fail)
            .map(|p| p.backend)
            .collect();

        let needed_failures: Vec<String> = failed
            .iter()
            .filter(|b| needed.contains(b))
            .map(ToString::to_string)
            .collect();
        if !needed_failures.is_empty() {
            return Verdict::Blocked {
                reason: format!("{} failed and is needed by an agent", needed_failures.join(", ")),
            };
        }

        if let Some(missing) = self
            .agents
            .iter()
            .find(|a| a.required && a.provider.is_none())
        {
            return Verdict::Blocked {
                reason: format!("{} has no provider", missing.profile_name),
            };
        }

        let critic_available = self
            .agents
            .iter()
            .filter(|a| !a.required)
            .all(|a| a.provider.is_some());

        if !failed.is_empty() {
            Verdict::PassWithWarnings {
                failed,
                critic_available,
            }
        } else if !critic_available {
            Verdict::Pass
        } else {
            Verdict::AllClear
        }
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Pings backends through a [`BackendAdapter`].
#[derive(Debug, Clone)]
pub struct Preflight {
    adapter: BackendAdapter,
    retry_step: Duration,
    options: CallOptions,
}

impl Preflight {
    pub fn new(adapter: BackendAdapter) -> Self {
        Self {
            options: CallOptions {
                max_output_tokens: 16,
                timeout: adapter.options().timeout.min(Duration::from_secs(30)),
            },
            adapter,
            retry_step: Duration::from_secs(2),
        }
    }

    pub fn with_retry_step(mut self, step: Duration) -> Self {
        self.retry_step = step;
        self
    }

    pub async fn ping(
        &self,
        backend: BackendId,
        credential: Option<&str>,
        policy: RetryPolicy,
    ) -> PingResult {
        let Some(credential) = credential else {
            return PingResult {
                backend,
                status: PingStatus::Skip,
                detail: "No API key configured".to_string(),
                latency_ms: None,
                snippet: None,
                attempts: 0,
            };
        };

        let turns = [ConversationTurn::user(PING_USER)];
        let mut attempt = 0;
        loop {
            if attempt > 0 {
                let wait = policy.step * attempt;
                info!(%backend, attempt, retries = policy.retries, wait_ms = wait.as_millis() as u64, "retrying ping");
                tokio::time::sleep(wait).await;
            }

            let started = Instant::now();
            let result = self
                .adapter
                .call_with(
                    backend,
                    credential,
                    backend.ping_model(),
                    PING_SYSTEM,
                    &turns,
                    self.options,
                )
                .await;
            let latency_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(reply) => {
                    return PingResult {
                        backend,
                        status: PingStatus::Ok,
                        detail: format!("Response in {latency_ms}ms"),
                        latency_ms: Some(latency_ms),
                        snippet: Some(reply.chars().take(SNIPPET_CHARS).collect()),
                        attempts: attempt + 1,
                    };
                }
                Err(BackendError::EmptyResponse { .. }) => {
                    return PingResult {
                        backend,
                        status: PingStatus::Warn,
                        detail: format!("Empty response ({latency_ms}ms)"),
                        latency_ms: Some(latency_ms),
                        snippet: None,
                        attempts: attempt + 1,
                    };
                }
                Err(e) if attempt >= policy.retries => {
                    warn!(%backend, error = %e, "ping failed");
                    return PingResult {
                        backend,
                        status: PingStatus::Fail,
                        detail: e.to_string().chars().take(DETAIL_CHARS).collect(),
                        latency_ms: Some(latency_ms),
                        snippet: None,
                        attempts: attempt + 1,
                    };
                }
                Err(_) => attempt += 1,
            }
        }
    }

    /// Ping every backend concurrently and preview each seat.
    ///
    /// `seats` is `(seat label, profile, required)`. `arbiter` is the
    /// explicitly configured arbiter backend, previewed as a required seat;
    /// `None` means the arbiter rides on agent A's provider.
    pub async fn run(
        &self,
        credentials: &Credentials,
        seats: &[(&str, &AgentProfile, bool)],
        arbiter: Option<BackendId>,
    ) -> PreflightReport {
        // Backends are independent; join_all keeps resolver order.
        let pings = join_all(BackendId::ALL.into_iter().map(|backend| {
            let policy = RetryPolicy::for_backend(backend, self.retry_step);
            self.ping(backend, credentials.get(backend), policy)
        }))
        .await;

        let mut agents: Vec<AgentPreview> = seats
            .iter()
            .map(|(seat, profile, required)| AgentPreview {
                seat: seat.to_string(),
                profile_name: profile.name.clone(),
                preferred: profile.preferred_backend,
                provider: resolve(profile, credentials),
                required: *required,
            })
            .collect();

        let brain_mode = BrainMode::from_backends(
            agents
                .iter()
                .filter_map(|a| a.provider.as_ref().map(|p| p.backend)),
        );
        agents.extend(arbiter.map(|backend| AgentPreview::arbiter(backend, credentials)));

        PreflightReport {
            pings,
            agents,
            brain_mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderMode;

    fn ping(backend: BackendId, status: PingStatus) -> PingResult {
        PingResult {
            backend,
            status,
            detail: String::new(),
            latency_ms: None,
            snippet: None,
            attempts: 1,
        }
    }

    fn seat(name: &str, backend: Option<BackendId>, required: bool) -> AgentPreview {
        AgentPreview {
            seat: name.to_lowercase(),
            profile_name: name.to_string(),
            preferred: BackendId::Anthropic,
            provider: backend.map(|b| ResolvedProvider {
                backend: b,
                credential: "k".into(),
                mode: ProviderMode::Native,
                model: b.default_model().into(),
            }),
            required,
        }
    }

    fn report(pings: Vec<PingResult>, agents: Vec<AgentPreview>) -> PreflightReport {
        PreflightReport {
            pings,
            agents,
            brain_mode: BrainMode::SingleBrain,
        }
    }

    #[test]
    fn arbiter_without_credential_blocks() {
        let creds = Credentials::new().with(BackendId::Anthropic, "sk-ant");
        let r = report(
            vec![ping(BackendId::Anthropic, PingStatus::Ok), ping(BackendId::Openai, PingStatus::Skip)],
            vec![
                seat("Boolean", Some(BackendId::Anthropic), true),
                seat("Roux", Some(BackendId::Anthropic), true),
                AgentPreview::arbiter(BackendId::Openai, &creds),
            ],
        );
        let verdict = r.verdict();
        assert_eq!(
            verdict,
            Verdict::Blocked {
                reason: "Arbiter (openai) has no provider".to_string()
            }
        );
    }

    #[test]
    fn failing_arbiter_backend_blocks() {
        let creds = Credentials::new()
            .with(BackendId::Anthropic, "sk-ant")
            .with(BackendId::Openai, "sk-oai");
        let arbiter = AgentPreview::arbiter(BackendId::Openai, &creds);
        let provider = arbiter.provider.as_ref().unwrap();
        assert_eq!(provider.mode, ProviderMode::Native);
        assert_eq!(provider.model, BackendId::Openai.default_model());
        assert!(arbiter.required);

        let r = report(
            vec![ping(BackendId::Anthropic, PingStatus::Ok), ping(BackendId::Openai, PingStatus::Fail)],
            vec![
                seat("Boolean", Some(BackendId::Anthropic), true),
                seat("Roux", Some(BackendId::Anthropic), true),
                arbiter,
            ],
        );
        let verdict = r.verdict();
        assert!(verdict.is_blocked());
        assert!(verdict.to_string().contains("openai"), "{verdict}");
    }

    #[test]
    fn needed_failure_blocks() {
        let r = report(
            vec![ping(BackendId::Anthropic, PingStatus::Fail)],
            vec![
                seat("Boolean", Some(BackendId::Anthropic), true),
                seat("Roux", Some(BackendId::Google), true),
            ],
        );
        let verdict = r.verdict();
        assert!(verdict.is_blocked());
        assert!(verdict.to_string().contains("anthropic"));
    }

    #[test]
    fn principal_without_provider_blocks() {
        let r = report(
            vec![ping(BackendId::Anthropic, PingStatus::Ok)],
            vec![
                seat("Boolean", Some(BackendId::Anthropic), true),
                seat("Roux", None, true),
            ],
        );
        assert_eq!(
            r.verdict(),
            Verdict::Blocked {
                reason: "Roux has no provider".into()
            }
        );
    }

    #[test]
    fn unneeded_failure_warns() {
        let r = report(
            vec![
                ping(BackendId::Anthropic, PingStatus::Ok),
                ping(BackendId::Openrouter, PingStatus::Fail),
            ],
            vec![
                seat("Boolean", Some(BackendId::Anthropic), true),
                seat("Roux", Some(BackendId::Anthropic), true),
                seat("Seer", None, false),
            ],
        );
        assert_eq!(
            r.verdict(),
            Verdict::PassWithWarnings {
                failed: vec![BackendId::Openrouter],
                critic_available: false
            }
        );
    }

    #[test]
    fn missing_critic_is_plain_pass() {
        let r = report(
            vec![ping(BackendId::Anthropic, PingStatus::Ok)],
            vec![
                seat("Boolean", Some(BackendId::Anthropic), true),
                seat("Roux", Some(BackendId::Anthropic), true),
                seat("Seer", None, false),
            ],
        );
        assert_eq!(r.verdict(), Verdict::Pass);
    }

    #[test]
    fn everything_resolved_is_all_clear() {
        let r = report(
            vec![
                ping(BackendId::Anthropic, PingStatus::Ok),
                ping(BackendId::Groq, PingStatus::Skip),
            ],
            vec![
                seat("Boolean", Some(BackendId::Anthropic), true),
                seat("Roux", Some(BackendId::Anthropic), true),
                seat("Seer", Some(BackendId::Anthropic), false),
            ],
        );
        assert_eq!(r.verdict(), Verdict::AllClear);
        assert_eq!(r.count(PingStatus::Skip), 1);
    }

    #[test]
    fn only_openrouter_is_retried() {
        let step = Duration::from_millis(10);
        assert_eq!(RetryPolicy::for_backend(BackendId::Openrouter, step).retries, 2);
        assert_eq!(RetryPolicy::for_backend(BackendId::Google, step), RetryPolicy::NONE);
    }
}
