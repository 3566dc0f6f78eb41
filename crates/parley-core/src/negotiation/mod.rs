//! Negotiation orchestrator.
//!
//! ```text
//! Init -> Opening (round 1) -> Round(2..=N) -> Synthesis -> [StressTest] -> Done
//! ```
//!
//! Within a round the two principals are independent: each prompt depends
//! only on the counterpart's *previous* round, so both calls may be in
//! flight together. Round k+1 is never built before both round-k replies
//! exist. Each agent's history is touched only by its own call path and the
//! round list only after the join.

pub mod artifact;
pub mod compare;
pub mod error;
pub mod history;
pub mod summarize;

use std::fmt;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use parley_db::models::RunMode;

use crate::backend::{BackendAdapter, BackendError, BackendId, ConversationTurn, Credentials};
use crate::profile::{AgentProfile, ProfileStore};
use crate::prompt::{
    self, PromptBudget, StressTestInput, SynthesisInput, opening_prompt, round_prompt,
    shared_axioms, stress_test_prompt, synthesis_prompt,
};
use crate::provider::{BrainMode, ResolvedProvider, resolve};
use crate::report::{ParticipantInfo, PhaseTimings, RunReport, transcript_digest};
use crate::tension::{self, TensionWeights};

pub use artifact::{
    JointArtifact, StressTest, StressVerdict, Synthesis, SynthesisOutcome, parse_synthesis,
};
pub use compare::{ModeComparison, PhaseSpeedup};
pub use error::NegotiationError;
pub use history::{ConversationHistory, RoundRecord};
pub use summarize::{SummaryLimits, summarize, summarize_with};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Which backend the arbiter runs on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArbiterChoice {
    /// Reuse agent A's resolved backend and model.
    #[default]
    FirstPrincipal,
    /// A specific backend with its default model.
    Backend(BackendId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NegotiationConfig {
    /// Round count including the opening round. Fixed per run.
    pub rounds: u32,
    pub mode: RunMode,
    pub summary: SummaryLimits,
    pub tension: TensionWeights,
    pub budget: PromptBudget,
    pub arbiter: ArbiterChoice,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            rounds: 3,
            mode: RunMode::Parallel,
            summary: SummaryLimits::default(),
            tension: TensionWeights::default(),
            budget: PromptBudget::default(),
            arbiter: ArbiterChoice::FirstPrincipal,
        }
    }
}

/// Profile ids for every seat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participants {
    pub agent_a: String,
    pub agent_b: String,
    /// Persona the arbiter writes as; `None` for an anonymous arbiter.
    pub arbiter_persona: Option<String>,
    /// `None` disables the stress test.
    pub critic: Option<String>,
}

impl Default for Participants {
    fn default() -> Self {
        Self {
            agent_a: "boolean".to_string(),
            agent_b: "roux".to_string(),
            arbiter_persona: Some("loom".to_string()),
            critic: Some("seer".to_string()),
        }
    }
}

/// A loaded profile bound to the provider that will serve it.
#[derive(Debug, Clone)]
pub struct Seat {
    pub profile: AgentProfile,
    pub provider: ResolvedProvider,
}

/// Everything resolved at `Init`.
#[derive(Debug, Clone)]
pub struct Lineup {
    pub agent_a: Seat,
    pub agent_b: Seat,
    pub arbiter: ResolvedProvider,
    pub arbiter_persona: Option<AgentProfile>,
    pub critic: Option<Seat>,
    /// Why the stress test will not run, when a critic was requested but
    /// could not be seated.
    pub critic_skip_reason: Option<String>,
}

impl Lineup {
    pub fn brain_mode(&self) -> BrainMode {
        BrainMode::from_backends(
            [self.agent_a.provider.backend, self.agent_b.provider.backend]
                .into_iter()
                .chain(self.critic.as_ref().map(|c| c.provider.backend)),
        )
    }

    pub fn participants(&self) -> Vec<ParticipantInfo> {
        let seat_info = |seat: &str, s: &Seat| ParticipantInfo {
            seat: seat.to_string(),
            name: s.profile.name.clone(),
            profile_id: Some(s.profile.id.clone()),
            top_axiom: Some(s.profile.top_axiom_id.clone()),
            backend: s.provider.backend,
            model: s.provider.model.clone(),
            mode: s.provider.mode,
        };

        let mut out = vec![
            seat_info("agent_a", &self.agent_a),
            seat_info("agent_b", &self.agent_b),
        ];
        out.push(ParticipantInfo {
            seat: "arbiter".to_string(),
            name: self
                .arbiter_persona
                .as_ref()
                .map(|p| p.name.clone())
                .unwrap_or_else(|| "Synthesis Engine".to_string()),
            profile_id: self.arbiter_persona.as_ref().map(|p| p.id.clone()),
            top_axiom: None,
            backend: self.arbiter.backend,
            model: self.arbiter.model.clone(),
            mode: self.arbiter.mode,
        });
        if let Some(critic) = &self.critic {
            out.push(seat_info("critic", critic));
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Phases
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Init,
    /// Round 1.
    Opening,
    Round(u32),
    Synthesis,
    StressTest,
    Done,
}

impl Phase {
    fn for_round(round: u32) -> Self {
        if round == 1 { Self::Opening } else { Self::Round(round) }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => f.write_str("init"),
            Self::Opening => f.write_str("opening"),
            Self::Round(k) => write!(f, "round {k}"),
            Self::Synthesis => f.write_str("synthesis"),
            Self::StressTest => f.write_str("stress test"),
            Self::Done => f.write_str("done"),
        }
    }
}

// ---------------------------------------------------------------------------
// Negotiator
// ---------------------------------------------------------------------------

/// Runs negotiations through a [`BackendAdapter`].
#[derive(Debug, Clone)]
pub struct Negotiator {
    adapter: BackendAdapter,
    config: NegotiationConfig,
}

impl Negotiator {
    pub fn new(adapter: BackendAdapter, config: NegotiationConfig) -> Self {
        Self { adapter, config }
    }

    pub fn config(&self) -> &NegotiationConfig {
        &self.config
    }

    /// `Init`: load profiles, resolve providers and check that every
    /// required backend has a transport. No backend call is made.
    pub fn prepare(
        &self,
        store: &ProfileStore,
        participants: &Participants,
        credentials: &Credentials,
    ) -> Result<Lineup, NegotiationError> {
        if self.config.rounds == 0 {
            return Err(NegotiationError::InvalidRounds(0));
        }

        let seat = |id: &str| -> Result<Seat, NegotiationError> {
            let profile = store.load(id)?;
            let provider = resolve(&profile, credentials).ok_or_else(|| {
                NegotiationError::NoProviderAvailable {
                    agent: profile.name.clone(),
                }
            })?;
            Ok(Seat { profile, provider })
        };

        let agent_a = seat(&participants.agent_a)?;
        let agent_b = seat(&participants.agent_b)?;

        let arbiter = match self.config.arbiter {
            ArbiterChoice::FirstPrincipal => agent_a.provider.clone(),
            ArbiterChoice::Backend(backend) => ResolvedProvider::on_backend(backend, credentials)
                .ok_or_else(|| NegotiationError::NoProviderAvailable {
                    agent: format!("the arbiter ({backend})"),
                })?,
        };

        let arbiter_persona = participants
            .arbiter_persona
            .as_deref()
            .map(|id| store.load(id))
            .transpose()?;

        let registry = self.adapter.registry();
        for backend in [
            agent_a.provider.backend,
            agent_b.provider.backend,
            arbiter.backend,
        ] {
            if registry.validate(&[backend]).is_err() {
                return Err(NegotiationError::UnknownBackend(backend));
            }
        }

        let (critic, critic_skip_reason) = match participants.critic.as_deref() {
            None => (None, None),
            Some(id) => {
                let profile = store.load(id)?;
                match resolve(&profile, credentials) {
                    None => {
                        let reason = format!("no backend credential available for {}", profile.name);
                        warn!(critic = %profile.name, "{reason}; stress test disabled");
                        (None, Some(reason))
                    }
                    Some(provider) if registry.validate(&[provider.backend]).is_err() => {
                        let reason = format!("backend {} has no registered transport", provider.backend);
                        warn!(critic = %profile.name, "{reason}; stress test disabled");
                        (None, Some(reason))
                    }
                    Some(provider) => (Some(Seat { profile, provider }), None),
                }
            }
        };

        let lineup = Lineup {
            agent_a,
            agent_b,
            arbiter,
            arbiter_persona,
            critic,
            critic_skip_reason,
        };

        info!(
            phase = %Phase::Init,
            agent_a = %lineup.agent_a.profile.name,
            backend_a = %lineup.agent_a.provider.backend,
            mode_a = %lineup.agent_a.provider.mode,
            agent_b = %lineup.agent_b.profile.name,
            backend_b = %lineup.agent_b.provider.backend,
            mode_b = %lineup.agent_b.provider.mode,
            arbiter = %lineup.arbiter.backend,
            critic = lineup.critic.as_ref().map(|c| c.profile.name.as_str()),
            brain_mode = %lineup.brain_mode(),
            "negotiation prepared"
        );
        Ok(lineup)
    }

    /// `prepare` followed by `run`.
    pub async fn negotiate(
        &self,
        topic: &str,
        store: &ProfileStore,
        participants: &Participants,
        credentials: &Credentials,
    ) -> Result<RunReport, NegotiationError> {
        let lineup = self.prepare(store, participants, credentials)?;
        self.run(topic, &lineup).await
    }

    /// Run in the configured mode.
    pub async fn run(&self, topic: &str, lineup: &Lineup) -> Result<RunReport, NegotiationError> {
        self.run_with_mode(topic, lineup, self.config.mode).await
    }

    pub async fn run_with_mode(
        &self,
        topic: &str,
        lineup: &Lineup,
        mode: RunMode,
    ) -> Result<RunReport, NegotiationError> {
        let cfg = &self.config;
        if cfg.rounds == 0 {
            return Err(NegotiationError::InvalidRounds(0));
        }

        let started_at = Utc::now();
        let total_start = Instant::now();
        let (a, b) = (&lineup.agent_a, &lineup.agent_b);
        let system_a = prompt::system_prompt(&a.profile, &cfg.budget);
        let system_b = prompt::system_prompt(&b.profile, &cfg.budget);

        let mut history_a = ConversationHistory::new();
        let mut history_b = ConversationHistory::new();
        let mut rounds: Vec<RoundRecord> = Vec::with_capacity(cfg.rounds as usize);
        let mut timings = PhaseTimings::default();

        info!(topic, %mode, rounds = cfg.rounds, "negotiation started");

        for round in 1..=cfg.rounds {
            let phase = Phase::for_round(round);
            let (prompt_a, prompt_b) = match rounds.last() {
                None => {
                    let opening = opening_prompt(topic, cfg.rounds, &cfg.budget);
                    (opening.clone(), opening)
                }
                Some(prev) => (
                    round_prompt(
                        topic,
                        round,
                        cfg.rounds,
                        &b.profile.name,
                        &summarize_with(&prev.agent_b_output, &cfg.summary),
                        &cfg.budget,
                    ),
                    round_prompt(
                        topic,
                        round,
                        cfg.rounds,
                        &a.profile.name,
                        &summarize_with(&prev.agent_a_output, &cfg.summary),
                        &cfg.budget,
                    ),
                ),
            };
            history_a.push_user(prompt_a);
            history_b.push_user(prompt_b);

            let round_start = Instant::now();
            let (out_a, out_b) = match mode {
                RunMode::Parallel => tokio::try_join!(
                    self.principal_turn(a, &system_a, &history_a, phase),
                    self.principal_turn(b, &system_b, &history_b, phase),
                )?,
                RunMode::Sequential => {
                    let out_a = self.principal_turn(a, &system_a, &history_a, phase).await?;
                    let out_b = self.principal_turn(b, &system_b, &history_b, phase).await?;
                    (out_a, out_b)
                }
            };
            let elapsed_ms = round_start.elapsed().as_millis() as u64;
            timings.rounds_ms.push(elapsed_ms);

            history_a.push_agent(out_a.clone());
            history_b.push_agent(out_b.clone());
            let record = RoundRecord::new(round, out_a, out_b);
            info!(
                phase = %phase,
                round,
                elapsed_ms,
                friction = record.friction_marker_count,
                agreement = record.agreement_marker_count,
                "round complete"
            );
            rounds.push(record);
        }

        // rounds >= 1, so there is always a final round.
        let (final_a, final_b) = rounds
            .last()
            .map(|r| (r.agent_a_output.as_str(), r.agent_b_output.as_str()))
            .unwrap_or_default();

        let synthesis_start = Instant::now();
        let synthesis = self
            .synthesize(topic, lineup, final_a, final_b, mode)
            .await?;
        timings.synthesis_ms = synthesis_start.elapsed().as_millis() as u64;
        info!(
            phase = %Phase::Synthesis,
            elapsed_ms = timings.synthesis_ms,
            parsed = synthesis.is_parsed(),
            "synthesis complete"
        );

        let mut stress_test_skipped = lineup.critic_skip_reason.clone();
        let stress_test = match &lineup.critic {
            Some(critic) => {
                let stress_start = Instant::now();
                let result = self
                    .stress_test(topic, lineup, critic, final_a, final_b, &synthesis.raw)
                    .await;
                timings.stress_test_ms = Some(stress_start.elapsed().as_millis() as u64);
                match result {
                    Ok(test) => {
                        info!(
                            phase = %Phase::StressTest,
                            elapsed_ms = timings.stress_test_ms,
                            verdict = %test.verdict,
                            "stress test complete"
                        );
                        Some(test)
                    }
                    Err(e) => {
                        warn!(
                            phase = %Phase::StressTest,
                            critic = %critic.profile.name,
                            error = %e,
                            "stress test failed; continuing without it"
                        );
                        stress_test_skipped = Some(e.to_string());
                        None
                    }
                }
            }
            None => None,
        };

        let tension = tension::score_with(&rounds, &cfg.tension);
        timings.total_ms = total_start.elapsed().as_millis() as u64;

        info!(
            phase = %Phase::Done,
            total_ms = timings.total_ms,
            tension = tension.score,
            label = %tension.label,
            "negotiation complete"
        );

        Ok(RunReport {
            id: Uuid::new_v4(),
            topic: topic.to_string(),
            mode,
            brain_mode: lineup.brain_mode(),
            participants: lineup.participants(),
            transcript_digest: transcript_digest(&rounds),
            rounds,
            synthesis,
            stress_test,
            stress_test_skipped,
            tension,
            timings,
            started_at,
            completed_at: Utc::now(),
        })
    }

    /// Run the same negotiation in parallel mode, then sequential mode.
    pub async fn compare_modes(
        &self,
        topic: &str,
        lineup: &Lineup,
    ) -> Result<ModeComparison, NegotiationError> {
        let parallel = self.run_with_mode(topic, lineup, RunMode::Parallel).await?;
        let sequential = self.run_with_mode(topic, lineup, RunMode::Sequential).await?;
        Ok(ModeComparison::new(parallel, sequential))
    }

    // -- phase helpers ------------------------------------------------------

    async fn principal_turn(
        &self,
        seat: &Seat,
        system: &str,
        history: &ConversationHistory,
        phase: Phase,
    ) -> Result<String, NegotiationError> {
        let provider = &seat.provider;
        let result = self
            .adapter
            .call(
                provider.backend,
                &provider.credential,
                &provider.model,
                system,
                history.turns(),
            )
            .await;
        forward_empty(result, phase, &seat.profile.name)
    }

    async fn synthesize(
        &self,
        topic: &str,
        lineup: &Lineup,
        final_a: &str,
        final_b: &str,
        mode: RunMode,
    ) -> Result<Synthesis, NegotiationError> {
        let (a, b) = (&lineup.agent_a.profile, &lineup.agent_b.profile);
        let input = SynthesisInput {
            topic,
            agent_a: a,
            agent_b: b,
            arbiter: lineup.arbiter_persona.as_ref(),
            final_a,
            final_b,
            rounds: self.config.rounds,
            mode,
            timestamp: Utc::now(),
        };
        let prompt = synthesis_prompt(&input, &self.config.budget);
        let arbiter = &lineup.arbiter;

        let result = self
            .adapter
            .call(
                arbiter.backend,
                &arbiter.credential,
                &arbiter.model,
                &prompt.system,
                &[ConversationTurn::user(prompt.user)],
            )
            .await;
        let raw = forward_empty(result, Phase::Synthesis, "arbiter")?;

        let outcome = parse_synthesis(&raw);
        if let SynthesisOutcome::Unparsed { parse_error } = &outcome {
            warn!(phase = %Phase::Synthesis, error = %parse_error, "synthesis output is not a joint artifact");
        }

        Ok(Synthesis {
            raw,
            outcome,
            backend: arbiter.backend,
            model: arbiter.model.clone(),
            constraints: shared_axioms(a, b),
        })
    }

    async fn stress_test(
        &self,
        topic: &str,
        lineup: &Lineup,
        critic: &Seat,
        final_a: &str,
        final_b: &str,
        synthesis: &str,
    ) -> Result<StressTest, BackendError> {
        let input = StressTestInput {
            topic,
            name_a: &lineup.agent_a.profile.name,
            final_a,
            name_b: &lineup.agent_b.profile.name,
            final_b,
            synthesis,
        };
        let system = prompt::system_prompt(&critic.profile, &self.config.budget);
        let user = stress_test_prompt(&input, &self.config.budget);
        let provider = &critic.provider;

        let raw = match self
            .adapter
            .call(
                provider.backend,
                &provider.credential,
                &provider.model,
                &system,
                &[ConversationTurn::user(user)],
            )
            .await
        {
            Ok(text) => text,
            Err(BackendError::EmptyResponse { backend }) => {
                warn!(phase = %Phase::StressTest, %backend, "critic returned no text");
                String::new()
            }
            Err(e) => return Err(e),
        };

        Ok(StressTest {
            critic: critic.profile.name.clone(),
            backend: provider.backend,
            model: provider.model.clone(),
            verdict: StressVerdict::extract(&raw),
            raw,
        })
    }
}

/// Empty replies are soft failures: logged, then forwarded as empty text.
fn forward_empty(
    result: Result<String, BackendError>,
    phase: Phase,
    agent: &str,
) -> Result<String, NegotiationError> {
    match result {
        Ok(text) => Ok(text),
        Err(BackendError::EmptyResponse { backend }) => {
            warn!(phase = %phase, agent, %backend, "backend returned no text; forwarding empty output");
            Ok(String::new())
        }
        Err(source) => Err(NegotiationError::Backend {
            phase,
            agent: agent.to_string(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_display() {
        assert_eq!(Phase::for_round(1), Phase::Opening);
        assert_eq!(Phase::for_round(3).to_string(), "round 3");
        assert_eq!(Phase::StressTest.to_string(), "stress test");
    }

    #[test]
    fn default_config_matches_reference_constants() {
        let cfg = NegotiationConfig::default();
        assert_eq!(cfg.rounds, 3);
        assert_eq!(cfg.mode, RunMode::Parallel);
        assert_eq!(cfg.arbiter, ArbiterChoice::FirstPrincipal);
        assert_eq!(cfg.summary.max_lines, 8);
        assert_eq!(cfg.summary.max_chars, 600);
    }

    #[test]
    fn forward_empty_turns_empty_response_into_text() {
        let result = Err(BackendError::EmptyResponse {
            backend: BackendId::Groq,
        });
        assert_eq!(forward_empty(result, Phase::Opening, "A").unwrap(), "");
    }

    #[test]
    fn forward_empty_keeps_other_errors_fatal() {
        let result = Err(BackendError::from_status(BackendId::Groq, 500, "boom"));
        let err = forward_empty(result, Phase::Round(2), "A").unwrap_err();
        assert!(matches!(err, NegotiationError::Backend { phase: Phase::Round(2), .. }));
    }
}
