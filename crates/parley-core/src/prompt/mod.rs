//! Prompt construction. Pure functions over immutable inputs; nothing here
//! touches the network or the filesystem.
//!
//! | phase       | system                   | user                       |
//! |-------------|--------------------------|----------------------------|
//! | opening     | [`system_prompt`]        | [`opening_prompt`]         |
//! | round k     | [`system_prompt`]        | [`round_prompt`]           |
//! | synthesis   | [`synthesis_prompt`]     | final positions            |
//! | stress test | critic [`system_prompt`] | [`stress_test_prompt`]     |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use parley_db::models::RunMode;

use crate::profile::AgentProfile;

const BAR_CELLS: usize = 10;

/// Word budgets communicated to the model as instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptBudget {
    pub agent_words: u32,
    pub synthesis_words: u32,
    pub stress_test_words: u32,
}

impl Default for PromptBudget {
    fn default() -> Self {
        Self {
            agent_words: 300,
            synthesis_words: 400,
            stress_test_words: 300,
        }
    }
}

/// A system/user pair for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// `█` per tenth of weight, `░` for the rest.
pub fn weight_bar(weight: f64) -> String {
    let filled = ((weight.clamp(0.0, 1.0) * BAR_CELLS as f64).round() as usize).min(BAR_CELLS);
    format!("{}{}", "█".repeat(filled), "░".repeat(BAR_CELLS - filled))
}

// ---------------------------------------------------------------------------
// Principal prompts
// ---------------------------------------------------------------------------

/// System prompt for a principal (or the critic): identity, weighted axioms,
/// the hard constraint and the negotiation directives.
pub fn system_prompt(profile: &AgentProfile, budget: &PromptBudget) -> String {
    let axiom_block: Vec<String> = profile
        .sorted_axioms()
        .iter()
        .map(|ax| {
            let mut line = format!(
                "  {} [{}] {:.2} : {}: {}",
                ax.id,
                weight_bar(ax.weight),
                ax.weight,
                ax.title,
                ax.principle
            );
            if let Some(source) = &ax.source_text {
                line.push_str(&format!("\n    Source: {source}"));
            }
            line
        })
        .collect();

    let (top_title, top_weight) = profile
        .top_axiom()
        .map(|ax| (ax.title.as_str(), ax.weight))
        .unwrap_or((profile.top_axiom_id.as_str(), 0.0));

    let identity = if profile.role.is_empty() {
        format!("You are {}.", profile.name)
    } else {
        format!("You are {}, {}.", profile.name, profile.role)
    };

    let mut out = identity;
    if !profile.description.is_empty() {
        out.push_str("\n\n");
        out.push_str(&profile.description);
    }
    out.push_str(&format!(
        "\n\n=== AXIOM WEIGHTS ===\n\
         Your positions MUST be grounded in these weighted axioms. Higher weight means stronger influence on your reasoning.\n\n\
         {axioms}\n\n\
         === HARD CONSTRAINT ===\n\
         Your top axiom is {top_id} ({top_title}, weight {top_weight:.2}).\n\
         {non_negotiable}\n\
         You CANNOT compromise on this axiom. If pressed, reframe rather than abandon it.\n\n\
         === NEGOTIATION DIRECTIVES ===\n\
         1. Ground every claim in your axiom weights. Cite axiom IDs (e.g. {top_id}) when making arguments.\n\
         2. You are seeking POSITIVE-SUM outcomes: not consensus, not compromise, not averaging.\n\
         3. Positive-sum means both parties get MORE value from the joint position than from their individual one.\n\
         4. You may concede on low-weight axioms if doing so creates space for your high-weight ones.\n\
         5. Identify where your counterpart's strengths COMPLEMENT your blind spots.\n\
         6. Never abandon your top axiom. If pressed, reframe rather than retreat.\n",
        axioms = axiom_block.join("\n"),
        top_id = profile.top_axiom_id,
        non_negotiable = profile.non_negotiable_text,
    ));
    if !profile.linguistic_style.is_empty() {
        out.push_str(&format!(
            "\n=== LINGUISTIC STYLE ===\n{}\n",
            profile.linguistic_style
        ));
    }
    out.push_str(&format!(
        "\nKeep responses focused and under {} words. Be direct. Cite axiom IDs.",
        budget.agent_words
    ));
    out
}

fn round_header(round: u32, total_rounds: u32, topic: &str) -> String {
    format!("NEGOTIATION ROUND {round} of {total_rounds}\nTopic: \"{topic}\"\n")
}

/// Round 1: no prior context.
pub fn opening_prompt(topic: &str, total_rounds: u32, budget: &PromptBudget) -> String {
    format!(
        "{header}\n\
         This is the opening round. Present your position on this topic.\n\
         Structure your response as:\n\
         1. POSITION: Your core stance, grounded in your principles\n\
         2. NON-NEGOTIABLES: What you will not compromise on\n\
         3. FLEXIBLE AREAS: Where you are open to synthesis\n\n\
         Keep your response under {words} words.",
        header = round_header(1, total_rounds, topic),
        words = budget.agent_words,
    )
}

/// Rounds 2..N. `counterpart_summary` is the condensed previous position of
/// the other agent, never its raw text.
pub fn round_prompt(
    topic: &str,
    round: u32,
    total_rounds: u32,
    counterpart_name: &str,
    counterpart_summary: &str,
    budget: &PromptBudget,
) -> String {
    format!(
        "{header}\n\
         {counterpart_name}'s position summary:\n\
         \"{counterpart_summary}\"\n\n\
         Respond to this position while staying true to your axioms.\n\
         Structure your response as:\n\
         1. RESPONSE: Where you agree, disagree, or see hidden connections\n\
         2. REVISED POSITION: Your updated stance after considering their view\n\
         3. SYNTHESIS OPPORTUNITY: What a third option might look like, neither consensus nor compromise\n\n\
         Keep your response under {words} words.",
        header = round_header(round, total_rounds, topic),
        words = budget.agent_words,
    )
}

// ---------------------------------------------------------------------------
// Shared axioms
// ---------------------------------------------------------------------------

/// Minimum weight an axiom needs in both profiles to bind the arbiter.
pub const SHARED_AXIOM_THRESHOLD: f64 = 0.5;

/// An axiom both principals hold at or above [`SHARED_AXIOM_THRESHOLD`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedAxiom {
    pub id: String,
    pub title: String,
    pub principle: String,
    pub source_text: Option<String>,
    pub average_weight: f64,
}

/// Shared axioms by descending average weight, ties broken by id.
pub fn shared_axioms(a: &AgentProfile, b: &AgentProfile) -> Vec<SharedAxiom> {
    let mut shared: Vec<SharedAxiom> = a
        .axiom_weights
        .values()
        .filter(|ax| ax.weight >= SHARED_AXIOM_THRESHOLD)
        .filter_map(|ax_a| {
            let ax_b = b.axiom_weights.get(&ax_a.id)?;
            (ax_b.weight >= SHARED_AXIOM_THRESHOLD).then(|| SharedAxiom {
                id: ax_a.id.clone(),
                title: ax_a.title.clone(),
                principle: ax_a.principle.clone(),
                source_text: ax_a.source_text.clone().or_else(|| ax_b.source_text.clone()),
                average_weight: (ax_a.weight + ax_b.weight) / 2.0,
            })
        })
        .collect();
    shared.sort_by(|x, y| {
        y.average_weight
            .total_cmp(&x.average_weight)
            .then_with(|| x.id.cmp(&y.id))
    });
    shared
}

// ---------------------------------------------------------------------------
// Synthesis
// ---------------------------------------------------------------------------

/// Inputs for the arbiter call.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisInput<'a> {
    pub topic: &'a str,
    pub agent_a: &'a AgentProfile,
    pub agent_b: &'a AgentProfile,
    /// Persona the arbiter speaks as, if any.
    pub arbiter: Option<&'a AgentProfile>,
    pub final_a: &'a str,
    pub final_b: &'a str,
    pub rounds: u32,
    pub mode: RunMode,
    pub timestamp: DateTime<Utc>,
}

fn top_axiom_label(profile: &AgentProfile) -> String {
    match profile.top_axiom() {
        Some(ax) => format!("{}: {}", profile.top_axiom_id, ax.title),
        None => profile.top_axiom_id.clone(),
    }
}

/// The JSON skeleton the arbiter must fill in.
fn artifact_contract(input: &SynthesisInput<'_>) -> String {
    let contract = json!({
        "nucleus": {
            "title": "A concise title for the joint position",
            "content": "The synthesized position (2-4 paragraphs). Must honor BOTH agents' top axioms without diluting either.",
            "type": "SOLUTION"
        },
        "shell": {
            "topic": input.topic,
            "type": "joint-position",
            "status": "draft",
            "tags": ["negotiation", "positive-sum", "principled-friction"],
            "axioms_honored": ["axiom IDs reflected in the synthesis"],
            "axioms_tensioned": ["axiom IDs where productive tension remains"]
        },
        "corona": {
            "harmonizes_with": ["axiom IDs the joint position harmonizes with"],
            "disrupts": ["axiom IDs where the joint position creates productive disruption"],
            "relations": [{ "type": "extends", "target": "a related concept" }],
            "tension_score": 0.0
        },
        "echo": {
            "provenance": "parley-negotiation",
            "participants": [input.agent_a.name, input.agent_b.name],
            "rounds": input.rounds,
            "timestamp": input.timestamp.to_rfc3339(),
            "mode": input.mode.to_string(),
            "method": "positive-sum-synthesis"
        }
    });
    // Serializing a literal Value cannot fail.
    serde_json::to_string_pretty(&contract).unwrap_or_default()
}

/// System and user prompt for the arbiter.
pub fn synthesis_prompt(input: &SynthesisInput<'_>, budget: &PromptBudget) -> Prompt {
    let shared = shared_axioms(input.agent_a, input.agent_b);
    let shared_block = if shared.is_empty() {
        "  (none: the agents share no axiom weighted 0.5 or higher by both)".to_string()
    } else {
        shared
            .iter()
            .map(|ax| {
                let mut line = format!(
                    "  {} (avg {:.2}) : {}: {}",
                    ax.id, ax.average_weight, ax.title, ax.principle
                );
                if let Some(source) = &ax.source_text {
                    line.push_str(&format!("\n    \"{source}\""));
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let persona = match input.arbiter {
        Some(arbiter) if !arbiter.role.is_empty() => {
            format!("You are {}, {}, acting as the Synthesis Engine.", arbiter.name, arbiter.role)
        }
        Some(arbiter) => format!("You are {}, acting as the Synthesis Engine.", arbiter.name),
        None => "You are the Synthesis Engine.".to_string(),
    };

    let system = format!(
        "{persona}\n\n\
         Two agents have just completed a {rounds}-round negotiation. Your job is to produce a JOINT ARTIFACT: \
         a single knowledge artifact that captures the positive-sum outcome of their exchange.\n\n\
         Agent A: {name_a} (top axiom: {top_a})\n\
         Agent B: {name_b} (top axiom: {top_b})\n\n\
         === ARBITER CONSTRAINTS (Shared Axioms) ===\n\
         You are NOT a neutral blank slate. You are constrained by the axioms that BOTH agents weight 0.5 or higher.\n\
         These are your guardrails. The synthesis must honor these shared commitments:\n\n\
         {shared_block}\n\n\
         Your synthesis MUST demonstrably serve these shared axioms. A synthesis that violates any of them has failed.\n\n\
         === OUTPUT FORMAT ===\n\
         Output a valid JSON object with exactly this structure (no markdown fencing, no extra text):\n\n\
         {contract}\n\n\
         === RULES ===\n\
         1. The nucleus content must NOT average or water down either position. Find the third option: a new frame that gives both agents more than they had alone.\n\
         2. tension_score is 0.0 (perfect harmony) to 1.0 (maximum productive friction). Rate honestly.\n\
         3. axioms_honored lists axioms both agents would agree are well served by the synthesis.\n\
         4. axioms_tensioned lists axioms that remain in productive tension, neither resolved nor abandoned.\n\
         5. Keep the nucleus content under {words} words.\n\
         6. Output ONLY the JSON object. No preamble, no explanation.",
        rounds = input.rounds,
        name_a = input.agent_a.name,
        name_b = input.agent_b.name,
        top_a = top_axiom_label(input.agent_a),
        top_b = top_axiom_label(input.agent_b),
        contract = artifact_contract(input),
        words = budget.synthesis_words,
    );

    let user = format!(
        "Topic: \"{topic}\"\n\n\
         --- {name_a}'s final position ---\n{final_a}\n\n\
         --- {name_b}'s final position ---\n{final_b}\n\n\
         Produce the joint artifact as JSON.",
        topic = input.topic,
        name_a = input.agent_a.name,
        name_b = input.agent_b.name,
        final_a = input.final_a,
        final_b = input.final_b,
    );

    Prompt { system, user }
}

// ---------------------------------------------------------------------------
// Stress test
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct StressTestInput<'a> {
    pub topic: &'a str,
    pub name_a: &'a str,
    pub final_a: &'a str,
    pub name_b: &'a str,
    pub final_b: &'a str,
    pub synthesis: &'a str,
}

pub fn stress_test_prompt(input: &StressTestInput<'_>, budget: &PromptBudget) -> String {
    format!(
        "A joint artifact was produced from a negotiation. Your task: \
         interrogate it for hidden assumptions, failure modes, and blind spots.\n\n\
         Topic: \"{topic}\"\n\n\
         --- {name_a}'s final position ---\n{final_a}\n\n\
         --- {name_b}'s final position ---\n{final_b}\n\n\
         --- Joint artifact ---\n{synthesis}\n\n\
         Structure your stress test:\n\
         1. LOAD-BEARING ASSUMPTIONS: What must remain true for this artifact to hold?\n\
         2. FAILURE MODES: What breaks under scale, adversarial conditions, or time?\n\
         3. VERDICT: PASS (robust), CONDITIONAL PASS (needs work), or FAIL (fragile)\n\n\
         Keep your response under {words} words.",
        topic = input.topic,
        name_a = input.name_a,
        final_a = input.final_a,
        name_b = input.name_b,
        final_b = input.final_b,
        synthesis = input.synthesis,
        words = budget.stress_test_words,
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ProfileStore;

    fn profile(id: &str, axioms: &[(&str, f64)], top: &str) -> AgentProfile {
        let mut text = format!(
            "name = \"{id}\"\ntop_axiom = \"{top}\"\nnon_negotiable = \"Hold {top}.\"\n"
        );
        for (axiom, weight) in axioms {
            text.push_str(&format!(
                "\n[axioms.{axiom}]\ntitle = \"Title {axiom}\"\nprinciple = \"Principle {axiom}\"\nweight = {weight:?}\n"
            ));
        }
        AgentProfile::from_toml_str(id, &text).unwrap()
    }

    #[test]
    fn weight_bar_has_ten_cells() {
        assert_eq!(weight_bar(0.0), "░░░░░░░░░░");
        assert_eq!(weight_bar(1.0), "██████████");
        assert_eq!(weight_bar(0.6), "██████░░░░");
        assert_eq!(weight_bar(0.34).chars().count(), 10);
    }

    #[test]
    fn system_prompt_orders_axioms_and_states_constraint() {
        let boolean = ProfileStore::builtin().load("boolean").unwrap();
        let prompt = system_prompt(&boolean, &PromptBudget::default());

        assert!(prompt.starts_with("You are Boolean, the Architect of Third Options."));
        let pos_top = prompt.find("PHIL-005 [").unwrap();
        let pos_low = prompt.find("PHIL-004 [").unwrap();
        assert!(pos_top < pos_low, "axioms must be sorted by weight");
        assert!(prompt.contains("Your top axiom is PHIL-005 (Door Number 3, weight 0.95)."));
        assert!(prompt.contains(&boolean.non_negotiable_text));
        assert!(prompt.contains("reframe rather than"));
        assert!(prompt.contains("under 300 words"));
    }

    #[test]
    fn opening_prompt_has_no_prior_context() {
        let prompt = opening_prompt("Remote work", 3, &PromptBudget::default());
        assert!(prompt.starts_with("NEGOTIATION ROUND 1 of 3\nTopic: \"Remote work\""));
        assert!(prompt.contains("POSITION"));
        assert!(prompt.contains("NON-NEGOTIABLES"));
        assert!(prompt.contains("FLEXIBLE AREAS"));
        assert!(!prompt.contains("position summary"));
    }

    #[test]
    fn round_prompt_embeds_counterpart_summary() {
        let budget = PromptBudget {
            agent_words: 150,
            ..PromptBudget::default()
        };
        let prompt = round_prompt("Remote work", 2, 3, "Roux", "Soil first.", &budget);
        assert!(prompt.starts_with("NEGOTIATION ROUND 2 of 3"));
        assert!(prompt.contains("Roux's position summary:\n\"Soil first.\""));
        assert!(prompt.contains("REVISED POSITION"));
        assert!(prompt.contains("SYNTHESIS OPPORTUNITY"));
        assert!(prompt.contains("under 150 words"));
    }

    #[test]
    fn shared_axioms_require_both_weights_at_threshold() {
        let a = profile("a", &[("X", 0.5), ("Y", 0.9), ("Z", 0.8)], "Y");
        let b = profile("b", &[("X", 0.7), ("Y", 0.49), ("W", 0.9)], "W");
        let shared = shared_axioms(&a, &b);
        assert_eq!(shared.len(), 1);
        assert_eq!(shared[0].id, "X");
        assert!((shared[0].average_weight - 0.6).abs() < 1e-9);
    }

    #[test]
    fn shared_axioms_sort_by_average_then_id() {
        let a = profile("a", &[("B", 0.6), ("A", 0.6), ("C", 1.0)], "C");
        let b = profile("b", &[("B", 0.6), ("A", 0.6), ("C", 0.9)], "C");
        let ids: Vec<String> = shared_axioms(&a, &b).into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["C", "A", "B"]);
    }

    #[test]
    fn builtin_principals_share_expected_axioms() {
        let store = ProfileStore::builtin();
        let shared = shared_axioms(&store.load("boolean").unwrap(), &store.load("roux").unwrap());
        let ids: Vec<&str> = shared.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["PHIL-003", "PHIL-001", "PHIL-007"]);
    }

    #[test]
    fn synthesis_prompt_binds_arbiter_to_shared_axioms() {
        let a = profile("alpha", &[("S", 0.6), ("A", 0.9)], "A");
        let b = profile("beta", &[("S", 0.6), ("B", 0.9)], "B");
        let input = SynthesisInput {
            topic: "Should AI negotiate on behalf of humans?",
            agent_a: &a,
            agent_b: &b,
            arbiter: None,
            final_a: "alpha final",
            final_b: "beta final",
            rounds: 3,
            mode: RunMode::Parallel,
            timestamp: Utc::now(),
        };
        let prompt = synthesis_prompt(&input, &PromptBudget::default());

        assert!(prompt.system.starts_with("You are the Synthesis Engine."));
        assert!(prompt.system.contains("S (avg 0.60)"));
        assert!(!prompt.system.contains("A (avg"));
        assert!(prompt.system.contains("has failed"));
        assert!(prompt.system.contains("must NOT average"));
        assert!(prompt.system.contains("\"nucleus\""));
        assert!(prompt.system.contains("\"corona\""));
        assert!(prompt.system.contains("\"participants\""));
        assert!(prompt.system.contains("under 400 words"));
        assert!(prompt.user.contains("alpha final"));
        assert!(prompt.user.contains("beta final"));
    }

    #[test]
    fn synthesis_prompt_uses_arbiter_persona() {
        let store = ProfileStore::builtin();
        let a = store.load("boolean").unwrap();
        let b = store.load("roux").unwrap();
        let loom = store.load("loom").unwrap();
        let input = SynthesisInput {
            topic: "t",
            agent_a: &a,
            agent_b: &b,
            arbiter: Some(&loom),
            final_a: "",
            final_b: "",
            rounds: 3,
            mode: RunMode::Sequential,
            timestamp: Utc::now(),
        };
        let prompt = synthesis_prompt(&input, &PromptBudget::default());
        assert!(prompt.system.starts_with("You are Loom, the Impartial Weaver, acting as the Synthesis Engine."));
        assert!(prompt.system.contains("\"sequential\""));
    }

    #[test]
    fn stress_test_prompt_asks_for_verdict() {
        let input = StressTestInput {
            topic: "t",
            name_a: "Boolean",
            final_a: "fa",
            name_b: "Roux",
            final_b: "fb",
            synthesis: "{\"nucleus\":{}}",
        };
        let prompt = stress_test_prompt(&input, &PromptBudget::default());
        assert!(prompt.contains("LOAD-BEARING ASSUMPTIONS"));
        assert!(prompt.contains("FAILURE MODES"));
        assert!(prompt.contains("scale, adversarial conditions, or time"));
        assert!(prompt.contains("PASS (robust), CONDITIONAL PASS (needs work), or FAIL (fragile)"));
        assert!(prompt.contains("--- Joint artifact ---\n{\"nucleus\":{}}"));
    }
}
