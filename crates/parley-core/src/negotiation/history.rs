use serde::{Deserialize, Serialize};

use crate::backend::ConversationTurn;
use crate::tension::{count_agreement, count_friction};

/// One agent's turns for a single run. Append-only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationHistory {
    turns: Vec<ConversationTurn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.turns.push(ConversationTurn::user(content));
    }

    pub fn push_agent(&mut self, content: impl Into<String>) {
        self.turns.push(ConversationTurn::agent(content));
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Most recent agent reply.
    pub fn last_agent_output(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|t| t.role == crate::backend::Role::Agent)
            .map(|t| t.content.as_str())
    }
}

/// Both principals' raw outputs for one round. Read-only once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub round_number: u32,
    pub agent_a_output: String,
    pub agent_b_output: String,
    pub friction_marker_count: u32,
    pub agreement_marker_count: u32,
}

impl RoundRecord {
    /// Build a record, counting markers across both outputs.
    pub fn new(round_number: u32, agent_a_output: String, agent_b_output: String) -> Self {
        let combined = format!("{agent_a_output} {agent_b_output}");
        Self {
            round_number,
            friction_marker_count: count_friction(&combined),
            agreement_marker_count: count_agreement(&combined),
            agent_a_output,
            agent_b_output,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_is_append_only_in_order() {
        let mut history = ConversationHistory::new();
        assert!(history.is_empty());
        history.push_user("open");
        history.push_agent("first");
        history.push_user("respond");
        history.push_agent("second");
        assert_eq!(history.len(), 4);
        assert_eq!(history.turns()[2].content, "respond");
        assert_eq!(history.last_agent_output(), Some("second"));
    }

    #[test]
    fn round_record_counts_both_outputs() {
        let record = RoundRecord::new(2, "However, I agree.".into(), "But no.".into());
        assert_eq!(record.round_number, 2);
        assert_eq!(record.friction_marker_count, 2);
        assert_eq!(record.agreement_marker_count, 1);
    }
}
