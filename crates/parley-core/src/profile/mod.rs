//! Agent profile store.
//!
//! A profile is a TOML document describing one negotiating agent: identity,
//! weighted axioms, the non-negotiable top axiom and the backend it would
//! like to run on. A profile directory is searched first; the built-in
//! library embedded at compile time is the fallback.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::backend::BackendId;

/// `(id, toml)` for every built-in profile.
static BUILTIN_PROFILES: &[(&str, &str)] = &[
    ("boolean", include_str!("builtin/boolean.toml")),
    ("loom", include_str!("builtin/loom.toml")),
    ("roux", include_str!("builtin/roux.toml")),
    ("seer", include_str!("builtin/seer.toml")),
];

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One named principle with the agent's strength of commitment to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxiomWeight {
    pub id: String,
    pub title: String,
    pub principle: String,
    /// In `[0, 1]`.
    pub weight: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_text: Option<String>,
}

/// A validated agent profile. Never mutated after loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Store id the profile was loaded under (e.g. `boolean`).
    pub id: String,
    pub name: String,
    pub role: String,
    pub description: String,
    pub axiom_weights: BTreeMap<String, AxiomWeight>,
    /// Always a key of `axiom_weights`.
    pub top_axiom_id: String,
    pub non_negotiable_text: String,
    pub preferred_backend: BackendId,
    pub model: String,
    pub linguistic_style: String,
}

impl AgentProfile {
    /// Parse and validate a profile document.
    pub fn from_toml_str(id: &str, text: &str) -> Result<Self, ProfileError> {
        let raw: RawProfile = toml::from_str(text).map_err(|e| ProfileError::Invalid {
            id: id.to_string(),
            reason: e.message().to_string(),
        })?;
        raw.validate(id)
    }

    pub fn top_axiom(&self) -> Option<&AxiomWeight> {
        self.axiom_weights.get(&self.top_axiom_id)
    }

    /// Axioms by descending weight, ties broken by id.
    pub fn sorted_axioms(&self) -> Vec<&AxiomWeight> {
        let mut axioms: Vec<&AxiomWeight> = self.axiom_weights.values().collect();
        axioms.sort_by(|a, b| b.weight.total_cmp(&a.weight).then_with(|| a.id.cmp(&b.id)));
        axioms
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("profile {id:?} not found")]
    NotFound { id: String },

    #[error("profile {id:?} is invalid: {reason}")]
    Invalid { id: String, reason: String },

    #[error("failed to read profile file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ProfileError {
    pub fn diagnosis(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "check the profile id or the profile directory",
            Self::Invalid { .. } => "fix the profile document",
            Self::Io { .. } => "check profile directory permissions",
        }
    }
}

// ---------------------------------------------------------------------------
// TOML shape
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawProfile {
    name: Option<String>,
    role: Option<String>,
    description: Option<String>,
    top_axiom: Option<String>,
    non_negotiable: Option<String>,
    preferred_backend: Option<String>,
    model: Option<String>,
    linguistic_style: Option<String>,
    #[serde(default)]
    axioms: BTreeMap<String, RawAxiom>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawAxiom {
    title: Option<String>,
    principle: Option<String>,
    weight: Option<f64>,
    source: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl RawProfile {
    fn validate(self, id: &str) -> Result<AgentProfile, ProfileError> {
        let invalid = |reason: String| ProfileError::Invalid {
            id: id.to_string(),
            reason,
        };

        if self.axioms.is_empty() {
            return Err(invalid("no axioms defined".into()));
        }

        let mut axiom_weights = BTreeMap::new();
        for (axiom_id, raw) in self.axioms {
            let weight = raw
                .weight
                .ok_or_else(|| invalid(format!("axiom {axiom_id} has no weight")))?;
            if !weight.is_finite() || !(0.0..=1.0).contains(&weight) {
                return Err(invalid(format!(
                    "axiom {axiom_id} weight {weight} is outside [0, 1]"
                )));
            }
            let axiom = AxiomWeight {
                title: non_blank(raw.title).unwrap_or_else(|| axiom_id.clone()),
                principle: raw.principle.unwrap_or_default().trim().to_string(),
                weight,
                source_text: non_blank(raw.source),
                id: axiom_id.clone(),
            };
            axiom_weights.insert(axiom_id, axiom);
        }

        let top_axiom_id =
            non_blank(self.top_axiom).ok_or_else(|| invalid("top_axiom is missing".into()))?;
        let Some(top) = axiom_weights.get(&top_axiom_id) else {
            return Err(invalid(format!(
                "top_axiom {top_axiom_id} is not one of the profile's axioms"
            )));
        };

        let max_weight = axiom_weights
            .values()
            .map(|a| a.weight)
            .fold(f64::MIN, f64::max);
        if top.weight < max_weight {
            warn!(
                profile = id,
                top_axiom = %top_axiom_id,
                top_weight = top.weight,
                max_weight,
                "top axiom does not carry the highest weight"
            );
        }

        let non_negotiable_text = non_blank(self.non_negotiable)
            .ok_or_else(|| invalid("non_negotiable is missing".into()))?;

        let preferred_backend = match non_blank(self.preferred_backend) {
            Some(backend) => backend
                .parse::<BackendId>()
                .map_err(|e| invalid(e.to_string()))?,
            None => BackendId::Anthropic,
        };
        let model = non_blank(self.model)
            .unwrap_or_else(|| preferred_backend.default_model().to_string());

        Ok(AgentProfile {
            id: id.to_string(),
            name: non_blank(self.name).unwrap_or_else(|| id.to_string()),
            role: self.role.unwrap_or_default().trim().to_string(),
            description: self.description.unwrap_or_default().trim().to_string(),
            axiom_weights,
            top_axiom_id,
            non_negotiable_text,
            preferred_backend,
            model,
            linguistic_style: self.linguistic_style.unwrap_or_default().trim().to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Ids are file stems: ASCII letters, digits, `-` and `_`.
fn is_profile_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Resolves profile ids to validated [`AgentProfile`]s.
#[derive(Debug, Clone, Default)]
pub struct ProfileStore {
    dir: Option<PathBuf>,
}

impl ProfileStore {
    /// A store serving only the built-in profiles.
    pub fn builtin() -> Self {
        Self::default()
    }

    /// A store that looks in `dir` before the built-in library.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn load(&self, id: &str) -> Result<AgentProfile, ProfileError> {
        if !is_profile_id(id) {
            return Err(ProfileError::NotFound { id: id.to_string() });
        }

        if let Some(dir) = &self.dir {
            let path = dir.join(format!("{id}.toml"));
            if path.is_file() {
                debug!(profile = id, path = %path.display(), "loading profile from directory");
                let text = std::fs::read_to_string(&path).map_err(|source| ProfileError::Io {
                    path: path.clone(),
                    source,
                })?;
                return AgentProfile::from_toml_str(id, &text);
            }
        }

        match BUILTIN_PROFILES.iter().find(|(builtin_id, _)| *builtin_id == id) {
            Some((_, text)) => AgentProfile::from_toml_str(id, text),
            None => Err(ProfileError::NotFound { id: id.to_string() }),
        }
    }

    /// Every id [`Self::load`] accepts, sorted. Directory files whose stem
    /// is not a valid id are skipped.
    pub fn list(&self) -> Result<Vec<String>, ProfileError> {
        let mut ids: Vec<String> = BUILTIN_PROFILES
            .iter()
            .map(|(id, _)| id.to_string())
            .collect();

        if let Some(dir) = self.dir.as_ref().filter(|d| d.is_dir()) {
            let entries = std::fs::read_dir(dir).map_err(|source| ProfileError::Io {
                path: dir.clone(),
                source,
            })?;
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) == Some("toml") {
                    match path.file_stem().and_then(|s| s.to_str()) {
                        Some(stem) if is_profile_id(stem) => ids.push(stem.to_string()),
                        _ => debug!(path = %path.display(), "skipping file with invalid profile id"),
                    }
                }
            }
        }

        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
