//! Provider resolution: which backend actually serves each agent.
//!
//! Resolution is pure. The same profile and credentials always produce the
//! same answer, so the preflight preview and the live run cannot disagree.

pub mod preflight;

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::backend::{BackendId, Credentials, mask_key};
use crate::profile::AgentProfile;

/// Whether an agent runs on the backend it asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderMode {
    Native,
    Fallback,
}

impl fmt::Display for ProviderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Native => "NATIVE",
            Self::Fallback => "FALLBACK",
        })
    }
}

/// The backend, key and model chosen for one agent.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedProvider {
    pub backend: BackendId,
    pub credential: String,
    pub mode: ProviderMode,
    /// The profile's model when native, the backend default otherwise.
    pub model: String,
}

impl fmt::Debug for ResolvedProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedProvider")
            .field("backend", &self.backend)
            .field("credential", &mask_key(&self.credential))
            .field("mode", &self.mode)
            .field("model", &self.model)
            .finish()
    }
}

impl ResolvedProvider {
    /// A native-mode provider on `backend` with its default model.
    pub fn on_backend(backend: BackendId, credentials: &Credentials) -> Option<Self> {
        credentials.get(backend).map(|key| Self {
            backend,
            credential: key.to_string(),
            mode: ProviderMode::Native,
            model: backend.default_model().to_string(),
        })
    }
}

/// Pick a backend for `profile`.
///
/// The preferred backend wins when it has a credential. Otherwise the first
/// backend in [`BackendId::ALL`] order with a credential is returned as a
/// fallback. `None` when no backend has a credential at all.
pub fn resolve(profile: &AgentProfile, credentials: &Credentials) -> Option<ResolvedProvider> {
    let preferred = profile.preferred_backend;
    if let Some(key) = credentials.get(preferred) {
        return Some(ResolvedProvider {
            backend: preferred,
            credential: key.to_string(),
            mode: ProviderMode::Native,
            model: profile.model.clone(),
        });
    }

    BackendId::ALL
        .into_iter()
        .filter(|b| *b != preferred)
        .find_map(|backend| {
            credentials.get(backend).map(|key| ResolvedProvider {
                backend,
                credential: key.to_string(),
                mode: ProviderMode::Fallback,
                model: backend.default_model().to_string(),
            })
        })
}

/// How many distinct backends the resolved agents span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum BrainMode {
    SingleBrain,
    DualBrain,
    TriBrain,
}

impl BrainMode {
    pub fn from_backends<I: IntoIterator<Item = BackendId>>(backends: I) -> Self {
        let distinct: BTreeSet<BackendId> = backends.into_iter().collect();
        match distinct.len() {
            0 | 1 => Self::SingleBrain,
            2 => Self::DualBrain,
            _ => Self::TriBrain,
        }
    }
}

impl fmt::Display for BrainMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SingleBrain => "SINGLE-BRAIN",
            Self::DualBrain => "DUAL-BRAIN",
            Self::TriBrain => "TRI-BRAIN",
        })
    }
}
