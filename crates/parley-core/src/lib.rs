//! Core library for parley: principled multi-agent LLM negotiation.
//!
//! Two principal agents, each defined by a weighted-axiom profile, argue a
//! topic over a fixed number of rounds. An arbiter then synthesizes a joint
//! artifact and an optional critic stress-tests it.

pub mod backend;
pub mod negotiation;
pub mod profile;
pub mod prompt;
pub mod provider;
pub mod report;
pub mod tension;
