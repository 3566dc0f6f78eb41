//! PostgreSQL persistence for completed negotiation runs.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
