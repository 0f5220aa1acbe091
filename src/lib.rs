//! Fraud-risk scoring for healthcare provider billing.
//!
//! Three analyzers (behavioral timing, licensed-capacity overages, kickback
//! indicators) turn one provider's claim history into findings and module
//! scores; the composite scorer weights them into a single 0-100 score with a
//! severity tier, and sweeps rank whole provider populations by that score.
//! A peer comparison places a provider's billing against its cohort as
//! advisory context.

pub mod behavioral;
pub mod capacity;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod kickback;
pub mod models;
pub mod peers;
pub mod risk;
pub mod store;
pub mod sweep;

#[cfg(test)]
mod fixtures;

pub use config::ScoringConfig;
pub use engine::RiskEngine;
pub use error::{EngineError, EngineResult};
pub use store::{ClaimStore, InMemoryStore};
pub use sweep::SweepRequest;
