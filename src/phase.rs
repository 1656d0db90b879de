//! Phase definitions for the migration pipeline.
//!
//! The pipeline runs a fixed sequence of five phases. Each phase produces one
//! result document whose items live under a phase-specific collection key.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One named stage of the migration workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Discovery,
    Narrowing,
    Generation,
    Migration,
    Validation,
}

impl Phase {
    /// All phases in pipeline order.
    pub const ALL: [Phase; 5] = [
        Phase::Discovery,
        Phase::Narrowing,
        Phase::Generation,
        Phase::Migration,
        Phase::Validation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Discovery => "discovery",
            Phase::Narrowing => "narrowing",
            Phase::Generation => "generation",
            Phase::Migration => "migration",
            Phase::Validation => "validation",
        }
    }

    /// Whether a structural gate must pass before the pipeline advances.
    ///
    /// Migration and validation are terminal: their correctness is carried in
    /// their own content rather than checked as a pre-condition.
    pub fn is_gated(&self) -> bool {
        matches!(
            self,
            Phase::Discovery | Phase::Narrowing | Phase::Generation
        )
    }

    /// Name of the item collection inside this phase's result document.
    pub fn items_key(&self) -> &'static str {
        match self {
            Phase::Discovery => "usages",
            Phase::Narrowing => "narrowed_usages",
            Phase::Generation => "generated_migrations",
            Phase::Migration => "applied_migrations",
            Phase::Validation => "checks",
        }
    }

    /// The phase that runs immediately before this one, if any.
    pub fn previous(&self) -> Option<Phase> {
        let idx = Phase::ALL.iter().position(|p| p == self)?;
        idx.checked_sub(1).map(|i| Phase::ALL[i])
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phase::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Unknown phase '{}'", s))
    }
}
