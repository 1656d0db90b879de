//! Typed contracts for the results each phase's collaborator produces.
//!
//! Results arrive as raw JSON from a non-deterministic producer. The gates in
//! [`crate::gates`] only check structure; these types are the full shape that
//! downstream consumers decode into.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::phase::Phase;

/// A REST endpoint call site found in a target repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointUsage {
    pub endpoint_id: String,
    pub repo: String,
    pub file: String,
    pub line: u32,
    pub snippet: String,
    pub language: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

/// A usage that survived narrowing, with the attribute mappings it touches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrowedUsage {
    pub endpoint_id: String,
    pub repo: String,
    pub file: String,
    pub line: u32,
    pub snippet: String,
    pub language: String,
    pub matched_mappings: Vec<String>,
    pub complexity: Complexity,
}

/// Replacement code generated for one narrowed usage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedMigration {
    pub endpoint_id: String,
    pub repo: String,
    pub file: String,
    pub graphql_query: String,
    pub new_code: String,
    #[serde(default)]
    pub imports: Vec<String>,
}

/// Outcome of applying one generated migration to a checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedMigration {
    pub endpoint_id: String,
    pub repo: String,
    pub file: String,
    pub applied: bool,
    pub diff: String,
    pub branch: String,
    pub commit: String,
}

/// One normalized pass/fail record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationCheck {
    pub check_name: String,
    pub passed: bool,
    pub details: String,
}

impl ValidationCheck {
    pub fn new(check_name: impl Into<String>, passed: bool, details: impl Into<String>) -> Self {
        Self {
            check_name: check_name.into(),
            passed,
            details: details.into(),
        }
    }
}

/// A phase result, discriminated by its `phase` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "lowercase")]
pub enum PhaseResult {
    Discovery {
        timestamp: String,
        usages: Vec<EndpointUsage>,
    },
    Narrowing {
        timestamp: String,
        narrowed_usages: Vec<NarrowedUsage>,
    },
    Generation {
        timestamp: String,
        generated_migrations: Vec<GeneratedMigration>,
    },
    Migration {
        timestamp: String,
        applied_migrations: Vec<AppliedMigration>,
    },
    Validation {
        timestamp: String,
        checks: Vec<ValidationCheck>,
    },
}

impl PhaseResult {
    /// Decode a raw result document into its typed variant.
    pub fn decode(value: Value) -> Result<Self> {
        serde_json::from_value(value).context("Result does not match any phase contract")
    }

    pub fn phase(&self) -> Phase {
        match self {
            PhaseResult::Discovery { .. } => Phase::Discovery,
            PhaseResult::Narrowing { .. } => Phase::Narrowing,
            PhaseResult::Generation { .. } => Phase::Generation,
            PhaseResult::Migration { .. } => Phase::Migration,
            PhaseResult::Validation { .. } => Phase::Validation,
        }
    }

    pub fn timestamp(&self) -> &str {
        match self {
            PhaseResult::Discovery { timestamp, .. }
            | PhaseResult::Narrowing { timestamp, .. }
            | PhaseResult::Generation { timestamp, .. }
            | PhaseResult::Migration { timestamp, .. }
            | PhaseResult::Validation { timestamp, .. } => timestamp,
        }
    }

    pub fn item_count(&self) -> usize {
        match self {
            PhaseResult::Discovery { usages, .. } => usages.len(),
            PhaseResult::Narrowing {
                narrowed_usages, ..
            } => narrowed_usages.len(),
            PhaseResult::Generation {
                generated_migrations,
                ..
            } => generated_migrations.len(),
            PhaseResult::Migration {
                applied_migrations,
                ..
            } => applied_migrations.len(),
            PhaseResult::Validation { checks, .. } => checks.len(),
        }
    }

    /// Build a validation result stamped with the current time.
    pub fn validation(checks: Vec<ValidationCheck>) -> Self {
        PhaseResult::Validation {
            timestamp: chrono::Utc::now().to_rfc3339(),
            checks,
        }
    }
}
