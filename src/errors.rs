//! Typed error hierarchy for the migration harness.
//!
//! One enum per subsystem:
//! - `ConfigError`: inbound configuration could not be loaded or validated
//! - `GateError`: a phase result failed its structural gate
//! - `PhaseError`: a phase's external collaborator failed
//! - `CheckpointError`: a git savepoint operation failed
//! - `ReportError`: the build/test bridge could not be set up or started
//! - `PipelineError`: why an orchestrated run stopped

use std::path::PathBuf;
use thiserror::Error;

use crate::phase::Phase;

/// Errors loading the inbound migration configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Failed to read config file at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// A phase result failed its structural gate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{phase} gate failed: {reason}")]
pub struct GateError {
    pub phase: Phase,
    pub reason: String,
}

impl GateError {
    pub fn new(phase: Phase, reason: impl Into<String>) -> Self {
        Self {
            phase,
            reason: reason.into(),
        }
    }
}

/// Errors from executing a single phase.
#[derive(Debug, Error)]
pub enum PhaseError {
    #[error("Phase {phase} failed: {error:#}")]
    Agent { phase: Phase, error: anyhow::Error },

    #[error("Failed to record progress for phase {phase}: {error:#}")]
    Progress { phase: Phase, error: anyhow::Error },
}

/// Errors from git savepoint operations.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("{} is not a git repository: {message}", path.display())]
    NotARepository { path: PathBuf, message: String },

    #[error("git {op} failed: {message}")]
    Git { op: &'static str, message: String },
}

impl CheckpointError {
    pub(crate) fn git(op: &'static str) -> impl FnOnce(git2::Error) -> Self {
        move |e| CheckpointError::Git {
            op,
            message: e.message().to_string(),
        }
    }
}

/// Errors setting up or launching the external build/test command.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("No {expected} found in {}", path.display())]
    NotAProject { path: PathBuf, expected: String },

    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Why an orchestrated pipeline run stopped before completing every phase.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Phase {phase} produced no result")]
    NoResult { phase: Phase },

    #[error(transparent)]
    Gate(#[from] GateError),

    #[error(transparent)]
    Phase(#[from] PhaseError),

    #[error("Failed to persist {phase} result: {error:#}")]
    Persist { phase: Phase, error: anyhow::Error },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_not_found_names_path() {
        let err = ConfigError::NotFound {
            path: PathBuf::from("/etc/migration.json"),
        };
        assert_eq!(err.to_string(), "Config file not found: /etc/migration.json");
    }

    #[test]
    fn gate_error_carries_phase_and_reason() {
        let err = GateError::new(Phase::Discovery, "must find at least one usage");
        assert_eq!(err.phase, Phase::Discovery);
        assert!(err.to_string().contains("discovery"));
        assert!(err.to_string().contains("at least one usage"));
    }

    #[test]
    fn phase_error_agent_includes_message() {
        let err = PhaseError::Agent {
            phase: Phase::Generation,
            error: anyhow::anyhow!("boom"),
        };
        assert_eq!(err.to_string(), "Phase generation failed: boom");
    }

    #[test]
    fn pipeline_error_converts_from_gate_error() {
        let gate = GateError::new(Phase::Narrowing, "empty");
        let err: PipelineError = gate.clone().into();
        match &err {
            PipelineError::Gate(g) => assert_eq!(g, &gate),
            _ => panic!("Expected PipelineError::Gate"),
        }
        assert_eq!(err.to_string(), gate.to_string());
    }

    #[test]
    fn checkpoint_error_git_keeps_tool_text() {
        let git_err = git2::Error::from_str("a branch named 'savepoint/x' already exists");
        let err = CheckpointError::git("branch")(git_err);
        assert!(err.to_string().contains("already exists"));
        assert!(matches!(err, CheckpointError::Git { op: "branch", .. }));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&ConfigError::Invalid("x".into()));
        assert_std_error(&GateError::new(Phase::Discovery, "x"));
        assert_std_error(&ReportError::NotAProject {
            path: PathBuf::from("."),
            expected: "build.gradle".into(),
        });
        assert_std_error(&PipelineError::NoResult {
            phase: Phase::Migration,
        });
    }
}
