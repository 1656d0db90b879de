//! Structural gates between pipeline phases.
//!
//! A gate is a cheap firewall against a non-deterministic producer: it checks
//! that a raw result is a mapping tagged with the right phase and that its
//! item collection is a non-empty list. It never judges whether the content
//! is semantically correct, and it never mutates the result.

use serde::Deserialize;
use serde_json::Value;

use crate::errors::GateError;
use crate::phase::Phase;

/// Shape every gated result must decode into. Items stay untyped.
#[derive(Deserialize)]
#[serde(tag = "phase", rename_all = "lowercase")]
enum Envelope {
    Discovery {
        #[serde(default)]
        usages: Option<Vec<Value>>,
    },
    Narrowing {
        #[serde(default)]
        narrowed_usages: Option<Vec<Value>>,
    },
    Generation {
        #[serde(default)]
        generated_migrations: Option<Vec<Value>>,
    },
    #[serde(other)]
    Ungated,
}

fn decode(phase: Phase, result: &Value) -> Result<Vec<Value>, GateError> {
    let label = capitalized(phase);
    if !result.is_object() {
        return Err(GateError::new(
            phase,
            format!("{label} result must be a mapping"),
        ));
    }
    if result.get("phase").and_then(Value::as_str) != Some(phase.as_str()) {
        return Err(GateError::new(
            phase,
            format!("{label} result must have phase='{phase}'"),
        ));
    }

    let envelope = Envelope::deserialize(result).map_err(|e| {
        GateError::new(
            phase,
            format!("{label} result has a malformed {}: {e}", phase.items_key()),
        )
    })?;

    let items = match envelope {
        Envelope::Discovery { usages } => usages,
        Envelope::Narrowing { narrowed_usages } => narrowed_usages,
        Envelope::Generation {
            generated_migrations,
        } => generated_migrations,
        Envelope::Ungated => None,
    };
    Ok(items.unwrap_or_default())
}

fn capitalized(phase: Phase) -> String {
    let name = phase.as_str();
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn non_blank(item: &Value, field: &str) -> bool {
    item.get(field)
        .and_then(Value::as_str)
        .is_some_and(|s| !s.trim().is_empty())
}

pub fn validate_discovery_gate(result: &Value) -> Result<(), GateError> {
    let usages = decode(Phase::Discovery, result)?;
    if usages.is_empty() {
        return Err(GateError::new(
            Phase::Discovery,
            "Discovery must find at least one usage",
        ));
    }
    Ok(())
}

pub fn validate_narrowing_gate(result: &Value) -> Result<(), GateError> {
    let usages = decode(Phase::Narrowing, result)?;
    if usages.is_empty() {
        return Err(GateError::new(
            Phase::Narrowing,
            "Narrowing must produce at least one narrowed usage",
        ));
    }
    Ok(())
}

pub fn validate_generation_gate(result: &Value) -> Result<(), GateError> {
    let migrations = decode(Phase::Generation, result)?;
    if migrations.is_empty() {
        return Err(GateError::new(
            Phase::Generation,
            "Generation must produce at least one migration",
        ));
    }
    for migration in &migrations {
        if !non_blank(migration, "graphql_query") {
            return Err(GateError::new(
                Phase::Generation,
                "All migrations must have non-empty graphql_query",
            ));
        }
        if !non_blank(migration, "new_code") {
            return Err(GateError::new(
                Phase::Generation,
                "All migrations must have non-empty new_code",
            ));
        }
    }
    Ok(())
}

/// Apply the gate for `phase`. Migration and validation pass unconditionally.
pub fn validate_phase_result(phase: Phase, result: &Value) -> Result<(), GateError> {
    match phase {
        Phase::Discovery => validate_discovery_gate(result),
        Phase::Narrowing => validate_narrowing_gate(result),
        Phase::Generation => validate_generation_gate(result),
        Phase::Migration | Phase::Validation => Ok(()),
    }
}
