use serde_json::Value;
use tracing::{info, warn};

use crate::agent::PhaseAgent;
use crate::config::Config;
use crate::errors::PhaseError;
use crate::phase::Phase;
use crate::state::{ProgressLog, ResultStore};
use crate::tools::ToolSurface;

/// Runs a single phase: records its lifecycle around one collaborator call.
///
/// The runner only cares whether a result came back. What the result says is
/// for the gates and later phases to judge.
pub struct PhaseRunner<'a> {
    phase: Phase,
    config: &'a Config,
    results: &'a ResultStore,
    progress: &'a ProgressLog,
}

impl<'a> PhaseRunner<'a> {
    pub fn new(
        phase: Phase,
        config: &'a Config,
        results: &'a ResultStore,
        progress: &'a ProgressLog,
    ) -> Self {
        Self {
            phase,
            config,
            results,
            progress,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub async fn run(&self, agent: &dyn PhaseAgent) -> Result<Option<Value>, PhaseError> {
        let phase = self.phase;
        self.progress
            .mark_started(phase)
            .map_err(|error| PhaseError::Progress { phase, error })?;

        let tools = ToolSurface::new(phase, self.config, self.results, self.progress);
        match agent.execute(phase, &tools).await {
            Ok(result) => {
                let result = result.filter(|value| !is_empty_result(value));
                match &result {
                    Some(value) => {
                        let summary = completion_summary(phase, value);
                        info!(phase = %phase, summary = %summary, "phase completed");
                        self.progress
                            .mark_completed(phase, &summary)
                            .map_err(|error| PhaseError::Progress { phase, error })?;
                    }
                    None => {
                        warn!(phase = %phase, "phase produced no results");
                        self.progress
                            .mark_failed(phase, &format!("Phase {} produced no results", phase))
                            .map_err(|error| PhaseError::Progress { phase, error })?;
                    }
                }
                Ok(result)
            }
            Err(error) => {
                let message = format!("{:#}", error);
                if let Err(e) = self.progress.mark_failed(phase, &message) {
                    warn!(
                        phase = %phase,
                        error = %format!("{:#}", e),
                        "could not record phase failure"
                    );
                }
                Err(PhaseError::Agent { phase, error })
            }
        }
    }
}

/// Null and `{}` count as no result.
fn is_empty_result(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn completion_summary(phase: Phase, result: &Value) -> String {
    match result.get(phase.items_key()).and_then(Value::as_array) {
        Some(items) => format!(
            "Phase {} completed successfully ({} {})",
            phase,
            items.len(),
            phase.items_key()
        ),
        None => format!("Phase {} completed successfully", phase),
    }
}
