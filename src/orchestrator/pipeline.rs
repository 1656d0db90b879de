use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info};

use super::runner::PhaseRunner;
use crate::agent::PhaseAgent;
use crate::config::Config;
use crate::errors::{ConfigError, PipelineError};
use crate::gates::validate_phase_result;
use crate::phase::Phase;
use crate::state::{ProgressLog, ProgressRecord, ResultStore};

/// Drives the fixed phase sequence for one project.
///
/// Phases run one at a time and are never retried. A phase that yields no
/// result, raises, or fails its gate stops the run.
pub struct Orchestrator {
    config: Config,
    agent: Arc<dyn PhaseAgent>,
    results: ResultStore,
    progress: ProgressLog,
}

impl Orchestrator {
    /// File-backed stores under the configured working directory.
    pub fn new(config: Config, agent: Arc<dyn PhaseAgent>) -> Self {
        let results = ResultStore::new(&config.work_dir);
        let progress = ProgressLog::open(&config.work_dir);
        Self::with_stores(config, agent, results, progress)
    }

    pub fn with_stores(
        config: Config,
        agent: Arc<dyn PhaseAgent>,
        results: ResultStore,
        progress: ProgressLog,
    ) -> Self {
        Self {
            config,
            agent,
            results,
            progress,
        }
    }

    pub fn from_config_file(path: &Path, agent: Arc<dyn PhaseAgent>) -> Result<Self, ConfigError> {
        let config = Config::load(path)?;
        Ok(Self::new(config, agent))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn results(&self) -> &ResultStore {
        &self.results
    }

    pub fn progress(&self) -> &ProgressLog {
        &self.progress
    }

    /// Run every phase in order. Starts a fresh progress record.
    pub async fn run(&self) -> Result<(), PipelineError> {
        self.progress.init(&self.config.project_name)?;
        info!(project = %self.config.project_name, "pipeline started");

        for phase in Phase::ALL {
            self.run_phase(phase).await?;
        }

        info!(project = %self.config.project_name, "pipeline completed");
        Ok(())
    }

    async fn run_phase(&self, phase: Phase) -> Result<(), PipelineError> {
        info!(phase = %phase, "starting phase");
        let runner = PhaseRunner::new(phase, &self.config, &self.results, &self.progress);
        let Some(result) = runner.run(self.agent.as_ref()).await? else {
            return Err(PipelineError::NoResult { phase });
        };

        if phase.is_gated() {
            validate_phase_result(phase, &result)?;
            debug!(phase = %phase, "gate passed");
        }

        self.results
            .save(phase, &result)
            .map_err(|error| PipelineError::Persist { phase, error })?;
        info!(phase = %phase, "phase passed");
        Ok(())
    }

    /// Run the pipeline and report only whether it succeeded. The reason for a
    /// failure is logged and remains in the progress record.
    pub async fn run_pipeline(&self) -> bool {
        match self.run().await {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "pipeline failed");
                false
            }
        }
    }

    /// Current progress record, or `None` if no run has started.
    pub fn status(&self) -> Result<Option<ProgressRecord>> {
        self.progress.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::PhaseState;
    use crate::tools::ToolSurface;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Replies from a fixed table and remembers which phases it was asked for.
    struct TableAgent {
        replies: Vec<(Phase, Value)>,
        calls: Mutex<Vec<Phase>>,
    }

    impl TableAgent {
        fn new(replies: Vec<(Phase, Value)>) -> Self {
            Self {
                replies,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PhaseAgent for TableAgent {
        async fn execute(&self, phase: Phase, _tools: &ToolSurface<'_>) -> Result<Option<Value>> {
            self.calls.lock().unwrap().push(phase);
            Ok(self
                .replies
                .iter()
                .find(|(p, _)| *p == phase)
                .map(|(_, v)| v.clone()))
        }
    }

    fn config_in(dir: &Path) -> Config {
        Config::from_json(
            &json!({
                "project_name": "pipeline-unit",
                "work_dir": dir,
                "repositories": [{"name": "r", "url": "u", "branch": "main", "language": "javascript"}],
                "rest_endpoints": [{"id": "e", "method": "GET", "path": "/e", "patterns": ["/e"]}],
                "attribute_mappings": [],
                "graphql_endpoint": "http://localhost/graphql",
                "graphql_schema_path": "schema.graphql"
            })
            .to_string(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_status_before_any_run() {
        let dir = tempdir().unwrap();
        let agent = Arc::new(TableAgent::new(vec![]));
        let orchestrator = Orchestrator::new(config_in(dir.path()), agent);
        assert!(orchestrator.status().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_gate_failure_halts_before_next_phase() {
        let dir = tempdir().unwrap();
        let agent = Arc::new(TableAgent::new(vec![
            (Phase::Discovery, json!({"phase": "discovery", "usages": [{"file": "a.js"}]})),
            (Phase::Narrowing, json!({"phase": "narrowing", "narrowed_usages": []})),
        ]));
        let orchestrator = Orchestrator::new(config_in(dir.path()), agent.clone());

        let err = orchestrator.run().await.unwrap_err();
        assert!(matches!(err, PipelineError::Gate(ref g) if g.phase == Phase::Narrowing));
        assert_eq!(*agent.calls.lock().unwrap(), vec![Phase::Discovery, Phase::Narrowing]);

        assert!(orchestrator.results().get(Phase::Discovery).unwrap().is_some());
        assert!(orchestrator.results().get(Phase::Narrowing).unwrap().is_none());

        let record = orchestrator.status().unwrap().unwrap();
        assert_eq!(record.state_of(Phase::Narrowing), Some(PhaseState::Completed));
        assert_eq!(record.state_of(Phase::Generation), None);
    }

    #[tokio::test]
    async fn test_missing_result_halts_with_no_result() {
        let dir = tempdir().unwrap();
        let agent = Arc::new(TableAgent::new(vec![]));
        let orchestrator = Orchestrator::new(config_in(dir.path()), agent);

        let err = orchestrator.run().await.unwrap_err();
        assert!(matches!(err, PipelineError::NoResult { phase: Phase::Discovery }));
        assert!(!orchestrator.run_pipeline().await);

        let record = orchestrator.status().unwrap().unwrap();
        assert_eq!(record.project, "pipeline-unit");
        assert_eq!(record.state_of(Phase::Discovery), Some(PhaseState::Failed));
    }

    #[tokio::test]
    async fn test_run_resets_previous_history() {
        let dir = tempdir().unwrap();
        let agent = Arc::new(TableAgent::new(vec![]));
        let orchestrator = Orchestrator::new(config_in(dir.path()), agent);
        orchestrator.progress().mark_completed(Phase::Validation, "stale").unwrap();

        assert!(!orchestrator.run_pipeline().await);
        let record = orchestrator.status().unwrap().unwrap();
        assert!(record.phase(Phase::Validation).is_none());
    }
}
