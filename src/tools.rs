//! Capabilities handed to the external collaborator while it works on one phase.

use anyhow::{Context, Result, bail};
use serde_json::Value;
use std::path::PathBuf;

use crate::checkpoint::CheckpointManager;
use crate::config::{AttributeMapping, Config, Repository, RestEndpoint};
use crate::errors::ReportError;
use crate::phase::Phase;
use crate::report::ReportBridge;
use crate::state::{ProgressLog, ResultStore};

/// Read access to configuration and stored results, write access to the
/// current phase's result slot only.
pub struct ToolSurface<'a> {
    phase: Phase,
    config: &'a Config,
    results: &'a ResultStore,
    progress: &'a ProgressLog,
}

impl<'a> ToolSurface<'a> {
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

    pub fn config(&self) -> &Config {
        self.config
    }

    pub fn endpoints(&self) -> &[RestEndpoint] {
        &self.config.rest_endpoints
    }

    pub fn mappings(&self) -> &[AttributeMapping] {
        &self.config.attribute_mappings
    }

    pub fn graphql_schema(&self) -> Result<String> {
        let path = &self.config.graphql_schema_path;
        if !path.exists() {
            bail!("Schema file not found: {}", path.display());
        }
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read schema {}", path.display()))
    }

    /// Overwrite this phase's result slot.
    pub fn save_result(&self, result: &Value) -> Result<()> {
        self.results.save(self.phase, result)
    }

    pub fn result(&self) -> Result<Option<Value>> {
        self.results.get(self.phase)
    }

    /// Stored result of any phase, for reading upstream output.
    pub fn previous_result(&self, phase: Phase) -> Result<Option<Value>> {
        self.results.get(phase)
    }

    /// Audit one external agent session against this phase.
    pub fn record_session(&self, session_id: &str, model: &str, turns: u32) -> Result<()> {
        self.progress
            .add_session_log(self.phase, session_id, model, turns)
    }

    pub fn repo_checkout(&self, repo: &Repository) -> PathBuf {
        self.config.repo_checkout(repo)
    }

    pub fn checkpoints(&self, repo: &Repository) -> CheckpointManager {
        CheckpointManager::new(&self.config.repo_checkout(repo))
    }

    pub fn report_bridge(&self, repo: &Repository) -> Result<ReportBridge, ReportError> {
        ReportBridge::detect(&self.config.repo_checkout(repo))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::PhaseState;
    use serde_json::json;
    use tempfile::tempdir;

    fn config_in(dir: &std::path::Path) -> Config {
        Config::from_json(
            &json!({
                "project_name": "tools-test",
                "work_dir": dir,
                "repositories": [
                    {"name": "svc", "url": "https://example.com/svc.git", "branch": "main", "language": "java"}
                ],
                "rest_endpoints": [
                    {"id": "get-user", "method": "GET", "path": "/users/{id}", "patterns": ["/users/"]}
                ],
                "attribute_mappings": [
                    {"endpoint_id": "get-user", "rest_attribute": "user_name", "graphql_field": "name", "graphql_type": "String"}
                ],
                "graphql_endpoint": "https://api.example.com/graphql",
                "graphql_schema_path": dir.join("schema.graphql")
            })
            .to_string(),
        )
        .unwrap()
    }

    #[test]
    fn test_save_result_writes_only_own_slot() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());
        let results = ResultStore::new(dir.path());
        let progress = ProgressLog::open(dir.path());
        let tools = ToolSurface::new(Phase::Narrowing, &config, &results, &progress);

        let value = json!({"phase": "narrowing", "narrowed_usages": []});
        tools.save_result(&value).unwrap();

        assert_eq!(tools.result().unwrap(), Some(value));
        assert!(tools.previous_result(Phase::Discovery).unwrap().is_none());
        assert_eq!(results.saved_phases(), vec![Phase::Narrowing]);
    }

    #[test]
    fn test_config_accessors() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());
        let results = ResultStore::new(dir.path());
        let progress = ProgressLog::open(dir.path());
        let tools = ToolSurface::new(Phase::Discovery, &config, &results, &progress);

        assert_eq!(tools.endpoints()[0].id, "get-user");
        assert_eq!(tools.mappings()[0].graphql_field, "name");
        let repo = &tools.config().repositories[0];
        assert_eq!(tools.repo_checkout(repo), dir.path().join("repos").join("svc"));
    }

    #[test]
    fn test_graphql_schema_missing_and_present() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());
        let results = ResultStore::new(dir.path());
        let progress = ProgressLog::open(dir.path());
        let tools = ToolSurface::new(Phase::Generation, &config, &results, &progress);

        assert!(tools.graphql_schema().is_err());
        std::fs::write(dir.path().join("schema.graphql"), "type Query { user: User }").unwrap();
        assert!(tools.graphql_schema().unwrap().contains("type Query"));
    }

    #[test]
    fn test_record_session_lands_in_progress_log() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());
        let results = ResultStore::new(dir.path());
        let progress = ProgressLog::open(dir.path());
        progress.init("tools-test").unwrap();
        progress.mark_started(Phase::Discovery).unwrap();

        let tools = ToolSurface::new(Phase::Discovery, &config, &results, &progress);
        tools.record_session("sess-1", "claude-sonnet", 7).unwrap();

        let record = progress.read().unwrap().unwrap();
        let status = record.phase(Phase::Discovery).unwrap();
        assert_eq!(status.status, Some(PhaseState::InProgress));
        assert_eq!(status.sessions.len(), 1);
        assert_eq!(status.sessions[0].turns, 7);
    }

    #[test]
    fn test_report_bridge_requires_build_descriptor() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());
        let results = ResultStore::new(dir.path());
        let progress = ProgressLog::open(dir.path());
        let tools = ToolSurface::new(Phase::Validation, &config, &results, &progress);
        let repo = config.repositories[0].clone();

        assert!(tools.report_bridge(&repo).is_err());

        let checkout = tools.repo_checkout(&repo);
        std::fs::create_dir_all(&checkout).unwrap();
        std::fs::write(checkout.join("build.gradle"), "").unwrap();
        assert!(tools.report_bridge(&repo).is_ok());
        assert_eq!(tools.checkpoints(&repo).repo_path(), checkout);
    }
}
