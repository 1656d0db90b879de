use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde_json::Value;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::PhaseAgent;
use super::stream::{ContentBlock, StreamEvent, describe_tool_use};
use crate::checkpoint::{Checkpointer, savepoint_name};
use crate::phase::Phase;
use crate::schema::ValidationCheck;
use crate::tools::ToolSurface;
use crate::util::extract_json_object;

/// How to invoke the Claude CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaudeSettings {
    pub claude_cmd: String,
    pub skip_permissions: bool,
}

impl Default for ClaudeSettings {
    fn default() -> Self {
        Self {
            claude_cmd: "claude".to_string(),
            skip_permissions: true,
        }
    }
}

impl ClaudeSettings {
    /// `CLAUDE_CMD` overrides the executable; `SKIP_PERMISSIONS=false` keeps
    /// permission prompts on.
    pub fn from_env() -> Self {
        let claude_cmd = std::env::var("CLAUDE_CMD").unwrap_or_else(|_| "claude".to_string());
        let skip_permissions = std::env::var("SKIP_PERMISSIONS")
            .map(|v| v != "false")
            .unwrap_or(true);
        Self {
            claude_cmd,
            skip_permissions,
        }
    }

    pub fn flags(&self, model: &str, max_turns: u32) -> Vec<String> {
        let mut flags = Vec::new();
        if self.skip_permissions {
            flags.push("--dangerously-skip-permissions".to_string());
        }
        flags.push("--print".to_string());
        flags.push("--output-format".to_string());
        flags.push("stream-json".to_string());
        flags.push("--verbose".to_string());
        flags.push("--model".to_string());
        flags.push(model.to_string());
        flags.push("--max-turns".to_string());
        flags.push(max_turns.to_string());
        flags
    }
}

fn phase_brief(phase: Phase) -> &'static str {
    match phase {
        Phase::Discovery => {
            "Scan every repository for call sites of the configured REST endpoints. \
Use the endpoint patterns to search, then record the exact snippet, file, line and language of each usage."
        }
        Phase::Narrowing => {
            "Filter the discovered usages down to those whose REST attributes all have GraphQL mappings. \
List the mappings each usage relies on and rate its complexity as low, medium or high."
        }
        Phase::Generation => {
            "For each narrowed usage, write the equivalent GraphQL query and the replacement code \
in the repository's language, including any imports the GraphQL client needs."
        }
        Phase::Migration => {
            "Apply each generated migration to its repository: replace the REST call, add imports, \
verify the file still parses and commit the change with a clear message."
        }
        Phase::Validation => {
            "Check that the migrated repositories still build and pass their tests, that each GraphQL \
query matches the REST endpoint it replaced, and that errors are still handled."
        }
    }
}

fn result_contract(phase: Phase) -> &'static str {
    match phase {
        Phase::Discovery => {
            r#"{"phase": "discovery", "timestamp": "<RFC 3339>", "usages": [{"endpoint_id": "", "repo": "", "file": "", "line": 0, "snippet": "", "language": ""}]}"#
        }
        Phase::Narrowing => {
            r#"{"phase": "narrowing", "timestamp": "<RFC 3339>", "narrowed_usages": [{"endpoint_id": "", "repo": "", "file": "", "line": 0, "snippet": "", "language": "", "matched_mappings": [""], "complexity": "low|medium|high"}]}"#
        }
        Phase::Generation => {
            r#"{"phase": "generation", "timestamp": "<RFC 3339>", "generated_migrations": [{"endpoint_id": "", "repo": "", "file": "", "graphql_query": "", "new_code": "", "imports": [""]}]}"#
        }
        Phase::Migration => {
            r#"{"phase": "migration", "timestamp": "<RFC 3339>", "applied_migrations": [{"endpoint_id": "", "repo": "", "file": "", "applied": true, "diff": "", "branch": "", "commit": ""}]}"#
        }
        Phase::Validation => {
            r#"{"phase": "validation", "timestamp": "<RFC 3339>", "checks": [{"check_name": "", "passed": true, "details": ""}]}"#
        }
    }
}

/// What one Claude session reported, folded from its stream-json lines.
#[derive(Debug, Default)]
pub struct SessionTranscript {
    pub session_id: String,
    pub model: Option<String>,
    pub num_turns: u32,
    pub result: Option<String>,
    pub is_error: bool,
    /// Assistant text and non-JSON lines, used when no result event arrives.
    /// Stream events themselves never land here.
    pub text: String,
}

impl SessionTranscript {
    pub fn observe(&mut self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        match serde_json::from_str::<StreamEvent>(line) {
            Ok(StreamEvent::System {
                session_id, model, ..
            }) => {
                if !session_id.is_empty() {
                    self.session_id = session_id;
                }
                if model.is_some() {
                    self.model = model;
                }
            }
            Ok(StreamEvent::Assistant {
                message,
                session_id,
            }) => {
                if self.session_id.is_empty() && !session_id.is_empty() {
                    self.session_id = session_id;
                }
                for block in message.content {
                    match block {
                        ContentBlock::ToolUse { name, input } => {
                            debug!(tool = %describe_tool_use(&name, &input), "agent tool use");
                        }
                        ContentBlock::Text { text } => {
                            self.text.push_str(&text);
                            self.text.push('\n');
                        }
                        ContentBlock::Other => {}
                    }
                }
            }
            Ok(StreamEvent::Result {
                result,
                is_error,
                session_id,
                num_turns,
                ..
            }) => {
                self.result = result;
                self.is_error = is_error;
                self.num_turns = num_turns;
                if !session_id.is_empty() {
                    self.session_id = session_id;
                }
            }
            Ok(StreamEvent::User { .. }) => {}
            Ok(StreamEvent::Unknown) => {
                debug!(line = %truncate_line(line), "ignoring stream event");
            }
            Err(e) if serde_json::from_str::<Value>(line).is_ok() => {
                debug!(error = %e, line = %truncate_line(line), "undecodable stream event");
            }
            Err(_) => {
                // Not JSON, might be stderr or other output
                self.text.push_str(line);
                self.text.push('\n');
            }
        }
    }

    /// Final text the phase result is extracted from.
    pub fn final_text(&self) -> &str {
        self.result.as_deref().unwrap_or(&self.text)
    }
}

fn truncate_line(line: &str) -> String {
    line.chars().take(200).collect()
}

/// Parse the first JSON object in `text` as a phase result.
pub fn extract_result(text: &str) -> Option<Value> {
    let candidate = extract_json_object(text)?;
    match serde_json::from_str::<Value>(&candidate) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(error = %e, "agent output contained an unparseable JSON object");
            None
        }
    }
}

/// Production collaborator: one Claude CLI session per phase.
pub struct ClaudeAgent {
    settings: ClaudeSettings,
}

impl ClaudeAgent {
    pub fn new(settings: ClaudeSettings) -> Self {
        Self { settings }
    }

    pub fn from_env() -> Self {
        Self::new(ClaudeSettings::from_env())
    }

    pub fn settings(&self) -> &ClaudeSettings {
        &self.settings
    }

    /// Snapshot every git checkout before code gets edited, then put HEAD back
    /// where it was (branch or detached commit) so the snapshot stays untouched.
    ///
    /// A checkout that cannot be snapshotted fails the phase before any edits.
    fn prepare_savepoints(&self, tools: &ToolSurface<'_>) -> Result<Vec<String>> {
        let name = savepoint_name(Phase::Migration.as_str());
        let mut notes = Vec::new();
        for repo in &tools.config().repositories {
            let manager = tools.checkpoints(repo);
            let Some(revision) = manager.current_revision() else {
                debug!(repo = %repo.name, "checkout is not a git repository, no savepoint");
                continue;
            };
            let existing = manager
                .list_savepoints()
                .with_context(|| format!("Could not list savepoints in {}", repo.name))?;
            if existing.contains(&name) {
                notes.push(format!("{}: savepoint {} already present", repo.name, name));
                continue;
            }

            let working_branch = manager.current_branch();
            let savepoint = manager
                .create_savepoint(Phase::Migration.as_str())
                .with_context(|| format!("Could not create savepoint in {}", repo.name))?;
            let restored = match &working_branch {
                Some(branch) => manager.switch_to(branch),
                None => manager.detach_at(&revision),
            };
            restored.with_context(|| {
                format!("Could not leave savepoint {} in {}", savepoint, repo.name)
            })?;
            notes.push(format!("{}: savepoint {} created", repo.name, savepoint));
        }
        Ok(notes)
    }

    /// Run each checkout's tests up front so the agent starts from real results.
    async fn precompute_checks(
        &self,
        tools: &ToolSurface<'_>,
    ) -> Vec<(String, Vec<ValidationCheck>)> {
        let mut runs = Vec::new();
        for repo in &tools.config().repositories {
            let bridge = match tools.report_bridge(repo) {
                Ok(bridge) => bridge,
                Err(e) => {
                    debug!(
                        repo = %repo.name,
                        error = %e,
                        "no build descriptor, skipping test run"
                    );
                    continue;
                }
            };
            match bridge.run_tests(&[]).await {
                Ok(checks) => runs.push((repo.name.clone(), checks)),
                Err(e) => warn!(repo = %repo.name, error = %e, "test run could not start"),
            }
        }
        runs
    }

    fn build_prompt(
        &self,
        phase: Phase,
        tools: &ToolSurface<'_>,
        notes: &[String],
        checks: &[(String, Vec<ValidationCheck>)],
    ) -> Result<String> {
        let config = tools.config();
        let mut prompt = format!(
            "You are working on the {} phase of a REST to GraphQL migration \
for project '{}'.\n\n## TASK\n{}\n",
            phase,
            config.project_name,
            phase_brief(phase)
        );

        prompt.push_str("\n## REPOSITORIES\n");
        for repo in &config.repositories {
            prompt.push_str(&format!(
                "- {} ({:?}, branch {}) checked out at {}\n",
                repo.name,
                repo.language,
                repo.branch,
                tools.repo_checkout(repo).display()
            ));
        }

        prompt.push_str("\n## REST ENDPOINTS\n");
        prompt.push_str(
            &serde_json::to_string_pretty(tools.endpoints())
                .context("Failed to encode endpoints")?,
        );
        prompt.push_str("\n\n## ATTRIBUTE MAPPINGS\n");
        prompt.push_str(
            &serde_json::to_string_pretty(tools.mappings()).context("Failed to encode mappings")?,
        );
        prompt.push_str(&format!("\n\nGraphQL endpoint: {}\n", config.graphql_endpoint));

        if matches!(phase, Phase::Generation | Phase::Validation) {
            match tools.graphql_schema() {
                Ok(schema) => prompt.push_str(&format!("\n## GRAPHQL SCHEMA\n{}\n", schema)),
                Err(e) => debug!(error = %e, "schema not included in prompt"),
            }
        }

        if let Some(previous) = phase.previous()
            && let Some(result) = tools.previous_result(previous)?
        {
            prompt.push_str(&format!(
                "\n## {} RESULT\n{}\n",
                previous.as_str().to_uppercase(),
                serde_json::to_string_pretty(&result).context("Failed to encode previous result")?
            ));
        }

        if phase == Phase::Migration {
            prompt.push_str(&format!(
                "\n## OPTIONS\ndry_run: {}\ncreate_branches: {}\nbranch_prefix: {}\n",
                config.options.dry_run, config.options.create_branches, config.options.branch_prefix
            ));
            if config.options.dry_run {
                prompt.push_str(
                    "This is a dry run: report the diffs you would apply but do not modify files or commit.\n",
                );
            }
            for note in notes {
                prompt.push_str(&format!("- {}\n", note));
            }
        }

        if !checks.is_empty() {
            prompt.push_str("\n## BUILD AND TEST RESULTS\n");
            for (repo, repo_checks) in checks {
                prompt.push_str(&format!(
                    "### {}\n{}\n",
                    repo,
                    serde_json::to_string_pretty(repo_checks).context("Failed to encode checks")?
                ));
            }
        }

        prompt.push_str(&format!(
            "\n## OUTPUT\nWhen done, reply with a single JSON object of this shape \
and nothing else:\n{}\n",
            result_contract(phase)
        ));
        Ok(prompt)
    }

    async fn run_session(
        &self,
        prompt: &str,
        tools: &ToolSurface<'_>,
    ) -> Result<(SessionTranscript, bool)> {
        let config = tools.config();
        let flags = self
            .settings
            .flags(&config.options.model, config.options.max_turns_per_phase);
        debug!(cmd = %self.settings.claude_cmd, flags = ?flags, "spawning claude");

        let mut child = Command::new(&self.settings.claude_cmd)
            .args(&flags)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .current_dir(&config.work_dir)
            .spawn()
            .with_context(|| format!("Failed to spawn {}", self.settings.claude_cmd))?;

        // Drain stderr concurrently so a chatty process cannot block on a full pipe
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf).await;
                buf
            })
        });

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(prompt.as_bytes()).await?;
            stdin.shutdown().await.context("Failed to close stdin")?;
        }

        let stdout = child.stdout.take().context("Failed to get stdout")?;
        let mut reader = BufReader::new(stdout).lines();
        let mut transcript = SessionTranscript::default();
        while let Some(line) = reader.next_line().await? {
            transcript.observe(&line);
        }

        let status = child.wait().await?;
        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };
        if !status.success() && !stderr.trim().is_empty() {
            transcript.text.push_str(&stderr);
        }
        Ok((transcript, status.success()))
    }
}

#[async_trait]
impl PhaseAgent for ClaudeAgent {
    async fn execute(&self, phase: Phase, tools: &ToolSurface<'_>) -> Result<Option<Value>> {
        let notes = if phase == Phase::Migration && !tools.config().options.dry_run {
            self.prepare_savepoints(tools)?
        } else {
            Vec::new()
        };
        let checks = if phase == Phase::Validation {
            self.precompute_checks(tools).await
        } else {
            Vec::new()
        };
        let prompt = self.build_prompt(phase, tools, &notes, &checks)?;

        let start = Instant::now();
        let (transcript, success) = self.run_session(&prompt, tools).await?;
        info!(
            phase = %phase,
            session = %transcript.session_id,
            turns = transcript.num_turns,
            elapsed_secs = start.elapsed().as_secs(),
            "claude session finished"
        );

        if !transcript.session_id.is_empty() {
            let model = transcript
                .model
                .clone()
                .unwrap_or_else(|| tools.config().options.model.clone());
            tools.record_session(&transcript.session_id, &model, transcript.num_turns)?;
        }

        if transcript.is_error {
            bail!(
                "Claude reported an error: {}",
                transcript.final_text().trim()
            );
        }
        if transcript.result.is_none() && !success {
            bail!(
                "{} exited without a result: {}",
                self.settings.claude_cmd,
                transcript.text.trim()
            );
        }

        Ok(extract_result(transcript.final_text()))
    }
}
