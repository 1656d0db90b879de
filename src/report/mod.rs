//! Build/test bridge: run a repository's test command and turn its JUnit XML
//! reports into validation checks.

pub mod junit;

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

use crate::errors::ReportError;
use crate::schema::ValidationCheck;

pub use junit::{MAX_DETAILS_CHARS, parse_report, parse_report_dir, parse_report_file};

/// How to run one build tool's tests and where it leaves its reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTool {
    /// Files whose presence identifies a project of this kind
    pub markers: Vec<String>,
    pub program: String,
    pub base_args: Vec<String>,
    /// Report directory relative to the repository root
    pub report_dir: PathBuf,
    /// Name of the synthetic check added when no test case was reported
    pub step_name: String,
}

impl BuildTool {
    /// `gradle test --daemon --continue`, reports under `build/test-results/test`.
    pub fn gradle() -> Self {
        Self {
            markers: vec!["build.gradle".into(), "build.gradle.kts".into()],
            program: "gradle".into(),
            base_args: vec!["test".into(), "--daemon".into(), "--continue".into()],
            report_dir: PathBuf::from("build/test-results/test"),
            step_name: "gradle-build".into(),
        }
    }

    /// `mvn test -Dmaven.test.failure.ignore=true`, reports under `target/surefire-reports`.
    pub fn maven() -> Self {
        Self {
            markers: vec!["pom.xml".into()],
            program: "mvn".into(),
            base_args: vec![
                "test".into(),
                "--batch-mode".into(),
                "-Dmaven.test.failure.ignore=true".into(),
            ],
            report_dir: PathBuf::from("target/surefire-reports"),
            step_name: "maven-build".into(),
        }
    }

    /// First known tool whose marker file exists in `repo_path`. Gradle wins
    /// when both are present.
    pub fn detect(repo_path: &Path) -> Option<Self> {
        [Self::gradle(), Self::maven()]
            .into_iter()
            .find(|tool| tool.matches(repo_path))
    }

    pub fn matches(&self, repo_path: &Path) -> bool {
        self.markers
            .iter()
            .any(|marker| repo_path.join(marker).is_file())
    }
}

/// Raw outcome of one build invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    pub success: bool,
    /// Standard output followed by standard error
    pub output: String,
}

/// Combine parsed checks with the build outcome.
///
/// When no report yielded a check, a single check named after the build step
/// stands in so a build that never reached the tests is still visible.
pub fn collect_checks(
    step_name: &str,
    outcome: BuildOutcome,
    parsed: Vec<ValidationCheck>,
) -> Vec<ValidationCheck> {
    if !parsed.is_empty() {
        return parsed;
    }
    let details = if outcome.output.trim().is_empty() {
        if outcome.success {
            "Build succeeded, no test cases found".to_string()
        } else {
            "Build failed with no output".to_string()
        }
    } else {
        outcome.output
    };
    vec![ValidationCheck::new(step_name, outcome.success, details)]
}

/// Test runner bound to one repository checkout.
#[derive(Debug, Clone)]
pub struct ReportBridge {
    repo_path: PathBuf,
    tool: BuildTool,
}

impl ReportBridge {
    /// Fails unless one of the tool's marker files exists in `repo_path`.
    pub fn new(repo_path: &Path, tool: BuildTool) -> Result<Self, ReportError> {
        if !tool.matches(repo_path) {
            return Err(ReportError::NotAProject {
                path: repo_path.to_path_buf(),
                expected: tool.markers.join(" or "),
            });
        }
        Ok(Self {
            repo_path: repo_path.to_path_buf(),
            tool,
        })
    }

    pub fn gradle(repo_path: &Path) -> Result<Self, ReportError> {
        Self::new(repo_path, BuildTool::gradle())
    }

    /// Pick the build tool from the marker files present in `repo_path`.
    pub fn detect(repo_path: &Path) -> Result<Self, ReportError> {
        match BuildTool::detect(repo_path) {
            Some(tool) => Self::new(repo_path, tool),
            None => Err(ReportError::NotAProject {
                path: repo_path.to_path_buf(),
                expected: "build.gradle, build.gradle.kts or pom.xml".into(),
            }),
        }
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    pub fn tool(&self) -> &BuildTool {
        &self.tool
    }

    pub fn report_dir(&self) -> PathBuf {
        self.repo_path.join(&self.tool.report_dir)
    }

    /// Run the test command, then parse whatever reports it left behind.
    ///
    /// A failing build is not an error; it shows up in the returned checks.
    /// Only a command that cannot be started at all is.
    pub async fn run_tests(
        &self,
        extra_args: &[String],
    ) -> Result<Vec<ValidationCheck>, ReportError> {
        let outcome = self.invoke(extra_args).await?;
        let parsed = self.parse_reports();
        info!(
            repo = %self.repo_path.display(),
            success = outcome.success,
            checks = parsed.len(),
            "test run finished"
        );
        Ok(collect_checks(&self.tool.step_name, outcome, parsed))
    }

    async fn invoke(&self, extra_args: &[String]) -> Result<BuildOutcome, ReportError> {
        debug!(
            program = %self.tool.program,
            args = ?self.tool.base_args,
            extra = ?extra_args,
            "running tests"
        );
        let output = Command::new(&self.tool.program)
            .args(&self.tool.base_args)
            .args(extra_args)
            .current_dir(&self.repo_path)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| ReportError::Spawn {
                program: self.tool.program.clone(),
                source,
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(BuildOutcome {
            success: output.status.success(),
            output: combined,
        })
    }

    /// Checks from every report currently in the report directory.
    pub fn parse_reports(&self) -> Vec<ValidationCheck> {
        parse_report_dir(&self.report_dir())
    }
}
