use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::ConfigError;

/// A REST endpoint whose call sites should be migrated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestEndpoint {
    pub id: String,
    pub method: String,
    pub path: String,
    /// Code patterns that identify a call site
    pub patterns: Vec<String>,
}

/// Mapping from a REST attribute to a GraphQL field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeMapping {
    pub endpoint_id: String,
    pub rest_attribute: String,
    pub graphql_field: String,
    pub graphql_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Javascript,
    Java,
}

/// A target repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    pub url: String,
    pub branch: String,
    pub language: Language,
    /// Local checkout; defaults to `{work_dir}/repos/{name}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigOptions {
    #[serde(default = "default_true")]
    pub dry_run: bool,
    #[serde(default = "default_true")]
    pub create_branches: bool,
    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,
    #[serde(default = "default_max_concurrent_repos")]
    pub max_concurrent_repos: usize,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_turns")]
    pub max_turns_per_phase: u32,
}

fn default_true() -> bool {
    true
}

fn default_branch_prefix() -> String {
    "migration/rest-to-graphql".to_string()
}

fn default_max_concurrent_repos() -> usize {
    2
}

fn default_model() -> String {
    "claude-sonnet-4-5-20250929".to_string()
}

fn default_max_turns() -> u32 {
    50
}

impl Default for ConfigOptions {
    fn default() -> Self {
        Self {
            dry_run: default_true(),
            create_branches: default_true(),
            branch_prefix: default_branch_prefix(),
            max_concurrent_repos: default_max_concurrent_repos(),
            model: default_model(),
            max_turns_per_phase: default_max_turns(),
        }
    }
}

/// Inbound migration configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub project_name: String,
    /// Where phase results and the progress record are stored
    pub work_dir: PathBuf,
    pub repositories: Vec<Repository>,
    pub rest_endpoints: Vec<RestEndpoint>,
    pub attribute_mappings: Vec<AttributeMapping>,
    pub graphql_endpoint: String,
    pub graphql_schema_path: PathBuf,
    #[serde(default)]
    pub options: ConfigOptions,
}

impl Config {
    /// Load and validate a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Parse and validate configuration from a JSON string.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.repositories.is_empty() {
            return Err(ConfigError::Invalid(
                "repositories cannot be empty".to_string(),
            ));
        }
        if self.rest_endpoints.is_empty() {
            return Err(ConfigError::Invalid(
                "rest_endpoints cannot be empty".to_string(),
            ));
        }
        if let Some(ep) = self.rest_endpoints.iter().find(|ep| ep.patterns.is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "patterns cannot be empty for endpoint '{}'",
                ep.id
            )));
        }
        if self.options.max_turns_per_phase == 0 {
            return Err(ConfigError::Invalid(
                "max_turns_per_phase must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Local checkout directory for a repository.
    pub fn repo_checkout(&self, repo: &Repository) -> PathBuf {
        repo.path
            .clone()
            .unwrap_or_else(|| self.work_dir.join("repos").join(&repo.name))
    }

    pub fn repository(&self, name: &str) -> Option<&Repository> {
        self.repositories.iter().find(|r| r.name == name)
    }
}
