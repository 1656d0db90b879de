use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::phase::Phase;

/// Durable inter-phase state: one JSON document per phase.
///
/// Saving a phase replaces its previous document wholesale. There is no
/// locking, so only one pipeline should write to a working directory at a time.
#[derive(Debug, Clone)]
pub struct ResultStore {
    work_dir: PathBuf,
}

impl ResultStore {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn result_file(&self, phase: Phase) -> PathBuf {
        self.work_dir.join(format!("{}-result.json", phase))
    }

    pub fn save(&self, phase: Phase, result: &Value) -> Result<()> {
        fs::create_dir_all(&self.work_dir).with_context(|| {
            format!(
                "Failed to create working directory {}",
                self.work_dir.display()
            )
        })?;

        let path = self.result_file(phase);
        let json = serde_json::to_string_pretty(result)
            .with_context(|| format!("Failed to serialize {} result", phase))?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write result file {}", path.display()))?;

        debug!(phase = %phase, path = %path.display(), "saved phase result");
        Ok(())
    }

    /// Last saved result, or `None` if the phase was never saved.
    pub fn get(&self, phase: Phase) -> Result<Option<Value>> {
        let path = self.result_file(phase);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read result file {}", path.display()))?;
        let value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse result file {}", path.display()))?;
        Ok(Some(value))
    }

    pub fn save_typed<T: Serialize>(&self, phase: Phase, result: &T) -> Result<()> {
        let value = serde_json::to_value(result)
            .with_context(|| format!("Failed to serialize {} result", phase))?;
        self.save(phase, &value)
    }

    pub fn get_typed<T: DeserializeOwned>(&self, phase: Phase) -> Result<Option<T>> {
        match self.get(phase)? {
            Some(value) => {
                let typed = serde_json::from_value(value)
                    .with_context(|| format!("Stored {} result has unexpected shape", phase))?;
                Ok(Some(typed))
            }
            None => Ok(None),
        }
    }

    /// Phases that currently have a stored result, in pipeline order.
    pub fn saved_phases(&self) -> Vec<Phase> {
        Phase::ALL
            .into_iter()
            .filter(|p| self.result_file(*p).exists())
            .collect()
    }
}
