//! The external collaborator that produces each phase's content.

pub mod claude;
pub mod stream;

pub use claude::{ClaudeAgent, ClaudeSettings};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::phase::Phase;
use crate::tools::ToolSurface;

/// Executes one phase and hands back its raw result.
///
/// `Ok(None)` means the collaborator finished without producing a result.
/// Implementations must not assume the result is accepted: the orchestrator
/// gates it before anything downstream sees it.
#[async_trait]
pub trait PhaseAgent: Send + Sync {
    async fn execute(&self, phase: Phase, tools: &ToolSurface<'_>) -> Result<Option<Value>>;
}
