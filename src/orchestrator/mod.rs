pub mod pipeline;
pub mod runner;

pub use pipeline::Orchestrator;
pub use runner::PhaseRunner;
