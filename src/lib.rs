pub mod agent;
pub mod checkpoint;
pub mod config;
pub mod errors;
pub mod gates;
pub mod orchestrator;
pub mod phase;
pub mod report;
pub mod schema;
pub mod state;
pub mod tools;
pub mod util;
