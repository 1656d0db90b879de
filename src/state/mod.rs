pub mod progress;
pub mod results;

pub use progress::{
    Clock, FileProgressStorage, MemoryProgressStorage, PhaseState, PhaseStatus, ProgressLog,
    ProgressRecord, ProgressStorage, SessionLog, SystemClock,
};
pub use results::ResultStore;
