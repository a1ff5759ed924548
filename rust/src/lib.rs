//! Build artifact scheduling across a pool of servers.
//!
//! Files with compile and replicate times, dependencies and per-target
//! deadlines are scheduled by decomposing the instance into one sub-problem
//! per target, solving each greedily (optionally refined by a bounded exact
//! search), and merging the sub-schedules best-first into a global schedule.
//! An independent replay simulator scores the result.

mod config;
mod interner;
pub mod logging;
mod models;
mod parser;
#[cfg(feature = "python")]
mod python;
pub mod scheduler;
mod simulator;
pub mod solver;
mod subinstance;

pub use config::SolverConfig;
pub use interner::{FileId, FileIdInterner};
pub use models::{
    CompiledFile, FileDecl, Instance, ModelError, ServerId, TargetDecl, Time, MAX_SERVERS,
};
pub use parser::{
    parse_instance, parse_submission, read_instance, read_submission, write_submission,
    ParseError, MAX_FILES,
};
pub use scheduler::{ListScheduler, Schedule, ScheduleError};
pub use simulator::{evaluate, evaluate_schedule, replay, Replay, SimulationError, Submission};
pub use solver::{
    solve_instance, MergeOutcome, Orchestrator, SolveError, SolveReport, Solution, TargetReport,
};
pub use subinstance::{dependency_closure, SubInstance};
