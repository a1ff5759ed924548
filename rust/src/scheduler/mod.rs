//! Greedy list scheduling on top of gap-aware server timelines.
//!
//! A [`Schedule`] holds the steps of every server plus per-server
//! availability of every compiled file. [`ListScheduler`] fills it one file at
//! a time, reusing idle gaps and re-compiling dependencies locally when that
//! beats waiting for a replica.

mod greedy;
mod schedule;
mod timeline;

pub use greedy::ListScheduler;
pub use schedule::{Checkpoint, Schedule, ScheduleError};
pub use timeline::{ServerTimeline, Step};
