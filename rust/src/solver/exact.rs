//! Exact search for a single target's sub-instance.

use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

use crate::interner::FileId;
use crate::models::{Instance, Time};
use crate::scheduler::{ListScheduler, Schedule, ScheduleError};
use crate::subinstance::SubInstance;
use crate::{log_debug, log_progress};

/// Limits for one exact search.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SearchBudget {
    /// Total wall-clock time.
    pub time_limit: Duration,
    /// Give up once the incumbent has not improved for this long.
    pub stall_limit: Duration,
}

impl Default for SearchBudget {
    fn default() -> Self {
        Self {
            time_limit: Duration::from_millis(2_000),
            stall_limit: Duration::from_millis(500),
        }
    }
}

/// Result of an exact search.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExactOutcome {
    /// A schedule whose target completes strictly before the seed's.
    Found {
        schedule: Schedule,
        completion: Time,
        /// The search space was exhausted, so `completion` is the best possible
        /// with one compilation per file.
        optimal: bool,
    },
    /// Nothing better than the seed within the budget.
    NotFound,
}

/// Minimizes the completion time of a sub-instance's target.
///
/// Implementations must stay within `budget` and never return a schedule
/// that violates the sub-instance's dependency or overlap constraints.
pub trait ExactSolver {
    fn solve(
        &self,
        instance: &Instance,
        sub: &SubInstance,
        seed: Option<&Schedule>,
        budget: &SearchBudget,
    ) -> ExactOutcome;
}

/// Depth-first branch and bound over (ready file, server) choices.
///
/// Every file of the sub-instance is compiled exactly once, at its earliest
/// gap-aware slot on the chosen server. Branches are cut with a critical-path
/// bound on the target's completion, and interchangeable empty servers are
/// only tried once.
#[derive(Clone, Copy, Debug, Default)]
pub struct BranchAndBound {
    verbosity: u8,
}

impl BranchAndBound {
    pub fn new(verbosity: u8) -> Self {
        Self { verbosity }
    }
}

impl ExactSolver for BranchAndBound {
    fn solve(
        &self,
        instance: &Instance,
        sub: &SubInstance,
        seed: Option<&Schedule>,
        budget: &SearchBudget,
    ) -> ExactOutcome {
        let bound = seed
            .and_then(|schedule| schedule.completion(sub.target()))
            .unwrap_or(Time::MAX);
        let now = Instant::now();
        let mut search = Search {
            scheduler: ListScheduler::without_pull_forward(instance, self.verbosity),
            sub,
            budget,
            started: now,
            last_improvement: now,
            best: bound,
            incumbent: None,
            aborted: false,
            nodes: 0,
            verbosity: self.verbosity,
        };

        let mut schedule = Schedule::new(sub.nservers());
        let result = search.explore(&mut schedule);

        log_progress!(
            self.verbosity,
            "  exact search for {}: {} nodes in {:?}{}",
            instance.name(sub.target()),
            search.nodes,
            search.started.elapsed(),
            if search.aborted { " (budget exhausted)" } else { "" }
        );
        if let Err(err) = result {
            log_progress!(self.verbosity, "  exact search abandoned: {}", err);
            return ExactOutcome::NotFound;
        }

        match search.incumbent {
            Some(schedule) => ExactOutcome::Found {
                schedule,
                completion: search.best,
                optimal: !search.aborted,
            },
            None => ExactOutcome::NotFound,
        }
    }
}

struct Search<'a> {
    scheduler: ListScheduler<'a>,
    sub: &'a SubInstance,
    budget: &'a SearchBudget,
    started: Instant,
    last_improvement: Instant,
    best: Time,
    incumbent: Option<Schedule>,
    aborted: bool,
    nodes: u64,
    verbosity: u8,
}

impl Search<'_> {
    fn out_of_budget(&self) -> bool {
        self.started.elapsed() >= self.budget.time_limit
            || self.last_improvement.elapsed() >= self.budget.stall_limit
    }

    /// Completion of the target if every remaining file could start as soon
    /// as its dependencies finish anywhere, with no server contention.
    fn lower_bound(&self, schedule: &Schedule) -> Time {
        let instance = self.scheduler.instance();
        let mut finish: FxHashMap<FileId, Time> = FxHashMap::default();
        for &file in self.sub.files() {
            let at = match schedule.completion(file) {
                Some(at) => at,
                None => {
                    let spec = instance.file(file);
                    let ready = spec
                        .dependencies
                        .iter()
                        .filter_map(|dep| finish.get(dep).copied())
                        .max()
                        .unwrap_or(0);
                    ready.saturating_add(spec.ctime)
                }
            };
            finish.insert(file, at);
        }
        finish.get(&self.sub.target()).copied().unwrap_or(0)
    }

    fn explore(&mut self, schedule: &mut Schedule) -> Result<(), ScheduleError> {
        self.nodes += 1;
        if self.out_of_budget() {
            self.aborted = true;
            return Ok(());
        }

        if let Some(done) = schedule.completion(self.sub.target()) {
            if done < self.best {
                log_debug!(self.verbosity, "    incumbent {} -> {}", self.best, done);
                self.best = done;
                self.incumbent = Some(schedule.snapshot());
                self.last_improvement = Instant::now();
            }
            return Ok(());
        }
        if self.lower_bound(schedule) >= self.best {
            return Ok(());
        }

        let instance = self.scheduler.instance();
        let ready: Vec<FileId> = self
            .sub
            .files()
            .iter()
            .copied()
            .filter(|&file| {
                !schedule.is_compiled(file)
                    && instance
                        .file(file)
                        .dependencies
                        .iter()
                        .all(|&dep| schedule.is_compiled(dep))
            })
            .collect();

        for file in ready {
            let spec = instance.file(file);
            let mut choices = Vec::with_capacity(schedule.nservers());
            let mut tried_empty = false;
            for server in 0..schedule.nservers() {
                if schedule.timeline(server).is_empty() {
                    if tried_empty {
                        continue;
                    }
                    tried_empty = true;
                }
                choices.push((self.scheduler.earliest_slot(schedule, server, file)?, server));
            }
            choices.sort_unstable();

            for (slot, server) in choices {
                // every file here is an ancestor of the target
                if slot.saturating_add(spec.ctime) >= self.best {
                    continue;
                }
                let checkpoint = schedule.checkpoint();
                schedule.record_step(server, file, slot, spec.ctime, spec.rtime);
                let result = self.explore(schedule);
                schedule.rollback_to(checkpoint);
                result?;
                if self.aborted {
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}
