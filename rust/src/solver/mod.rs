//! Decomposition into per-target sub-instances and merge into one schedule.
//!
//! Every target is scheduled on its own, sub-instances are ranked by the
//! score they achieve alone, and their schedules are folded into a global
//! schedule best-first. A merge that would make its target miss the deadline
//! is rolled back as a whole.

mod exact;

pub use exact::{BranchAndBound, ExactOutcome, ExactSolver, SearchBudget};

use thiserror::Error;

use crate::config::SolverConfig;
use crate::interner::FileId;
use crate::models::{Instance, ModelError, Time};
use crate::scheduler::{ListScheduler, Schedule, ScheduleError};
use crate::simulator::{self, SimulationError, Submission};
use crate::subinstance::SubInstance;
use crate::{log_decisions, log_progress};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SolveError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error(transparent)]
    Simulation(#[from] SimulationError),
}

/// What happened to a sub-schedule during the merge phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Highest-ranked sub-schedule; became the initial global schedule.
    Seed,
    Accepted,
    /// Merging made the target late; the global schedule was restored.
    Rejected,
}

/// Per-target summary, in merge order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetReport {
    pub target: String,
    /// Target completion in the greedy sub-schedule.
    pub heuristic_completion: Option<Time>,
    /// Target completion in the sub-schedule that was merged.
    pub completion: Option<Time>,
    pub exact_improved: bool,
    /// Score of the target when its sub-schedule is replayed alone.
    pub score: i64,
    pub outcome: MergeOutcome,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SolveReport {
    pub targets: Vec<TargetReport>,
    /// Replayed score of the global schedule.
    pub score: i64,
}

impl SolveReport {
    pub fn accepted(&self) -> usize {
        self.targets
            .iter()
            .filter(|t| t.outcome != MergeOutcome::Rejected)
            .count()
    }

    pub fn rejected(&self) -> usize {
        self.targets.len() - self.accepted()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Solution {
    pub schedule: Schedule,
    pub report: SolveReport,
}

/// A solved sub-instance waiting to be merged.
struct Candidate {
    sub: SubInstance,
    schedule: Schedule,
    heuristic_completion: Option<Time>,
    exact_improved: bool,
    score: i64,
}

/// Drives the per-target solves and the merge.
pub struct Orchestrator<'a, S: ExactSolver = BranchAndBound> {
    instance: &'a Instance,
    config: SolverConfig,
    exact: S,
}

impl<'a> Orchestrator<'a, BranchAndBound> {
    pub fn new(instance: &'a Instance, config: SolverConfig) -> Self {
        let exact = BranchAndBound::new(config.verbosity);
        Self {
            instance,
            config,
            exact,
        }
    }
}

impl<'a, S: ExactSolver> Orchestrator<'a, S> {
    /// Swap in another exact solver.
    pub fn with_exact_solver<T: ExactSolver>(self, exact: T) -> Orchestrator<'a, T> {
        Orchestrator {
            instance: self.instance,
            config: self.config,
            exact,
        }
    }

    fn scheduler(&self) -> ListScheduler<'a> {
        ListScheduler::new(
            self.instance,
            self.config.max_pull_depth,
            self.config.verbosity,
        )
    }

    pub fn solve(&self) -> Result<Solution, SolveError> {
        let verbosity = self.config.verbosity;
        let mut candidates = Vec::with_capacity(self.instance.targets().len());
        for &target in self.instance.targets() {
            candidates.push(self.solve_target(target)?);
        }
        // stable: equal scores keep instance order
        candidates.sort_by(|a, b| b.score.cmp(&a.score));

        let mut reports = Vec::with_capacity(candidates.len());
        let mut accepted: Vec<FileId> = Vec::new();
        let mut global: Option<Schedule> = None;

        for candidate in candidates {
            let target = candidate.sub.target();
            let outcome = match global.as_mut() {
                None => {
                    global = Some(candidate.schedule.clone());
                    MergeOutcome::Seed
                }
                Some(schedule) => {
                    self.merge_into(schedule, &candidate.sub, &candidate.schedule, &accepted)?
                }
            };
            // a late seed is kept but never re-validated
            let on_time = match (global.as_ref(), self.instance.file(target).deadline) {
                (Some(schedule), Some(deadline)) => {
                    schedule.completion(target).is_some_and(|at| at <= deadline)
                }
                _ => false,
            };
            if outcome != MergeOutcome::Rejected && on_time {
                accepted.push(target);
            }
            log_progress!(
                verbosity,
                "merge {}: {:?} (standalone score {})",
                self.instance.name(target),
                outcome,
                candidate.score
            );
            reports.push(TargetReport {
                target: self.instance.name(target).to_string(),
                heuristic_completion: candidate.heuristic_completion,
                completion: candidate.schedule.completion(target),
                exact_improved: candidate.exact_improved,
                score: candidate.score,
                outcome,
            });
        }

        let schedule = global.unwrap_or_else(|| Schedule::new(self.instance.nservers()));
        schedule.validate(self.instance)?;
        let score = simulator::evaluate_schedule(self.instance, &schedule)?;
        log_progress!(
            verbosity,
            "solved {} targets, {} steps, score {}",
            reports.len(),
            schedule.step_count(),
            score
        );

        Ok(Solution {
            schedule,
            report: SolveReport {
                targets: reports,
                score,
            },
        })
    }

    fn solve_target(&self, target: FileId) -> Result<Candidate, SolveError> {
        let sub = SubInstance::for_target_id(self.instance, target);
        let mut schedule = self.scheduler().schedule_sub_instance(&sub)?;
        let heuristic_completion = schedule.completion(target);
        let mut exact_improved = false;

        if self.config.wants_exact(sub.len()) {
            let outcome = self.exact.solve(
                self.instance,
                &sub,
                Some(&schedule),
                &self.config.search_budget(),
            );
            if let ExactOutcome::Found {
                schedule: better,
                completion,
                optimal,
            } = outcome
            {
                if heuristic_completion.map_or(true, |greedy| completion < greedy) {
                    log_decisions!(
                        self.config.verbosity,
                        "  exact search improved {}: {:?} -> {}{}",
                        self.instance.name(target),
                        heuristic_completion,
                        completion,
                        if optimal { " (optimal)" } else { "" }
                    );
                    schedule = better;
                    exact_improved = true;
                }
            }
        }

        schedule.validate(self.instance)?;
        let replay = simulator::replay(self.instance, &Submission::from_schedule(&schedule))?;
        let score = replay.target_score(self.instance, target);
        log_progress!(
            self.config.verbosity,
            "target {}: {} files, completion {:?}, score {}",
            self.instance.name(target),
            sub.len(),
            schedule.completion(target),
            score
        );

        Ok(Candidate {
            sub,
            schedule,
            heuristic_completion,
            exact_improved,
            score,
        })
    }

    /// Fold `sub_schedule` into `global`.
    ///
    /// Files of the sub-instance already compiled somewhere in `global` are
    /// reused; the rest are placed greedily in dependency order. The merge is
    /// undone if the sub-instance's target then misses its deadline, or, with
    /// `strict_merge`, if the target or any on-time target in `accepted` is
    /// late on replay. The replay check never fires while the availability
    /// bookkeeping matches the simulator.
    pub fn merge_into(
        &self,
        global: &mut Schedule,
        sub: &SubInstance,
        sub_schedule: &Schedule,
        accepted: &[FileId],
    ) -> Result<MergeOutcome, SolveError> {
        let checkpoint = global.checkpoint();
        let verdict = self.place_and_check(global, sub, sub_schedule, accepted);
        if !matches!(verdict, Ok(MergeOutcome::Accepted)) {
            global.rollback_to(checkpoint);
        }
        global.close_journal();
        verdict
    }

    fn place_and_check(
        &self,
        global: &mut Schedule,
        sub: &SubInstance,
        sub_schedule: &Schedule,
        accepted: &[FileId],
    ) -> Result<MergeOutcome, SolveError> {
        let scheduler = self.scheduler();
        for &file in sub.files() {
            if !sub_schedule.is_compiled(file) || global.is_compiled(file) {
                continue;
            }
            let server = scheduler.earliest_server_for_file(global, file)?;
            scheduler.add_step(global, server, file)?;
        }

        let target = sub.target();
        let deadline = sub.deadline(self.instance)?;
        match global.completion(target) {
            Some(at) if at <= deadline => {}
            completion => {
                log_decisions!(
                    self.config.verbosity,
                    "  {} would complete at {:?} after deadline {}",
                    self.instance.name(target),
                    completion,
                    deadline
                );
                return Ok(MergeOutcome::Rejected);
            }
        }

        if self.config.strict_merge {
            let replay = simulator::replay(self.instance, &Submission::from_schedule(global))?;
            for &previous in accepted.iter().chain(std::iter::once(&target)) {
                let spec = self.instance.file(previous);
                let on_time = matches!(
                    (replay.completion(previous), spec.deadline),
                    (Some(at), Some(deadline)) if at <= deadline
                );
                if !on_time {
                    log_decisions!(
                        self.config.verbosity,
                        "  merging {} makes {} late on replay",
                        self.instance.name(target),
                        spec.name
                    );
                    return Ok(MergeOutcome::Rejected);
                }
            }
        }

        Ok(MergeOutcome::Accepted)
    }
}

/// Solve `instance` with the default exact solver.
pub fn solve_instance(instance: &Instance, config: &SolverConfig) -> Result<Solution, SolveError> {
    Orchestrator::new(instance, config.clone()).solve()
}
