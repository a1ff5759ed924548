//! The schedule value shared by the greedy pass, the exact search and the merge.

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::interner::FileId;
use crate::models::{Instance, ServerId, Time};

use super::timeline::{InsertUndo, ServerTimeline, Step};

/// Scheduling invariant violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Dependency {dependency} of {file} is not available on server {server}")]
    DependencyNotScheduled {
        file: String,
        dependency: String,
        server: ServerId,
    },
    #[error("{file} starts on server {server} at {start} before dependency {dependency} is available at {available}")]
    DependencyLate {
        file: String,
        dependency: String,
        server: ServerId,
        start: Time,
        available: Time,
    },
    #[error("Steps {first} and {second} overlap on server {server}")]
    Overlap {
        server: ServerId,
        first: String,
        second: String,
    },
    #[error("No servers to schedule on")]
    NoServers,
}

/// Opaque position in the undo journal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Checkpoint(usize);

#[derive(Clone, Debug, PartialEq, Eq)]
enum Change {
    Step { server: ServerId, undo: InsertUndo },
    Availability { file: FileId, previous: Option<Vec<Time>> },
}

/// Steps per server plus availability bookkeeping.
///
/// Availability of a file on a server is the earliest time its output can be
/// used there: finish time on the compiling server, finish + replicate time
/// elsewhere, minimum across all compilations of that file.
///
/// While a journal is open every mutation is recorded, so the schedule can
/// be rolled back to any checkpoint taken since.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schedule {
    timelines: Vec<ServerTimeline>,
    placed: FxHashSet<(ServerId, FileId)>,
    available: FxHashMap<FileId, Vec<Time>>,
    journal: Option<Vec<Change>>,
}

impl Schedule {
    pub fn new(nservers: usize) -> Self {
        Self {
            timelines: vec![ServerTimeline::new(); nservers],
            placed: FxHashSet::default(),
            available: FxHashMap::default(),
            journal: None,
        }
    }

    pub fn nservers(&self) -> usize {
        self.timelines.len()
    }

    #[inline]
    pub fn timeline(&self, server: ServerId) -> &ServerTimeline {
        &self.timelines[server]
    }

    pub fn timelines(&self) -> &[ServerTimeline] {
        &self.timelines
    }

    /// Whether `file` is compiled on `server`.
    #[inline]
    pub fn is_placed(&self, server: ServerId, file: FileId) -> bool {
        self.placed.contains(&(server, file))
    }

    /// Whether `file` is compiled anywhere.
    #[inline]
    pub fn is_compiled(&self, file: FileId) -> bool {
        self.available.contains_key(&file)
    }

    #[inline]
    pub fn availability(&self, file: FileId, server: ServerId) -> Option<Time> {
        self.available.get(&file).map(|per_server| per_server[server])
    }

    /// Earliest availability of `file` on any server.
    pub fn completion(&self, file: FileId) -> Option<Time> {
        self.available
            .get(&file)
            .and_then(|per_server| per_server.iter().copied().min())
    }

    pub fn step_count(&self) -> usize {
        self.timelines.iter().map(|t| t.steps().len()).sum()
    }

    /// Record a compilation of `file` on `server` starting at `start`.
    ///
    /// The caller is responsible for feasibility; the greedy scheduler and
    /// the exact search only ever call this with a slot they computed.
    pub fn record_step(
        &mut self,
        server: ServerId,
        file: FileId,
        start: Time,
        ctime: Time,
        rtime: Time,
    ) {
        let finish = start.saturating_add(ctime);
        let nservers = self.timelines.len();

        let entry = self.available.get(&file).cloned();
        let mut per_server = entry.clone().unwrap_or_else(|| vec![Time::MAX; nservers]);
        for (other, slot) in per_server.iter_mut().enumerate() {
            let at = if other == server {
                finish
            } else {
                finish.saturating_add(rtime)
            };
            *slot = (*slot).min(at);
        }
        self.available.insert(file, per_server);

        let undo = self.timelines[server].insert(Step {
            file,
            start,
            finish,
        });
        self.placed.insert((server, file));

        if let Some(journal) = self.journal.as_mut() {
            journal.push(Change::Availability {
                file,
                previous: entry,
            });
            journal.push(Change::Step { server, undo });
        }
    }

    /// Open the journal (if needed) and mark the current state.
    pub fn checkpoint(&mut self) -> Checkpoint {
        Checkpoint(self.journal.get_or_insert_with(Vec::new).len())
    }

    /// Undo every change recorded after `checkpoint`.
    pub fn rollback_to(&mut self, checkpoint: Checkpoint) {
        let Some(mut journal) = self.journal.take() else {
            return;
        };
        while journal.len() > checkpoint.0 {
            match journal.pop() {
                Some(Change::Step { server, undo }) => {
                    let step = self.timelines[server].undo_insert(undo);
                    self.placed.remove(&(server, step.file));
                }
                Some(Change::Availability { file, previous }) => match previous {
                    Some(per_server) => {
                        self.available.insert(file, per_server);
                    }
                    None => {
                        self.available.remove(&file);
                    }
                },
                None => break,
            }
        }
        self.journal = Some(journal);
    }

    /// Close the journal, keeping every change made so far.
    pub fn close_journal(&mut self) {
        self.journal = None;
    }

    /// Copy of the current state without the journal.
    pub fn snapshot(&self) -> Self {
        Self {
            timelines: self.timelines.clone(),
            placed: self.placed.clone(),
            available: self.available.clone(),
            journal: None,
        }
    }

    /// All steps as `(server, step)` in start order; ties by server, then
    /// by position on the server.
    pub fn steps_in_start_order(&self) -> Vec<(ServerId, Step)> {
        let mut steps: Vec<(ServerId, usize, Step)> = self
            .timelines
            .iter()
            .enumerate()
            .flat_map(|(server, timeline)| {
                timeline
                    .steps()
                    .iter()
                    .enumerate()
                    .map(move |(position, step)| (server, position, *step))
            })
            .collect();
        steps.sort_by_key(|(server, position, step)| (step.start, *server, *position));
        steps
            .into_iter()
            .map(|(server, _, step)| (server, step))
            .collect()
    }

    /// Check that no server has overlapping steps and that every step starts
    /// after its dependencies are available on its server.
    pub fn validate(&self, instance: &Instance) -> Result<(), ScheduleError> {
        for (server, timeline) in self.timelines.iter().enumerate() {
            if let Some((first, second)) = timeline.first_overlap() {
                return Err(ScheduleError::Overlap {
                    server,
                    first: instance.name(first.file).to_string(),
                    second: instance.name(second.file).to_string(),
                });
            }
            for step in timeline.steps() {
                for &dep in &instance.file(step.file).dependencies {
                    let available = self.availability(dep, server).ok_or_else(|| {
                        ScheduleError::DependencyNotScheduled {
                            file: instance.name(step.file).to_string(),
                            dependency: instance.name(dep).to_string(),
                            server,
                        }
                    })?;
                    if available > step.start {
                        return Err(ScheduleError::DependencyLate {
                            file: instance.name(step.file).to_string(),
                            dependency: instance.name(dep).to_string(),
                            server,
                            start: step.start,
                            available,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FileDecl, TargetDecl};

    #[test]
    fn test_replication_availability() {
        let mut schedule = Schedule::new(2);
        schedule.record_step(0, 0, 0, 1, 4);
        assert_eq!(schedule.availability(0, 0), Some(1));
        assert_eq!(schedule.availability(0, 1), Some(5));
        assert_eq!(schedule.completion(0), Some(1));
        assert!(schedule.is_placed(0, 0));
        assert!(!schedule.is_placed(1, 0));
    }

    #[test]
    fn test_repeat_compilation_keeps_minimum() {
        let mut schedule = Schedule::new(3);
        schedule.record_step(0, 7, 0, 2, 10);
        schedule.record_step(1, 7, 3, 2, 10);
        // server 1 compiled it itself at 5, beating the replica at 12
        assert_eq!(schedule.availability(7, 1), Some(5));
        // server 0 keeps its own earlier compilation
        assert_eq!(schedule.availability(7, 0), Some(2));
        // server 2 gets the earliest replica
        assert_eq!(schedule.availability(7, 2), Some(12));
    }

    #[test]
    fn test_rollback_restores_identical_schedule() {
        let mut schedule = Schedule::new(2);
        schedule.record_step(0, 0, 0, 2, 1);
        let before = schedule.snapshot();

        let checkpoint = schedule.checkpoint();
        schedule.record_step(1, 1, 3, 2, 1);
        schedule.record_step(1, 0, 5, 2, 1);
        schedule.record_step(0, 2, 9, 1, 1);
        assert_eq!(schedule.step_count(), 4);

        schedule.rollback_to(checkpoint);
        schedule.close_journal();
        assert_eq!(schedule, before);
    }

    #[test]
    fn test_nested_checkpoints() {
        let mut schedule = Schedule::new(1);
        let outer = schedule.checkpoint();
        schedule.record_step(0, 0, 0, 1, 0);
        let inner = schedule.checkpoint();
        schedule.record_step(0, 1, 1, 1, 0);
        schedule.rollback_to(inner);
        assert_eq!(schedule.step_count(), 1);
        assert!(schedule.is_compiled(0));
        assert!(!schedule.is_compiled(1));
        schedule.rollback_to(outer);
        assert_eq!(schedule.step_count(), 0);
        assert_eq!(schedule.timeline(0).clock(), 0);
    }

    #[test]
    fn test_start_order_and_validation() {
        let instance = Instance::new(
            vec![
                FileDecl::new("A", 2, 1, &[]),
                FileDecl::new("B", 3, 1, &["A"]),
            ],
            vec![TargetDecl::new("B", 10, 1)],
            2,
        )
        .unwrap();
        let a = instance.lookup("A").unwrap();
        let b = instance.lookup("B").unwrap();

        let mut good = Schedule::new(2);
        good.record_step(0, a, 0, 2, 1);
        good.record_step(1, b, 3, 3, 1);
        assert_eq!(good.validate(&instance), Ok(()));
        let order: Vec<(ServerId, FileId)> = good
            .steps_in_start_order()
            .into_iter()
            .map(|(server, step)| (server, step.file))
            .collect();
        assert_eq!(order, vec![(0, a), (1, b)]);

        let mut late = Schedule::new(2);
        late.record_step(0, a, 0, 2, 1);
        late.record_step(1, b, 2, 3, 1);
        assert!(matches!(
            late.validate(&instance),
            Err(ScheduleError::DependencyLate { available: 3, .. })
        ));

        let mut overlapping = Schedule::new(2);
        overlapping.record_step(0, a, 0, 2, 1);
        overlapping.record_step(0, b, 1, 3, 1);
        assert!(matches!(
            overlapping.validate(&instance),
            Err(ScheduleError::Overlap { server: 0, .. })
        ));

        let mut missing = Schedule::new(2);
        missing.record_step(0, b, 0, 3, 1);
        assert!(matches!(
            missing.validate(&instance),
            Err(ScheduleError::DependencyNotScheduled { .. })
        ));
    }

    #[test]
    fn test_huge_times_saturate() {
        let mut schedule = Schedule::new(2);
        schedule.record_step(0, 0, Time::MAX - 5, 10, 10);
        assert_eq!(schedule.availability(0, 0), Some(Time::MAX));
        assert_eq!(schedule.availability(0, 1), Some(Time::MAX));
    }
}
