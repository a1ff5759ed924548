//! Independent replay of a submission: the checker.
//!
//! The simulator never looks at the scheduler's bookkeeping. It re-derives
//! every start time from the per-server queues alone, so it can score
//! submissions read from disk as well as schedules produced in memory.

use std::collections::VecDeque;

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::interner::FileId;
use crate::models::{Instance, ServerId, Time};
use crate::scheduler::Schedule;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SimulationError {
    #[error("Replay stalled with {remaining} steps left; {file} on server {server} never had its dependencies")]
    Stalled {
        remaining: usize,
        server: ServerId,
        file: String,
    },
    #[error("Server {server} is outside [0, {nservers})")]
    InvalidServer { server: ServerId, nservers: usize },
    #[error("Submission has {found} servers but the instance has {expected}")]
    ServerCountMismatch { expected: usize, found: usize },
}

/// Ordered compilation queue per server.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Submission {
    steps: Vec<Vec<FileId>>,
}

impl Submission {
    pub fn new(nservers: usize) -> Self {
        Self {
            steps: vec![Vec::new(); nservers],
        }
    }

    /// Queue each server's steps in the order they appear on its timeline.
    pub fn from_schedule(schedule: &Schedule) -> Self {
        Self {
            steps: schedule
                .timelines()
                .iter()
                .map(|timeline| timeline.steps().iter().map(|step| step.file).collect())
                .collect(),
        }
    }

    pub fn push(&mut self, server: ServerId, file: FileId) -> Result<(), SimulationError> {
        let nservers = self.steps.len();
        self.steps
            .get_mut(server)
            .ok_or(SimulationError::InvalidServer { server, nservers })?
            .push(file);
        Ok(())
    }

    pub fn nservers(&self) -> usize {
        self.steps.len()
    }

    pub fn server_steps(&self, server: ServerId) -> &[FileId] {
        &self.steps[server]
    }

    /// Total number of steps across servers.
    pub fn len(&self) -> usize {
        self.steps.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.iter().all(Vec::is_empty)
    }
}

/// Completion time of every file the replay compiled.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Replay {
    completion: FxHashMap<FileId, Time>,
}

impl Replay {
    /// Earliest availability of `file` on any server.
    pub fn completion(&self, file: FileId) -> Option<Time> {
        self.completion.get(&file).copied()
    }

    pub fn compiled_files(&self) -> usize {
        self.completion.len()
    }

    /// Total score over every target that made its deadline.
    pub fn score(&self, instance: &Instance) -> i64 {
        self.completion
            .iter()
            .map(|(&file, &at)| instance.file(file).score_at(at))
            .fold(0i64, i64::saturating_add)
    }

    /// Score contributed by `target` alone.
    pub fn target_score(&self, instance: &Instance, target: FileId) -> i64 {
        self.completion(target)
            .map_or(0, |at| instance.file(target).score_at(at))
    }
}

/// Replay `submission` against `instance`.
///
/// Each round lets every server try its queue head once; the head runs if
/// all its dependencies are available on that server, starting at the later
/// of the server's clock and the latest dependency. A round without progress
/// ends the replay, and any step still queued then is an error.
pub fn replay(instance: &Instance, submission: &Submission) -> Result<Replay, SimulationError> {
    let nservers = instance.nservers();
    if submission.nservers() != nservers {
        return Err(SimulationError::ServerCountMismatch {
            expected: nservers,
            found: submission.nservers(),
        });
    }

    let mut queues: Vec<VecDeque<FileId>> = submission
        .steps
        .iter()
        .map(|steps| steps.iter().copied().collect())
        .collect();
    let mut clock: Vec<Time> = vec![0; nservers];
    let mut available: FxHashMap<FileId, Vec<Time>> = FxHashMap::default();

    loop {
        let mut progressed = false;
        for server in 0..nservers {
            let Some(&file) = queues[server].front() else {
                continue;
            };
            let spec = instance.file(file);

            let mut start = clock[server];
            let mut ready = true;
            for dep in &spec.dependencies {
                match available.get(dep) {
                    Some(per_server) => start = start.max(per_server[server]),
                    None => {
                        ready = false;
                        break;
                    }
                }
            }
            if !ready {
                continue;
            }

            queues[server].pop_front();
            progressed = true;
            let finish = start.saturating_add(spec.ctime);
            let per_server = available
                .entry(file)
                .or_insert_with(|| vec![Time::MAX; nservers]);
            for (other, slot) in per_server.iter_mut().enumerate() {
                let at = if other == server {
                    finish
                } else {
                    finish.saturating_add(spec.rtime)
                };
                *slot = (*slot).min(at);
            }
            clock[server] = finish;
        }
        if !progressed {
            break;
        }
    }

    let stuck = queues
        .iter()
        .enumerate()
        .find_map(|(server, queue)| queue.front().map(|&file| (server, file)));
    if let Some((server, file)) = stuck {
        return Err(SimulationError::Stalled {
            remaining: queues.iter().map(VecDeque::len).sum(),
            server,
            file: instance.name(file).to_string(),
        });
    }

    let completion = available
        .into_iter()
        .filter_map(|(file, per_server)| per_server.into_iter().min().map(|at| (file, at)))
        .collect();
    Ok(Replay { completion })
}

/// Score of `submission`.
pub fn evaluate(instance: &Instance, submission: &Submission) -> Result<i64, SimulationError> {
    Ok(replay(instance, submission)?.score(instance))
}

/// Score of an in-memory schedule, replayed from its per-server step order.
pub fn evaluate_schedule(instance: &Instance, schedule: &Schedule) -> Result<i64, SimulationError> {
    evaluate(instance, &Submission::from_schedule(schedule))
}
