//! Dependency-aware greedy list scheduler.

use rustc_hash::FxHashSet;

use crate::interner::FileId;
use crate::models::{Instance, ServerId, Time};
use crate::subinstance::SubInstance;
use crate::{log_debug, log_decisions};

use super::schedule::{Schedule, ScheduleError};

/// Places files one at a time at their earliest feasible slot.
///
/// Besides appending at a server's tail, the scheduler reuses idle gaps and,
/// when a dependency would only arrive by replication after the server went
/// idle, compiles that dependency again locally if that is faster.
#[derive(Clone, Copy, Debug)]
pub struct ListScheduler<'a> {
    instance: &'a Instance,
    max_pull_depth: usize,
    verbosity: u8,
}

impl<'a> ListScheduler<'a> {
    pub fn new(instance: &'a Instance, max_pull_depth: usize, verbosity: u8) -> Self {
        Self {
            instance,
            max_pull_depth,
            verbosity,
        }
    }

    /// A scheduler that never re-compiles dependencies locally.
    pub fn without_pull_forward(instance: &'a Instance, verbosity: u8) -> Self {
        Self::new(instance, 0, verbosity)
    }

    pub fn instance(&self) -> &'a Instance {
        self.instance
    }

    /// Latest availability on `server` among the dependencies of `file`.
    pub fn dependency_ready(
        &self,
        schedule: &Schedule,
        server: ServerId,
        file: FileId,
    ) -> Result<Time, ScheduleError> {
        let mut ready: Time = 0;
        for &dep in &self.instance.file(file).dependencies {
            let available = schedule.availability(dep, server).ok_or_else(|| {
                ScheduleError::DependencyNotScheduled {
                    file: self.instance.name(file).to_string(),
                    dependency: self.instance.name(dep).to_string(),
                    server,
                }
            })?;
            ready = ready.max(available);
        }
        Ok(ready)
    }

    /// Earliest start for `file` on `server`, gap-aware.
    pub fn earliest_slot(
        &self,
        schedule: &Schedule,
        server: ServerId,
        file: FileId,
    ) -> Result<Time, ScheduleError> {
        let ready = self.dependency_ready(schedule, server, file)?;
        let timeline = schedule.timeline(server);
        let slot = timeline.earliest_fit(ready, self.instance.file(file).ctime);
        log_debug!(
            self.verbosity,
            "      slot for {} on server {}: ready={} clock={} gap={} -> {}",
            self.instance.name(file),
            server,
            ready,
            timeline.clock(),
            timeline.has_gap(),
            slot
        );
        Ok(slot)
    }

    /// Server giving `file` the earliest start; ties go to the lowest index.
    pub fn earliest_server_for_file(
        &self,
        schedule: &Schedule,
        file: FileId,
    ) -> Result<ServerId, ScheduleError> {
        let mut best: Option<(Time, ServerId)> = None;
        for server in 0..schedule.nservers() {
            let slot = self.earliest_slot(schedule, server, file)?;
            if best.map_or(true, |(best_slot, _)| slot < best_slot) {
                best = Some((slot, server));
            }
        }
        best.map(|(_, server)| server).ok_or(ScheduleError::NoServers)
    }

    /// Schedule `file` on `server`.
    ///
    /// Returns the committed start time, or `None` if the file was already
    /// compiled on that server.
    pub fn add_step(
        &self,
        schedule: &mut Schedule,
        server: ServerId,
        file: FileId,
    ) -> Result<Option<Time>, ScheduleError> {
        let mut visiting = FxHashSet::default();
        self.add_step_guarded(schedule, server, file, 0, &mut visiting)
    }

    fn add_step_guarded(
        &self,
        schedule: &mut Schedule,
        server: ServerId,
        file: FileId,
        depth: usize,
        visiting: &mut FxHashSet<FileId>,
    ) -> Result<Option<Time>, ScheduleError> {
        if schedule.is_placed(server, file) {
            return Ok(None);
        }
        visiting.insert(file);

        if depth < self.max_pull_depth {
            for &dep in &self.instance.file(file).dependencies {
                if visiting.contains(&dep) || schedule.is_placed(server, dep) {
                    continue;
                }
                let available = schedule.availability(dep, server).ok_or_else(|| {
                    ScheduleError::DependencyNotScheduled {
                        file: self.instance.name(file).to_string(),
                        dependency: self.instance.name(dep).to_string(),
                        server,
                    }
                })?;
                if available <= schedule.timeline(server).clock() {
                    continue;
                }
                let slot = self.earliest_slot(schedule, server, dep)?;
                if slot.saturating_add(self.instance.file(dep).ctime) < available {
                    log_decisions!(
                        self.verbosity,
                        "    pull {} onto server {} for {} (local {} < replica {})",
                        self.instance.name(dep),
                        server,
                        self.instance.name(file),
                        slot.saturating_add(self.instance.file(dep).ctime),
                        available
                    );
                    self.add_step_guarded(schedule, server, dep, depth + 1, visiting)?;
                }
            }
        }

        let ready = self.dependency_ready(schedule, server, file)?;
        let start = self.earliest_slot(schedule, server, file)?.max(ready);
        let spec = self.instance.file(file);
        schedule.record_step(server, file, start, spec.ctime, spec.rtime);
        visiting.remove(&file);

        log_decisions!(
            self.verbosity,
            "    {} -> server {} [{}, {})",
            spec.name,
            server,
            start,
            start.saturating_add(spec.ctime)
        );
        Ok(Some(start))
    }

    /// Build a schedule for a sub-instance, dependencies first, each file on
    /// the server where it can start earliest.
    pub fn schedule_sub_instance(&self, sub: &SubInstance) -> Result<Schedule, ScheduleError> {
        let mut schedule = Schedule::new(sub.nservers());
        for &file in sub.files() {
            let server = self.earliest_server_for_file(&schedule, file)?;
            self.add_step(&mut schedule, server, file)?;
        }
        Ok(schedule)
    }
}
