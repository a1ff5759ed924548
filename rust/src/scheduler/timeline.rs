//! Per-server timeline with sorted, non-overlapping compilation steps.

use crate::interner::FileId;
use crate::models::Time;

/// One compilation on one server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Step {
    pub file: FileId,
    pub start: Time,
    pub finish: Time,
}

/// Tracks the steps of one server.
///
/// Maintains the invariant that `steps` is sorted by start time and that
/// consecutive steps do not overlap. `clock` is the end of the latest step,
/// `gapped` records that some idle interval exists before `clock`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServerTimeline {
    steps: Vec<Step>,
    clock: Time,
    gapped: bool,
}

/// Watermark state saved before an insertion so it can be undone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct InsertUndo {
    pub index: usize,
    pub clock: Time,
    pub gapped: bool,
}

impl ServerTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Time at or after which the server has no recorded work.
    pub fn clock(&self) -> Time {
        self.clock
    }

    pub fn has_gap(&self) -> bool {
        self.gapped
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Earliest start `>= ready` at which `duration` fits on this server.
    ///
    /// Without a recorded gap this is simply the tail. Otherwise idle
    /// intervals are scanned front to back and the first one wide enough
    /// wins, falling back to the tail.
    pub fn earliest_fit(&self, ready: Time, duration: Time) -> Time {
        let tail = self.clock.max(ready);
        if !self.gapped {
            return tail;
        }

        let mut cursor: Time = 0;
        for step in &self.steps {
            let candidate = cursor.max(ready);
            if candidate.saturating_add(duration) <= step.start {
                return candidate;
            }
            cursor = cursor.max(step.finish);
        }
        tail
    }

    /// Insert a step at the position implied by its start time.
    ///
    /// A zero-length step goes before a step starting at the same instant;
    /// otherwise equal keys keep insertion order. A start beyond the current
    /// clock leaves an idle interval behind, which sets the gap flag.
    pub(crate) fn insert(&mut self, step: Step) -> InsertUndo {
        let undo = InsertUndo {
            index: self
                .steps
                .partition_point(|s| (s.start, s.finish) <= (step.start, step.finish)),
            clock: self.clock,
            gapped: self.gapped,
        };
        if step.start > self.clock {
            self.gapped = true;
        }
        self.clock = self.clock.max(step.finish);
        self.steps.insert(undo.index, step);
        undo
    }

    /// Reverse an `insert`, returning the removed step.
    pub(crate) fn undo_insert(&mut self, undo: InsertUndo) -> Step {
        self.clock = undo.clock;
        self.gapped = undo.gapped;
        self.steps.remove(undo.index)
    }

    /// First pair of neighbouring steps that overlap, if any.
    pub fn first_overlap(&self) -> Option<(Step, Step)> {
        self.steps
            .windows(2)
            .find(|pair| pair[0].finish > pair[1].start || pair[0].start > pair[1].start)
            .map(|pair| (pair[0], pair[1]))
    }
}
