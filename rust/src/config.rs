//! Configuration for the solver.

use std::time::Duration;

#[cfg(feature = "python")]
use pyo3::prelude::*;

use crate::solver::SearchBudget;

/// Knobs for the decomposition + greedy solver and the optional exact search.
#[cfg_attr(feature = "python", pyclass)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SolverConfig {
    /// Verbosity level: 0=silent, 1=progress, 2=decisions, 3=debug.
    #[cfg_attr(feature = "python", pyo3(get, set))]
    pub verbosity: u8,
    /// Maximum nesting of the pull-forward re-scheduling inside add_step.
    #[cfg_attr(feature = "python", pyo3(get, set))]
    pub max_pull_depth: usize,
    /// Whether sub-instances are handed to the exact search after the greedy pass.
    #[cfg_attr(feature = "python", pyo3(get, set))]
    pub exact_enabled: bool,
    /// Largest sub-instance (in files) the exact search is attempted on.
    #[cfg_attr(feature = "python", pyo3(get, set))]
    pub exact_max_files: usize,
    /// Wall-clock limit for one exact search, in milliseconds.
    #[cfg_attr(feature = "python", pyo3(get, set))]
    pub exact_time_limit_ms: u64,
    /// Give up when the incumbent has not improved for this long, in milliseconds.
    #[cfg_attr(feature = "python", pyo3(get, set))]
    pub exact_stall_limit_ms: u64,
    /// Re-validate every previously accepted target (by replay) after each merge.
    ///
    /// A consistency check: merges only add steps and availability only
    /// improves, so on a correct scheduler it never rejects a merge the
    /// default check accepts.
    #[cfg_attr(feature = "python", pyo3(get, set))]
    pub strict_merge: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            max_pull_depth: 32,
            exact_enabled: false,
            exact_max_files: 10,
            exact_time_limit_ms: 2_000,
            exact_stall_limit_ms: 500,
            strict_merge: false,
        }
    }
}

impl SolverConfig {
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn with_exact(mut self, max_files: usize) -> Self {
        self.exact_enabled = true;
        self.exact_max_files = max_files;
        self
    }

    pub fn with_strict_merge(mut self, strict: bool) -> Self {
        self.strict_merge = strict;
        self
    }

    /// Budget handed to the exact search.
    pub fn search_budget(&self) -> SearchBudget {
        SearchBudget {
            time_limit: Duration::from_millis(self.exact_time_limit_ms),
            stall_limit: Duration::from_millis(self.exact_stall_limit_ms),
        }
    }

    /// Whether a sub-instance of `files` files should get an exact search.
    pub fn wants_exact(&self, files: usize) -> bool {
        self.exact_enabled && files <= self.exact_max_files
    }
}

#[cfg(feature = "python")]
#[pymethods]
impl SolverConfig {
    #[new]
    #[pyo3(signature = (
        verbosity=None,
        max_pull_depth=None,
        exact_enabled=None,
        exact_max_files=None,
        exact_time_limit_ms=None,
        exact_stall_limit_ms=None,
        strict_merge=None
    ))]
    #[allow(clippy::too_many_arguments)]
    fn py_new(
        verbosity: Option<u8>,
        max_pull_depth: Option<usize>,
        exact_enabled: Option<bool>,
        exact_max_files: Option<usize>,
        exact_time_limit_ms: Option<u64>,
        exact_stall_limit_ms: Option<u64>,
        strict_merge: Option<bool>,
    ) -> Self {
        let defaults = Self::default();
        Self {
            verbosity: verbosity.unwrap_or(defaults.verbosity),
            max_pull_depth: max_pull_depth.unwrap_or(defaults.max_pull_depth),
            exact_enabled: exact_enabled.unwrap_or(defaults.exact_enabled),
            exact_max_files: exact_max_files.unwrap_or(defaults.exact_max_files),
            exact_time_limit_ms: exact_time_limit_ms.unwrap_or(defaults.exact_time_limit_ms),
            exact_stall_limit_ms: exact_stall_limit_ms.unwrap_or(defaults.exact_stall_limit_ms),
            strict_merge: strict_merge.unwrap_or(defaults.strict_merge),
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "SolverConfig(exact_enabled={}, exact_max_files={}, strict_merge={})",
            self.exact_enabled, self.exact_max_files, self.strict_merge
        )
    }
}
