//! Logging macros for the solver with verbosity level control.
//!
//! Nothing is formatted when the level is disabled (verbosity=0 costs one
//! integer comparison per call site).
//! Verbosity levels:
//! - 0: SILENT (only errors)
//! - 1: PROGRESS (per-target solves, merge outcomes)
//! - 2: DECISIONS (step commits, pull-forward re-scheduling)
//! - 3: DEBUG (slot scans, exact-search nodes)

/// Verbosity level constants.
pub const VERBOSITY_SILENT: u8 = 0;
pub const VERBOSITY_PROGRESS: u8 = 1;
pub const VERBOSITY_DECISIONS: u8 = 2;
pub const VERBOSITY_DEBUG: u8 = 3;

/// Log at PROGRESS level (verbosity >= 1).
///
/// Used for: sub-instance solves, exact solver results, merge accept/reject.
#[macro_export]
macro_rules! log_progress {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_PROGRESS {
            eprintln!($($arg)*);
        }
    };
}

/// Log at DECISIONS level (verbosity >= 2).
///
/// Used for: server choice, committed start times, pulled-forward dependencies.
#[macro_export]
macro_rules! log_decisions {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_DECISIONS {
            eprintln!($($arg)*);
        }
    };
}

/// Log at DEBUG level (verbosity >= 3).
#[macro_export]
macro_rules! log_debug {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_DEBUG {
            eprintln!($($arg)*);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_are_ordered() {
        assert!(VERBOSITY_SILENT < VERBOSITY_PROGRESS);
        assert!(VERBOSITY_PROGRESS < VERBOSITY_DECISIONS);
        assert!(VERBOSITY_DECISIONS < VERBOSITY_DEBUG);
    }

    #[test]
    fn test_log_macros_compile() {
        let verbosity = VERBOSITY_SILENT;
        log_progress!(verbosity, "target {}", 1);
        log_decisions!(verbosity, "step {} on {}", 2, 0);
        log_debug!(verbosity, "scan {}", 3);
    }
}
