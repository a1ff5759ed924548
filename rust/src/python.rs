//! Python bindings, exposed as the `rust` extension module.

// Allow clippy warning triggered by PyO3 macro expansion
#![allow(clippy::useless_conversion)]

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::config::SolverConfig;
use crate::parser::{parse_instance, parse_submission, write_submission};
use crate::simulator::evaluate;
use crate::solver::solve_instance;

fn value_error(err: impl std::fmt::Display) -> PyErr {
    PyValueError::new_err(err.to_string())
}

/// Solve an instance given as text.
///
/// # Returns
/// * `(submission_text, score)` where score is the replayed total
///
/// # Raises
/// * ValueError if the instance is malformed or scheduling fails
#[pyfunction]
#[pyo3(signature = (instance_text, config=None))]
fn solve(instance_text: &str, config: Option<SolverConfig>) -> PyResult<(String, i64)> {
    let instance = parse_instance(instance_text).map_err(value_error)?;
    let config = config.unwrap_or_default();
    let solution = solve_instance(&instance, &config).map_err(value_error)?;
    Ok((
        write_submission(&instance, &solution.schedule),
        solution.report.score,
    ))
}

/// Replay a submission against an instance, both given as text.
///
/// # Raises
/// * ValueError if either text is malformed or the submission stalls
#[pyfunction]
fn score(instance_text: &str, submission_text: &str) -> PyResult<i64> {
    let instance = parse_instance(instance_text).map_err(value_error)?;
    let submission = parse_submission(submission_text, &instance).map_err(value_error)?;
    evaluate(&instance, &submission).map_err(value_error)
}

#[pymodule]
fn rust(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<SolverConfig>()?;
    m.add_function(wrap_pyfunction!(solve, m)?)?;
    m.add_function(wrap_pyfunction!(score, m)?)?;
    Ok(())
}
