//! Text formats: instances in, submissions in and out.
//!
//! Instance:
//! ```text
//! fileCount targetCount serverCount
//! name ctime rtime          (per file)
//! depCount dep...           (per file)
//! name deadline points      (per target)
//! ```
//! Submission: a step count, then `fileName serverIndex` per step in start
//! order. Blank lines are ignored; line numbers in errors are 1-based.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

use crate::models::{FileDecl, Instance, ModelError, TargetDecl, MAX_SERVERS};
use crate::scheduler::Schedule;
use crate::simulator::Submission;

/// Largest file count an instance may declare.
pub const MAX_FILES: usize = 100_000;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Unexpected end of input, expected {expected}")]
    UnexpectedEof { expected: &'static str },
    #[error("Line {line}: invalid number {token:?}")]
    InvalidNumber { line: usize, token: String },
    #[error("Line {line}: missing {field}")]
    MissingField { line: usize, field: &'static str },
    #[error("Line {line}: {what} {value} is out of range")]
    OutOfRange {
        line: usize,
        what: &'static str,
        value: usize,
    },
    #[error("Line {line}: declared {declared} dependencies but listed {found}")]
    DependencyCountMismatch {
        line: usize,
        declared: usize,
        found: usize,
    },
    #[error("Line {line}: unknown file {name}")]
    UnknownFile { line: usize, name: String },
    #[error("Line {line}: server {server} is outside [0, {nservers})")]
    InvalidServer {
        line: usize,
        server: usize,
        nservers: usize,
    },
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Non-blank lines, split on whitespace, with their 1-based line numbers.
struct Records<'a> {
    lines: std::iter::Enumerate<std::str::Lines<'a>>,
}

struct Record<'a> {
    line: usize,
    tokens: Vec<&'a str>,
}

impl<'a> Records<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines().enumerate(),
        }
    }

    fn next(&mut self, expected: &'static str) -> Result<Record<'a>, ParseError> {
        for (index, line) in self.lines.by_ref() {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if !tokens.is_empty() {
                return Ok(Record {
                    line: index + 1,
                    tokens,
                });
            }
        }
        Err(ParseError::UnexpectedEof { expected })
    }
}

impl<'a> Record<'a> {
    fn field(&self, index: usize, field: &'static str) -> Result<&'a str, ParseError> {
        self.tokens
            .get(index)
            .copied()
            .ok_or(ParseError::MissingField {
                line: self.line,
                field,
            })
    }

    fn number<T: FromStr>(&self, index: usize, field: &'static str) -> Result<T, ParseError> {
        let token = self.field(index, field)?;
        token.parse().map_err(|_| ParseError::InvalidNumber {
            line: self.line,
            token: token.to_string(),
        })
    }

    fn check_range(
        &self,
        value: usize,
        min: usize,
        max: usize,
        what: &'static str,
    ) -> Result<usize, ParseError> {
        if (min..=max).contains(&value) {
            Ok(value)
        } else {
            Err(ParseError::OutOfRange {
                line: self.line,
                what,
                value,
            })
        }
    }
}

pub fn parse_instance(text: &str) -> Result<Instance, ParseError> {
    let mut records = Records::new(text);

    let header = records.next("instance header")?;
    let nfiles = header.number(0, "file count")?;
    let nfiles = header.check_range(nfiles, 1, MAX_FILES, "file count")?;
    let ntargets = header.number(1, "target count")?;
    let ntargets = header.check_range(ntargets, 1, nfiles, "target count")?;
    let nservers = header.number(2, "server count")?;
    let nservers = header.check_range(nservers, 1, MAX_SERVERS, "server count")?;

    let mut decls = Vec::with_capacity(nfiles);
    for _ in 0..nfiles {
        let file = records.next("file record")?;
        let name = file.field(0, "file name")?;
        let ctime = file.number(1, "compile time")?;
        let rtime = file.number(2, "replicate time")?;

        let deps = records.next("dependency record")?;
        let declared: usize = deps.number(0, "dependency count")?;
        let listed = &deps.tokens[1..];
        if listed.len() != declared {
            return Err(ParseError::DependencyCountMismatch {
                line: deps.line,
                declared,
                found: listed.len(),
            });
        }
        decls.push(FileDecl::new(name, ctime, rtime, listed));
    }

    let mut targets = Vec::with_capacity(ntargets);
    for _ in 0..ntargets {
        let target = records.next("target record")?;
        targets.push(TargetDecl::new(
            target.field(0, "target name")?,
            target.number(1, "deadline")?,
            target.number(2, "points")?,
        ));
    }

    Ok(Instance::new(decls, targets, nservers)?)
}

pub fn read_instance(path: &Path) -> Result<Instance, ParseError> {
    parse_instance(&read(path)?)
}

/// Parse a submission against the instance it was written for.
pub fn parse_submission(text: &str, instance: &Instance) -> Result<Submission, ParseError> {
    let mut records = Records::new(text);
    let header = records.next("step count")?;
    let nsteps: usize = header.number(0, "step count")?;

    let nservers = instance.nservers();
    let mut submission = Submission::new(nservers);
    for _ in 0..nsteps {
        let step = records.next("step record")?;
        let name = step.field(0, "file name")?;
        let file = instance.lookup(name).ok_or_else(|| ParseError::UnknownFile {
            line: step.line,
            name: name.to_string(),
        })?;
        let server: usize = step.number(1, "server index")?;
        submission
            .push(server, file)
            .map_err(|_| ParseError::InvalidServer {
                line: step.line,
                server,
                nservers,
            })?;
    }
    Ok(submission)
}

pub fn read_submission(path: &Path, instance: &Instance) -> Result<Submission, ParseError> {
    parse_submission(&read(path)?, instance)
}

/// Render `schedule` as a submission, steps ordered by start time, then
/// server, then position on the server.
pub fn write_submission(instance: &Instance, schedule: &Schedule) -> String {
    let steps = schedule.steps_in_start_order();
    let mut out = String::with_capacity(16 * (steps.len() + 1));
    out.push_str(&steps.len().to_string());
    out.push('\n');
    for (server, step) in steps {
        out.push_str(instance.name(step.file));
        out.push(' ');
        out.push_str(&server.to_string());
        out.push('\n');
    }
    out
}

fn read(path: &Path) -> Result<String, ParseError> {
    fs::read_to_string(path).map_err(|source| ParseError::Io {
        path: path.display().to_string(),
        source,
    })
}
