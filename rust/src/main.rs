//! Build scheduling CLI.
//!
//! Solve instances, score submissions, or run a whole directory of inputs.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use buildsched_rust::{
    evaluate, log_progress, read_instance, read_submission, solve_instance, write_submission,
    SolverConfig,
};

#[derive(Parser)]
#[command(name = "buildsched")]
#[command(version)]
#[command(about = "Schedule build artifact compilation across servers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve one instance and write the submission.
    Solve {
        /// Instance file
        #[arg(short, long)]
        instance: PathBuf,
        /// Submission file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        solver: SolverArgs,
    },

    /// Replay a submission against an instance and print its score.
    Score {
        /// Instance file
        #[arg(short, long)]
        instance: PathBuf,
        /// Submission file
        #[arg(short, long)]
        solution: PathBuf,
    },

    /// Solve every `*.in` in a directory.
    Batch {
        /// Directory holding the instances
        #[arg(long)]
        input_dir: PathBuf,
        /// Directory receiving one `*.out` per instance
        #[arg(long)]
        output_dir: PathBuf,
        #[command(flatten)]
        solver: SolverArgs,
    },
}

#[derive(Args)]
struct SolverArgs {
    /// 0=silent, 1=progress, 2=decisions, 3=debug
    #[arg(short, long, default_value = "0")]
    verbosity: u8,
    /// Refine small sub-instances with the exact search
    #[arg(long)]
    exact: bool,
    /// Largest sub-instance handed to the exact search
    #[arg(long, default_value = "10")]
    exact_max_files: usize,
    /// Wall-clock limit per exact search, in milliseconds
    #[arg(long, default_value = "2000")]
    time_limit_ms: u64,
    /// Stop an exact search after this long without improvement, in milliseconds
    #[arg(long, default_value = "500")]
    stall_limit_ms: u64,
    /// Re-check every accepted target by replay after each merge
    #[arg(long)]
    strict_merge: bool,
    /// Nesting limit for re-compiling dependencies locally
    #[arg(long, default_value = "32")]
    max_pull_depth: usize,
}

impl From<&SolverArgs> for SolverConfig {
    fn from(args: &SolverArgs) -> Self {
        SolverConfig {
            verbosity: args.verbosity,
            max_pull_depth: args.max_pull_depth,
            exact_enabled: args.exact,
            exact_max_files: args.exact_max_files,
            exact_time_limit_ms: args.time_limit_ms,
            exact_stall_limit_ms: args.stall_limit_ms,
            strict_merge: args.strict_merge,
        }
    }
}

/// Solve `path`, returning the submission text and its replayed score.
fn solve_file(path: &Path, config: &SolverConfig) -> Result<(String, i64)> {
    let instance =
        read_instance(path).with_context(|| format!("loading instance {}", path.display()))?;
    log_progress!(
        config.verbosity,
        "{}: {} files, {} targets, {} servers",
        path.display(),
        instance.len(),
        instance.targets().len(),
        instance.nservers()
    );
    let solution = solve_instance(&instance, config)
        .with_context(|| format!("solving {}", path.display()))?;
    Ok((
        write_submission(&instance, &solution.schedule),
        solution.report.score,
    ))
}

fn score_file(instance: &Path, solution: &Path) -> Result<i64> {
    let instance = read_instance(instance)
        .with_context(|| format!("loading instance {}", instance.display()))?;
    let submission = read_submission(solution, &instance)
        .with_context(|| format!("loading submission {}", solution.display()))?;
    evaluate(&instance, &submission).with_context(|| format!("replaying {}", solution.display()))
}

/// `<stem>.out` under `output_dir`, keeping every dot of the stem.
fn output_path(output_dir: &Path, stem: &OsStr) -> PathBuf {
    output_dir.join(format!("{}.out", stem.to_string_lossy()))
}

fn run_batch(input_dir: &Path, output_dir: &Path, config: &SolverConfig) -> Result<()> {
    let mut inputs: Vec<PathBuf> = fs::read_dir(input_dir)
        .with_context(|| format!("listing {}", input_dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "in"))
        .collect();
    inputs.sort();
    if inputs.is_empty() {
        bail!("no *.in files in {}", input_dir.display());
    }
    fs::create_dir_all(output_dir)
        .with_context(|| format!("creating {}", output_dir.display()))?;

    let mut total = 0i64;
    println!("{:<40} {:>14}", "instance", "score");
    for input in &inputs {
        let (text, _) = solve_file(input, config)?;
        let name = input
            .file_stem()
            .with_context(|| format!("no file name in {}", input.display()))?;
        let output = output_path(output_dir, name);
        fs::write(&output, text).with_context(|| format!("writing {}", output.display()))?;

        // Score what was actually written, as the checker would.
        let score = score_file(input, &output)?;
        total += score;
        println!("{:<40} {:>14}", name.to_string_lossy(), score);
    }
    println!("{:<40} {:>14}", "overall", total);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Solve {
            instance,
            output,
            solver,
        } => {
            let config = SolverConfig::from(&solver);
            let (text, score) = solve_file(&instance, &config)?;
            match output {
                Some(path) => {
                    fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?
                }
                None => print!("{}", text),
            }
            eprintln!("Score = {}", score);
        }
        Commands::Score { instance, solution } => {
            println!("Score = {}", score_file(&instance, &solution)?);
        }
        Commands::Batch {
            input_dir,
            output_dir,
            solver,
        } => {
            run_batch(&input_dir, &output_dir, &SolverConfig::from(&solver))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path_keeps_dotted_stem() {
        let input = Path::new("inputs/x.y.in");
        let stem = input.file_stem().unwrap();
        assert_eq!(output_path(Path::new("out"), stem), Path::new("out/x.y.out"));
        assert_eq!(
            output_path(Path::new("out"), OsStr::new("plain")),
            Path::new("out/plain.out")
        );
    }
}
