//! Property-based tests for schedule invariants.
//!
//! Random acyclic instances are solved end to end and the resulting
//! schedules are checked against the replay simulator.

use std::time::Duration;

use proptest::prelude::*;
use proptest::sample::Index;
use rustc_hash::FxHashSet;

use buildsched_rust::solver::{BranchAndBound, ExactOutcome, ExactSolver, SearchBudget};
use buildsched_rust::{
    dependency_closure, evaluate, evaluate_schedule, parse_instance, parse_submission, replay,
    solve_instance, write_submission, FileDecl, Instance, ListScheduler, MergeOutcome, Schedule,
    SolverConfig, SubInstance, TargetDecl,
};

type FileSpec = (i64, i64, Vec<Index>);
type TargetSpec = (Index, i64, i64);

fn build(files: Vec<FileSpec>, targets: Vec<TargetSpec>, nservers: usize) -> Instance {
    let nfiles = files.len();
    let names: Vec<String> = (0..nfiles).map(|i| format!("f{}", i)).collect();

    let decls = files
        .into_iter()
        .enumerate()
        .map(|(i, (ctime, rtime, deps))| {
            let mut picked: Vec<&str> = Vec::new();
            if i > 0 {
                for dep in deps {
                    let name = names[dep.index(i)].as_str();
                    if !picked.contains(&name) {
                        picked.push(name);
                    }
                }
            }
            FileDecl::new(&names[i], ctime, rtime, &picked)
        })
        .collect();

    let mut seen = FxHashSet::default();
    let targets = targets
        .into_iter()
        .filter_map(|(which, deadline, points)| {
            let i = which.index(nfiles);
            seen.insert(i)
                .then(|| TargetDecl::new(&names[i], deadline, points))
        })
        .collect();

    Instance::new(decls, targets, nservers).unwrap()
}

/// Random DAGs: every file depends only on files declared before it.
fn arb_instance() -> impl Strategy<Value = Instance> {
    (1usize..10, 1usize..4)
        .prop_flat_map(|(nfiles, nservers)| {
            (
                prop::collection::vec(
                    (0i64..6, 0i64..6, prop::collection::vec(any::<Index>(), 0..3)),
                    nfiles,
                ),
                prop::collection::vec((any::<Index>(), 0i64..40, 1i64..10), 1..4),
                Just(nservers),
            )
        })
        .prop_map(|(files, targets, nservers)| build(files, targets, nservers))
}

proptest! {
    /// Closures list each file once, dependencies before dependents.
    #[test]
    fn closure_is_unique_and_dependency_first(instance in arb_instance()) {
        for &target in instance.targets() {
            let closure = dependency_closure(&instance, instance.name(target)).unwrap();
            let mut seen = FxHashSet::default();
            for &file in &closure {
                for dep in &instance.file(file).dependencies {
                    prop_assert!(seen.contains(dep));
                }
                prop_assert!(seen.insert(file));
            }
            prop_assert_eq!(closure.last().copied(), Some(target));
        }
    }

    /// Solved schedules never overlap and respect every dependency.
    #[test]
    fn solved_schedule_is_valid(instance in arb_instance()) {
        let solution = solve_instance(&instance, &SolverConfig::default()).unwrap();
        prop_assert_eq!(solution.schedule.validate(&instance), Ok(()));
        for timeline in solution.schedule.timelines() {
            prop_assert!(timeline.first_overlap().is_none());
        }
    }

    /// Replaying the same schedule twice, or its written form, gives one score.
    #[test]
    fn evaluation_is_idempotent_and_round_trips(instance in arb_instance()) {
        let solution = solve_instance(&instance, &SolverConfig::default()).unwrap();
        let first = evaluate_schedule(&instance, &solution.schedule).unwrap();
        prop_assert_eq!(evaluate_schedule(&instance, &solution.schedule).unwrap(), first);
        prop_assert_eq!(solution.report.score, first);

        let text = write_submission(&instance, &solution.schedule);
        let parsed = parse_submission(&text, &instance).unwrap();
        prop_assert_eq!(evaluate(&instance, &parsed).unwrap(), first);
    }

    /// Every accepted merge leaves its target on time, by bookkeeping and on replay.
    #[test]
    fn accepted_targets_meet_deadlines(instance in arb_instance(), strict in any::<bool>()) {
        let config = SolverConfig::default().with_strict_merge(strict);
        let solution = solve_instance(&instance, &config).unwrap();
        let replayed = replay(
            &instance,
            &buildsched_rust::Submission::from_schedule(&solution.schedule),
        )
        .unwrap();
        for report in &solution.report.targets {
            if report.outcome != MergeOutcome::Accepted {
                continue;
            }
            let target = instance.lookup(&report.target).unwrap();
            let deadline = instance.file(target).deadline.unwrap();
            let planned = solution.schedule.completion(target).unwrap();
            prop_assert!(planned <= deadline);
            prop_assert!(replayed.completion(target).unwrap() <= deadline);
        }
    }

    /// Replay re-validation after each merge agrees with the bookkeeping check.
    #[test]
    fn strict_merge_matches_default(instance in arb_instance()) {
        let loose = solve_instance(&instance, &SolverConfig::default()).unwrap();
        let strict =
            solve_instance(&instance, &SolverConfig::default().with_strict_merge(true)).unwrap();
        prop_assert_eq!(&strict.report, &loose.report);
        prop_assert_eq!(&strict.schedule, &loose.schedule);
    }

    /// Adding steps never makes an already compiled file available later.
    #[test]
    fn availability_only_improves(instance in arb_instance()) {
        let scheduler = ListScheduler::new(&instance, 32, 0);
        let mut schedule = Schedule::new(instance.nservers());
        for &target in instance.targets() {
            let before = schedule.clone();
            let sub = SubInstance::for_target_id(&instance, target);
            for &file in sub.files() {
                if schedule.is_compiled(file) {
                    continue;
                }
                let server = scheduler.earliest_server_for_file(&schedule, file).unwrap();
                scheduler.add_step(&mut schedule, server, file).unwrap();
            }
            for file in 0..instance.len() as u32 {
                for server in 0..instance.nservers() {
                    if let Some(old) = before.availability(file, server) {
                        prop_assert!(schedule.availability(file, server).unwrap() <= old);
                    }
                }
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Exact results are valid and strictly beat the greedy seed.
    #[test]
    fn exact_search_only_returns_valid_improvements(instance in arb_instance()) {
        let budget = SearchBudget {
            time_limit: Duration::from_millis(50),
            stall_limit: Duration::from_millis(50),
        };
        let scheduler = ListScheduler::new(&instance, 32, 0);
        for &target in instance.targets() {
            let sub = SubInstance::for_target_id(&instance, target);
            let seed = scheduler.schedule_sub_instance(&sub).unwrap();
            let outcome = BranchAndBound::new(0).solve(&instance, &sub, Some(&seed), &budget);
            if let ExactOutcome::Found { schedule, completion, .. } = outcome {
                prop_assert_eq!(schedule.validate(&instance), Ok(()));
                prop_assert_eq!(schedule.completion(target), Some(completion));
                prop_assert!(completion < seed.completion(target).unwrap());
            }
        }
    }
}

#[test]
fn single_server_chain_scores_ten() {
    let instance = parse_instance("2 1 1\nA 2 0\n0\nB 3 0\n1 A\nB 10 5\n").unwrap();
    let submission = parse_submission("2\nA 0\nB 0\n", &instance).unwrap();
    let replayed = replay(&instance, &submission).unwrap();
    assert_eq!(replayed.completion(instance.lookup("B").unwrap()), Some(5));
    assert_eq!(evaluate(&instance, &submission).unwrap(), 10);

    let solution = solve_instance(&instance, &SolverConfig::default()).unwrap();
    assert_eq!(solution.report.score, 10);
    assert_eq!(write_submission(&instance, &solution.schedule), "2\nA 0\nB 0\n");
}

#[test]
fn replication_delays_availability_elsewhere() {
    let instance = parse_instance("1 1 2\nA 1 4\n0\nA 10 1\n").unwrap();
    let a = instance.lookup("A").unwrap();
    let scheduler = ListScheduler::new(&instance, 32, 0);
    let mut schedule = Schedule::new(2);
    scheduler.add_step(&mut schedule, 0, a).unwrap();
    assert_eq!(schedule.availability(a, 0), Some(1));
    assert_eq!(schedule.availability(a, 1), Some(5));
}

#[test]
fn independent_targets_add_up() {
    let instance = parse_instance("2 2 2\nX 2 0\n0\nY 3 0\n0\nX 10 1\nY 10 2\n").unwrap();
    let solution = solve_instance(&instance, &SolverConfig::default()).unwrap();
    assert_eq!(solution.report.score, (10 - 2 + 1) + (10 - 3 + 2));
}

#[test]
fn zero_deadline_scores_nothing() {
    let instance = parse_instance("1 1 1\nT 1 0\n0\nT 0 100\n").unwrap();
    let solution = solve_instance(&instance, &SolverConfig::default()).unwrap();
    assert_eq!(solution.report.score, 0);
    assert_eq!(solution.schedule.step_count(), 1);
}

#[test]
fn huge_times_solve_without_overflow() {
    let instance = parse_instance(
        "2 1 2\nA 9000000000000000000 9000000000000000000\n0\nB 9000000000000000000 0\n1 A\nB 10 5\n",
    )
    .unwrap();
    let solution = solve_instance(&instance, &SolverConfig::default()).unwrap();
    assert_eq!(solution.report.score, 0);
    assert_eq!(solution.schedule.validate(&instance), Ok(()));
    let b = instance.lookup("B").unwrap();
    assert_eq!(solution.schedule.completion(b), Some(i64::MAX));
}

#[test]
fn repeated_target_record_is_scored_once() {
    let instance = parse_instance("2 2 1\nA 2 0\n0\nB 3 0\n1 A\nB 1 1\nB 10 5\n").unwrap();
    assert_eq!(instance.targets().len(), 1);
    let solution = solve_instance(&instance, &SolverConfig::default()).unwrap();
    assert_eq!(solution.report.score, 10);
    assert_eq!(solution.report.targets.len(), 1);
}
