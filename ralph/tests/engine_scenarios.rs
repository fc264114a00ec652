//! Engine-level scenarios driven through prepare + loop with a scripted agent.
//!
//! The scripted agent flips `passes` in the task list the way a real agent
//! would, so these tests exercise selection, verification, and the
//! retrospective without spawning any backend.

use std::fs;
use std::time::Duration;

use chrono::Local;
use ralph::io::task_store::{load_task_list, write_task_list};
use ralph::looping::{LoopConfig, LoopEvent, LoopStop, run_loop};
use ralph::prepare::{PrepareOptions, prepare_run};
use ralph::test_support::{ScriptedAgent, ScriptedRun, story, task_list};

fn config(max_iterations: u32) -> LoopConfig {
    LoopConfig {
        max_iterations,
        delay: Duration::ZERO,
        agent_timeout: Duration::from_secs(5),
        report_file: "RETROSPECTIVE.md".to_string(),
    }
}

/// Two stories, budget of three: the agent finishes one story per iteration,
/// so the run completes after iteration 2 and reflects once.
#[test]
fn two_stories_complete_in_two_iterations() {
    let temp = tempfile::tempdir().expect("tempdir");
    let prd = temp.path().join("prd.json");
    write_task_list(
        &prd,
        &task_list("ralph/scenario-a", vec![story("A", false), story("B", false)]),
    )
    .expect("write task list");

    let prepared = prepare_run(
        &PrepareOptions {
            task_list_path: &prd,
            workspace: false,
            force_reset: false,
            workspace_base: None,
        },
        Local::now(),
    )
    .expect("prepare");
    let agent = ScriptedAgent::new(vec![
        ScriptedRun::completes(&["A"]),
        ScriptedRun::completes(&["B"]),
    ]);
    let mut completed_counts = Vec::new();

    let outcome = run_loop(&prepared.paths, &agent, &config(3), |event| {
        if let LoopEvent::IterationFinished { .. } = event {
            let list = load_task_list(&prd).expect("reload");
            completed_counts.push(list.completed_count());
        }
    })
    .expect("loop");

    assert_eq!(outcome.stop, LoopStop::Complete { iterations: 2 });
    assert!(outcome.retrospective_ok);
    assert_eq!(completed_counts, vec![1, 2]);
    assert!(completed_counts.windows(2).all(|w| w[0] <= w[1]));

    // Two iteration transcripts and one retrospective transcript.
    let logs: Vec<String> = fs::read_dir(&prepared.paths.logs_dir)
        .expect("logs dir")
        .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(logs.len(), 3);
    assert!(logs.iter().any(|n| n.starts_with("A-iter1-")));
    assert!(logs.iter().any(|n| n.starts_with("B-iter2-")));
    assert!(logs.iter().any(|n| n.starts_with("retrospective-")));
}

/// One story the agent never finishes, budget of two: the run is exhausted
/// after iteration 2 and still gets a partial retrospective.
#[test]
fn unfinished_story_exhausts_budget() {
    let temp = tempfile::tempdir().expect("tempdir");
    let prd = temp.path().join("prd.json");
    write_task_list(&prd, &task_list("ralph/scenario-b", vec![story("A", false)]))
        .expect("write task list");

    let prepared = prepare_run(
        &PrepareOptions {
            task_list_path: &prd,
            workspace: false,
            force_reset: false,
            workspace_base: None,
        },
        Local::now(),
    )
    .expect("prepare");
    let agent = ScriptedAgent::new(Vec::new());

    let outcome = run_loop(&prepared.paths, &agent, &config(2), |_| {}).expect("loop");

    assert_eq!(
        outcome.stop,
        LoopStop::Exhausted {
            iterations: 2,
            remaining: 1
        }
    );
    assert_eq!(outcome.completed, 0);
    let requests = agent.requests();
    assert_eq!(requests.len(), 3);
    assert!(requests[2].prompt.contains("0 of 1 stories pass"));
}

/// Switching the task list to a new branch archives the previous run before
/// the engine starts, and the new run begins with a fresh progress log.
#[test]
fn new_branch_rotates_run_state_before_looping() {
    let temp = tempfile::tempdir().expect("tempdir");
    let prd = temp.path().join("prd.json");
    let options = PrepareOptions {
        task_list_path: &prd,
        workspace: false,
        force_reset: false,
        workspace_base: None,
    };

    write_task_list(&prd, &task_list("ralph/first", vec![story("A", false)])).expect("write");
    let first = prepare_run(&options, Local::now()).expect("prepare first");
    fs::write(&first.paths.progress_path, "notes from the first run\n").expect("progress");

    write_task_list(&prd, &task_list("ralph/second", vec![story("B", false)])).expect("write");
    let second = prepare_run(&options, Local::now()).expect("prepare second");

    let archived = second.run_state.archived.expect("archived");
    assert!(
        archived
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with("-first"))
    );
    assert!(
        fs::read_to_string(archived.join("progress.txt"))
            .expect("archived progress")
            .contains("notes from the first run")
    );
    assert!(
        !fs::read_to_string(&second.paths.progress_path)
            .expect("progress")
            .contains("notes from the first run")
    );

    let again = prepare_run(&options, Local::now()).expect("prepare again");
    assert_eq!(again.run_state.archived, None);
}
