//! End-to-end orchestration tests with a recording mock runner.

use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;

use stximg_core::{
    run_stage, DirectParams, InvocationError, StageError, StageExit, StageInvocation,
    StageRequest, StageRunner, OUTPUT_SUBPATH,
};

/// Records the invocation it receives and fabricates the executable's
/// behavior: exit code, and whether the output directory appears.
struct MockRunner {
    exit_code: i32,
    stderr: String,
    produce_output: bool,
    seen: RefCell<Vec<StageInvocation>>,
}

impl MockRunner {
    fn succeeding() -> Self {
        Self {
            exit_code: 0,
            stderr: String::new(),
            produce_output: true,
            seen: RefCell::new(Vec::new()),
        }
    }

    fn failing(exit_code: i32, stderr: &str) -> Self {
        Self {
            exit_code,
            stderr: stderr.to_string(),
            produce_output: false,
            seen: RefCell::new(Vec::new()),
        }
    }

    fn last_args(&self) -> Vec<String> {
        self.seen.borrow().last().map(|inv| inv.args.clone()).unwrap_or_default()
    }
}

impl StageRunner for MockRunner {
    fn run(&self, invocation: &StageInvocation) -> Result<StageExit, InvocationError> {
        if self.produce_output {
            fs::create_dir_all(invocation.work_dir.join(OUTPUT_SUBPATH)).unwrap();
        }
        self.seen.borrow_mut().push(invocation.clone());
        Ok(StageExit {
            exit_code: self.exit_code,
            stderr: self.stderr.clone(),
        })
    }
}

fn request(work_root: PathBuf) -> StageRequest {
    StageRequest {
        input_dir: PathBuf::from("/data/experiment"),
        document_path: None,
        direct: DirectParams::default(),
        ch_per_reg_fallback: None,
        dir_size_mib: None,
        work_root,
        program: PathBuf::from("imgproc"),
    }
}

#[test]
fn direct_inputs_only_pass_exactly_their_flags() {
    let work_root = tempfile::tempdir().unwrap();
    let mut req = request(work_root.path().to_path_buf());
    req.direct.clip_min = Some(0.95);
    req.direct.n_processes = Some(4);

    let runner = MockRunner::succeeding();
    let outcome = run_stage(&req, &runner).unwrap();

    assert_eq!(
        runner.last_args(),
        vec![
            "--input-dir",
            "/data/experiment",
            "--clip-min",
            "0.95",
            "--n-processes",
            "4"
        ]
    );
    assert!(outcome.output_dir.ends_with(OUTPUT_SUBPATH));
    assert!(outcome.output_dir.is_dir());
    assert!(outcome.work_dir.starts_with(work_root.path()));
}

#[test]
fn document_and_direct_inputs_merge_with_document_precedence() {
    let work_root = tempfile::tempdir().unwrap();
    let doc_path = work_root.path().join("params.json");
    fs::write(
        &doc_path,
        r#"{"clip_min": 0.0, "level_method": "SCALE_BY_CHUNK",
            "register_aux_view": "nuclei", "channel_count": 12,
            "aux_names": ["nuclei", "cell"], "aux_channel_count": [4, 2]}"#,
    )
    .unwrap();

    let mut req = request(work_root.path().to_path_buf());
    req.document_path = Some(doc_path);
    req.direct.clip_min = Some(0.5);
    req.direct.is_volume = Some(true);

    let runner = MockRunner::succeeding();
    run_stage(&req, &runner).unwrap();

    assert_eq!(
        runner.last_args(),
        vec![
            "--input-dir",
            "/data/experiment",
            "--clip-min",
            "0", // document's falsy 0.0 wins under presence policy
            "--level-method",
            "SCALE_BY_CHUNK",
            "--is-volume",
            "--register-aux-view",
            "nuclei",
            "--ch-per-reg",
            "3", // derived: round(12 / 4)
        ]
    );
}

#[test]
fn reservations_ride_alongside_not_as_flags() {
    let work_root = tempfile::tempdir().unwrap();
    let mut req = request(work_root.path().to_path_buf());
    req.direct.n_processes = Some(5);
    req.dir_size_mib = Some(7500);

    let runner = MockRunner::succeeding();
    let outcome = run_stage(&req, &runner).unwrap();

    let invocation = runner.seen.borrow().last().cloned().unwrap();
    assert_eq!(invocation.reservations.temporary_storage_mib, Some(7500));
    assert_eq!(invocation.reservations.output_storage_mib, 1000);
    assert_eq!(invocation.reservations.cpu_cores, Some(5));
    assert_eq!(invocation.reservations.memory_mib, Some(2400));
    assert!(!invocation.args.iter().any(|arg| arg.contains("memory")));
    assert_eq!(outcome.plan.reservations, invocation.reservations);
}

#[test]
fn executable_failure_is_fatal_with_stderr_surfaced() {
    let work_root = tempfile::tempdir().unwrap();
    let req = request(work_root.path().to_path_buf());

    let runner = MockRunner::failing(3, "tile 14 unreadable");
    let error = run_stage(&req, &runner).unwrap_err();

    match error {
        StageError::ExecutableFailed { exit_code, stderr } => {
            assert_eq!(exit_code, 3);
            assert_eq!(stderr, "tile 14 unreadable");
        },
        other => panic!("expected ExecutableFailed, got {other:?}"),
    }
}

#[test]
fn zero_exit_without_output_is_missing_output() {
    let work_root = tempfile::tempdir().unwrap();
    let req = request(work_root.path().to_path_buf());

    let runner = MockRunner {
        exit_code: 0,
        stderr: String::new(),
        produce_output: false,
        seen: RefCell::new(Vec::new()),
    };
    let error = run_stage(&req, &runner).unwrap_err();
    assert!(matches!(error, StageError::MissingOutput { .. }));
}

#[test]
fn concurrent_style_runs_get_distinct_workspaces() {
    let work_root = tempfile::tempdir().unwrap();
    let req = request(work_root.path().to_path_buf());

    let runner = MockRunner::succeeding();
    let first = run_stage(&req, &runner).unwrap();
    let second = run_stage(&req, &runner).unwrap();

    assert_ne!(first.work_dir, second.work_dir);
    assert_ne!(first.run_token, second.run_token);
    assert!(first.output_dir.is_dir());
    assert!(second.output_dir.is_dir());
}

#[test]
fn invalid_document_aborts_before_any_workspace_is_created() {
    let work_root = tempfile::tempdir().unwrap();
    let doc_path = work_root.path().join("params.json");
    fs::write(&doc_path, r#"{"n_processes": 0}"#).unwrap();

    let run_root = work_root.path().join("runs");
    let mut req = request(run_root.clone());
    req.document_path = Some(doc_path);

    let runner = MockRunner::succeeding();
    let error = run_stage(&req, &runner).unwrap_err();

    assert!(matches!(error, StageError::Document(_)));
    assert!(runner.seen.borrow().is_empty());
    assert!(!run_root.exists());
}
