// Copyright (c) The qemu-harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use color_eyre::eyre::Result;
use indoc::indoc;
use pretty_assertions::assert_eq;
use qemu_harness_runner::{
    emulator::{DEFAULT_MACHINE, EmulatorConfig, TeardownResult},
    errors::{LaunchError, RunError},
    reporter::ReporterBuilder,
    runner::RunOutcome,
    verdict::SuiteOutcome,
};
use std::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_secs(20);

fn assert_stream_ended(outcome: RunOutcome) {
    // Depending on timing, the loop sees either the pipe closing or the
    // process exiting first.
    assert!(
        matches!(outcome, RunOutcome::Eof | RunOutcome::ProcessExited(_)),
        "unexpected outcome: {outcome:?}"
    );
}

#[test]
fn passing_suite() -> Result<()> {
    let firmware = Firmware::new(indoc! {r#"
        cat <<'OUT'
        F9 microkernel booting
        === Running 2 tests
        [TEST:RUN] ipc_basic
        Test ipc_basic ... ok
        [TEST:PASS] ipc_basic
        IPC: send 1 -> 2
        [TEST:RUN] timer_oneshot
        Test timer_oneshot ... ok
        [TEST:PASS] timer_oneshot
        [TEST:SUMMARY] passed=2 failed=0 skipped=0
        [TEST:EXIT] 0
        OUT
        exec sleep 30
    "#});

    let (report, out) = run_suite(&firmware, TIMEOUT);
    let report = report?;

    assert_eq!(report.run.outcome, RunOutcome::ExitRequested);
    // The emulator was still running and had to be stopped.
    assert!(
        matches!(
            report.run.teardown,
            TeardownResult::Terminated(_) | TeardownResult::Killed
        ),
        "unexpected teardown: {:?}",
        report.run.teardown
    );
    assert_eq!(report.results.passed, 2);
    assert_eq!(report.results.tests_run, vec!["ipc_basic", "timer_oneshot"]);
    assert!(report.results.summary_mismatches.is_empty());
    assert!(report.results.unexpected_output.is_empty());
    assert_eq!(report.verdict.outcome, SuiteOutcome::Passed);
    assert_eq!(report.verdict.exit_code, 0);

    // Only session output is echoed, and markers never are.
    let echoed: Vec<_> = out.lines().filter(|line| line.starts_with("  ")).collect();
    assert_eq!(
        echoed,
        vec![
            "  === Running 2 tests",
            "  Test ipc_basic ... ok",
            "  Test timer_oneshot ... ok",
        ]
    );
    Ok(())
}

#[test]
fn output_after_exit_marker_is_ignored() -> Result<()> {
    let firmware = Firmware::new(indoc! {r#"
        cat <<'OUT'
        === Running 1 tests
        [TEST:PASS] first
        [TEST:EXIT] 0
        [TEST:FAIL] late
        [TEST:EXIT] 3
        OUT
        exec sleep 30
    "#});

    let (report, _) = run_suite(&firmware, TIMEOUT);
    let report = report?;

    assert_eq!(report.run.outcome, RunOutcome::ExitRequested);
    assert_eq!(report.results.passed, 1);
    assert_eq!(report.results.failed, 0);
    assert_eq!(report.results.exit_code, Some(0));
    assert_eq!(report.verdict.exit_code, 0);
    Ok(())
}

#[test]
fn failing_suite_surfaces_unexpected_output() -> Result<()> {
    let firmware = Firmware::new(indoc! {r#"
        cat <<'OUT'
        === Running 2 tests
        [TEST:PASS] ipc_basic
        assertion failed: ktimer.c:88
        [TEST:FAIL] timer_oneshot
        [TEST:EXIT] 0
        OUT
    "#});

    let (report, _) = run_suite(&firmware, TIMEOUT);
    let report = report?;

    assert_eq!(report.verdict.outcome, SuiteOutcome::Failed);
    // The firmware claimed success, but a test failed.
    assert_eq!(report.verdict.exit_code, 1);
    assert_eq!(
        report.verdict.surfaced_output(&report.results),
        ["assertion failed: ktimer.c:88"]
    );

    let mut summary = String::new();
    ReporterBuilder::default()
        .build(&mut summary)
        .report_suite(&report)?;
    assert!(summary.contains("SUMMARY: 1 passed, 1 failed, 0 skipped\n"));
    assert!(summary.contains("[RESULT] FAILED\n"));
    assert!(summary.contains("  assertion failed: ktimer.c:88\n"));
    Ok(())
}

#[test]
fn missing_exit_marker() -> Result<()> {
    let firmware = Firmware::new(indoc! {r#"
        echo "=== Running 1 tests"
        echo "[TEST:PASS] only"
    "#});

    let (report, _) = run_suite(&firmware, TIMEOUT);
    let report = report?;

    assert_stream_ended(report.run.outcome);
    assert_eq!(report.results.passed, 1);
    assert!(report.verdict.missing_exit_marker);
    assert_eq!(report.verdict.exit_code, 1);
    Ok(())
}

#[test]
fn trailing_line_without_newline() -> Result<()> {
    // stderr shares the pipe with stdout.
    let firmware = Firmware::new(indoc! {r#"
        printf '[TEST:PASS] a\n' >&2
        printf '[TEST:PASS] b\n[TEST:EXIT] 0'
    "#});

    let (report, _) = run_suite(&firmware, TIMEOUT);
    let report = report?;

    assert_eq!(report.results.passed, 2);
    assert_eq!(report.results.exit_code, Some(0));
    assert_eq!(report.verdict.exit_code, 0);
    Ok(())
}

#[test]
fn timeout_keeps_counts() -> Result<()> {
    let firmware = Firmware::new(indoc! {r#"
        echo "=== Running 3 tests"
        echo "[TEST:PASS] one"
        echo "[TEST:SKIP] two"
        exec sleep 30
    "#});

    let start = Instant::now();
    let (report, _) = run_suite(&firmware, Duration::from_secs(1));
    let report = report?;

    assert_eq!(report.run.outcome, RunOutcome::TimedOut);
    assert_eq!(report.results.passed, 1);
    assert_eq!(report.results.skipped, 1);
    assert_eq!(report.verdict.exit_code, 1);
    // SIGTERM is enough to stop `sleep`, so the kill grace period is not
    // waited out.
    assert!(start.elapsed() < Duration::from_secs(10));
    Ok(())
}

#[test]
fn no_tests_run() -> Result<()> {
    let firmware = Firmware::new(indoc! {r#"
        echo "=== Running 0 tests"
        echo "HardFault in thread 4"
        echo "[TEST:EXIT] 0"
    "#});

    let (report, _) = run_suite(&firmware, TIMEOUT);
    let report = report?;

    assert_eq!(report.verdict.outcome, SuiteOutcome::NoTestsRun);
    assert_eq!(report.verdict.exit_code, 1);
    assert_eq!(
        report.verdict.surfaced_output(&report.results),
        ["HardFault in thread 4"]
    );
    Ok(())
}

#[test]
fn missing_emulator() {
    let firmware = Firmware::new("echo never runs\n");
    let command = EmulatorConfig::new("/nonexistent/qemu-system-arm", DEFAULT_MACHINE)
        .command(firmware.path());
    let runner = build_runner(command, TIMEOUT);

    let mut out = String::new();
    let err = runner
        .run_suite(&mut ReporterBuilder::default().build(&mut out))
        .expect_err("emulator binary does not exist");

    assert!(
        matches!(&err, RunError::Launch(LaunchError::NotFound { program, .. })
            if program == "/nonexistent/qemu-system-arm"),
        "unexpected error: {err:?}"
    );
    assert_eq!(err.process_exit_code(), 127);
    // Only the banner was printed: no output was read.
    assert!(!out.contains("  "), "output: {out}");
}
