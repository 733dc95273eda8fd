// Copyright (c) The qemu-harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turning the results of a run into a verdict and a process exit code.
//!
//! Verdicts are computed once the read loop has finished and the emulator has
//! been torn down. They only ever read the results records.

use crate::{
    fault::{FaultPatternTable, FaultTestResults, mentions_panic},
    markers::TestResults,
    runner::RunOutcome,
};
use qemu_harness_metadata::HarnessExitCode;

/// The number of unexpected output lines shown when a suite does not pass.
pub const UNEXPECTED_OUTPUT_TAIL: usize = 20;

/// The classification of a test-suite run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SuiteOutcome {
    /// At least one test passed and none failed.
    Passed,
    /// At least one test failed.
    Failed,
    /// No test passed or failed.
    NoTestsRun,
}

/// The verdict for a test-suite run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SuiteVerdict {
    /// The classification of the run.
    pub outcome: SuiteOutcome,
    /// The exit code the harness should exit with.
    pub exit_code: i32,
    /// True if the firmware never printed `[TEST:EXIT]`.
    pub missing_exit_marker: bool,
}

impl SuiteVerdict {
    /// Computes the verdict from the final results and the way the read loop
    /// ended.
    pub fn evaluate(results: &TestResults, run_outcome: &RunOutcome) -> Self {
        let outcome = if results.failed > 0 {
            SuiteOutcome::Failed
        } else if results.passed > 0 {
            SuiteOutcome::Passed
        } else {
            SuiteOutcome::NoTestsRun
        };

        let exit_code = if run_outcome.is_aborted() {
            HarnessExitCode::FAILURE
        } else {
            match (outcome, results.exit_code) {
                (SuiteOutcome::Passed, Some(code)) => code,
                // A failed suite must not exit successfully, even if the
                // firmware claimed it did.
                (SuiteOutcome::Failed, Some(code)) if code != HarnessExitCode::OK => code,
                _ => HarnessExitCode::FAILURE,
            }
        };

        Self {
            outcome,
            exit_code,
            missing_exit_marker: results.exit_code.is_none(),
        }
    }

    /// Returns true if the harness should exit successfully.
    pub fn is_success(&self) -> bool {
        self.exit_code == HarnessExitCode::OK
    }

    /// The unexpected output worth showing alongside this verdict: the last
    /// [`UNEXPECTED_OUTPUT_TAIL`] lines, or nothing if the suite passed.
    pub fn surfaced_output<'a>(&self, results: &'a TestResults) -> &'a [String] {
        match self.outcome {
            SuiteOutcome::Passed => &[],
            SuiteOutcome::Failed | SuiteOutcome::NoTestsRun => {
                results.unexpected_output.tail(UNEXPECTED_OUTPUT_TAIL)
            }
        }
    }
}

/// The classification of a fault-test run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FaultOutcome {
    /// The expected panic was observed.
    Matched,
    /// The firmware never announced which fault it would trigger.
    NoExpectMarker,
    /// A fault was announced, but no panic followed.
    PanicNotObserved,
    /// A panic was observed, but it matched neither the expected fault's
    /// signatures nor the generic `panic` fallback.
    PanicMismatch {
        /// The panic message that was seen.
        message: String,
    },
}

/// The verdict for a fault-test run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FaultVerdict {
    /// The classification of the run.
    pub outcome: FaultOutcome,
    /// The exit code the harness should exit with.
    pub exit_code: i32,
}

impl FaultVerdict {
    /// Computes the verdict from the final results.
    ///
    /// How the read loop ended does not matter: a panic counts even if the
    /// emulator then had to be stopped by the timeout.
    pub fn evaluate(results: &FaultTestResults, table: &FaultPatternTable) -> Self {
        let outcome = match &results.expected_fault {
            None => FaultOutcome::NoExpectMarker,
            Some(_) if !results.panic_found => FaultOutcome::PanicNotObserved,
            Some(fault) => {
                let message = &results.panic_message;
                if table.matches(fault, message) || mentions_panic(message) {
                    FaultOutcome::Matched
                } else {
                    FaultOutcome::PanicMismatch {
                        message: message.clone(),
                    }
                }
            }
        };

        let exit_code = match outcome {
            FaultOutcome::Matched => HarnessExitCode::OK,
            _ => HarnessExitCode::FAILURE,
        };
        Self { outcome, exit_code }
    }

    /// Returns true if the harness should exit successfully.
    pub fn is_success(&self) -> bool {
        self.exit_code == HarnessExitCode::OK
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fault::FaultMatcher,
        markers::MarkerProtocolParser,
        runner::LineConsumer,
        signal::ShutdownEvent,
    };
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn suite_results(output: &str) -> TestResults {
        let mut parser = MarkerProtocolParser::new();
        for line in output.lines() {
            let _ = parser.consume_line(line);
        }
        parser.into_results()
    }

    fn fault_results(output: &str) -> FaultTestResults {
        let mut matcher = FaultMatcher::new(FaultPatternTable::builtin());
        for line in output.lines() {
            let _ = matcher.consume_line(line);
        }
        matcher.into_results()
    }

    #[test]
    fn passing_suite() {
        let results = suite_results(indoc! {"
            === Running 2 tests
            [TEST:RUN] ipc_basic
            [TEST:PASS] ipc_basic
            [TEST:RUN] timer
            [TEST:PASS] timer
            [TEST:EXIT] 0
        "});
        let verdict = SuiteVerdict::evaluate(&results, &RunOutcome::ExitRequested);
        assert_eq!(
            verdict,
            SuiteVerdict {
                outcome: SuiteOutcome::Passed,
                exit_code: 0,
                missing_exit_marker: false,
            }
        );
        assert!(verdict.is_success());
        assert!(verdict.surfaced_output(&results).is_empty());
    }

    #[test_case(Some(0), 1 ; "marker claims success")]
    #[test_case(None, 1 ; "no marker")]
    #[test_case(Some(3), 3 ; "marker code kept")]
    fn failed_suite_exit_code(marker: Option<i32>, expected: i32) {
        let results = TestResults {
            passed: 4,
            failed: 1,
            exit_code: marker,
            ..Default::default()
        };
        let verdict = SuiteVerdict::evaluate(&results, &RunOutcome::Eof);
        assert_eq!(verdict.outcome, SuiteOutcome::Failed);
        assert_eq!(verdict.exit_code, expected);
    }

    #[test_case(Some(0) ; "exit zero")]
    #[test_case(Some(5) ; "exit nonzero")]
    #[test_case(None ; "no exit marker")]
    fn no_tests_run_ignores_exit_marker(marker: Option<i32>) {
        let results = TestResults {
            skipped: 2,
            exit_code: marker,
            ..Default::default()
        };
        let verdict = SuiteVerdict::evaluate(&results, &RunOutcome::ExitRequested);
        assert_eq!(verdict.outcome, SuiteOutcome::NoTestsRun);
        assert_eq!(verdict.exit_code, 1);
    }

    #[test]
    fn passing_suite_without_exit_marker() {
        let results = TestResults {
            passed: 1,
            ..Default::default()
        };
        let verdict = SuiteVerdict::evaluate(&results, &RunOutcome::Eof);
        assert_eq!(verdict.outcome, SuiteOutcome::Passed);
        assert_eq!(verdict.exit_code, 1);
        assert!(verdict.missing_exit_marker);
    }

    #[test_case(RunOutcome::TimedOut ; "timed out")]
    #[test_case(RunOutcome::Interrupted(ShutdownEvent::Interrupt) ; "interrupted")]
    fn aborted_run_always_fails(run_outcome: RunOutcome) {
        let results = TestResults {
            passed: 3,
            exit_code: None,
            ..Default::default()
        };
        let verdict = SuiteVerdict::evaluate(&results, &run_outcome);
        // Counts are kept, only the exit code is forced.
        assert_eq!(verdict.outcome, SuiteOutcome::Passed);
        assert_eq!(verdict.exit_code, 1);
        assert!(!verdict.is_success());
    }

    #[test]
    fn surfaced_output_is_the_tail() {
        let mut results = TestResults {
            failed: 1,
            ..Default::default()
        };
        for i in 0..30 {
            results.unexpected_output.push(format!("noise {i}"));
        }
        let verdict = SuiteVerdict::evaluate(&results, &RunOutcome::Eof);
        let surfaced = verdict.surfaced_output(&results);
        assert_eq!(surfaced.len(), UNEXPECTED_OUTPUT_TAIL);
        assert_eq!(surfaced[0], "noise 10");
        assert_eq!(surfaced[19], "noise 29");
    }

    #[test]
    fn fault_signature_matched() {
        let results = fault_results(indoc! {"
            [FAULT:EXPECT] mpu_write_to_code
            MEMFAULT: MMFAR=0x08000100
        "});
        let verdict = FaultVerdict::evaluate(&results, FaultPatternTable::builtin());
        assert_eq!(verdict.outcome, FaultOutcome::Matched);
        assert_eq!(verdict.exit_code, 0);
    }

    #[test]
    fn fault_without_panic() {
        let results = fault_results(indoc! {"
            [FAULT:EXPECT] mpu_write_to_code
            still running
        "});
        let verdict = FaultVerdict::evaluate(&results, FaultPatternTable::builtin());
        assert_eq!(verdict.outcome, FaultOutcome::PanicNotObserved);
        assert_eq!(verdict.exit_code, 1);
    }

    #[test]
    fn panic_without_expect_marker() {
        let results = fault_results("PANIC: unhandled exception\n");
        let verdict = FaultVerdict::evaluate(&results, FaultPatternTable::builtin());
        assert_eq!(verdict.outcome, FaultOutcome::NoExpectMarker);
        assert_eq!(verdict.exit_code, 1);
    }

    #[test]
    fn unknown_fault_falls_back_to_panic() {
        let results = fault_results(indoc! {"
            [FAULT:EXPECT] bus_error
            Kernel panic: bus error
        "});
        let verdict = FaultVerdict::evaluate(&results, FaultPatternTable::builtin());
        assert_eq!(verdict.outcome, FaultOutcome::Matched);
    }

    #[test]
    fn panic_mismatch() {
        let results = FaultTestResults {
            expected_fault: Some("stack_canary_trip".to_owned()),
            panic_found: true,
            panic_message: "MEMFAULT at 0x0".to_owned(),
            ..Default::default()
        };
        let verdict = FaultVerdict::evaluate(&results, FaultPatternTable::builtin());
        assert_eq!(
            verdict.outcome,
            FaultOutcome::PanicMismatch {
                message: "MEMFAULT at 0x0".to_owned()
            }
        );
        assert_eq!(verdict.exit_code, 1);
    }
}
