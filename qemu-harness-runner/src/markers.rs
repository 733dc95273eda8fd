// Copyright (c) The qemu-harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The `[TEST:*]` marker protocol used by ordinary firmware test suites.
//!
//! The firmware's test runner brackets every test with markers on the serial
//! console:
//!
//! ```text
//! === Running 3 tests
//! [TEST:RUN] ipc_basic
//! Test ipc_basic ... ok
//! [TEST:PASS] ipc_basic
//! ...
//! [TEST:SUMMARY] passed=2 failed=0 skipped=1
//! [TEST:EXIT] 0
//! ```
//!
//! Markers are counted as they arrive; the summary line is only used as a
//! cross-check.

use crate::{
    lines::BoundedLines,
    runner::{LineAction, LineConsumer},
};
use std::fmt;
use tracing::{debug, warn};

/// The prefix shared by every test marker.
pub const MARKER_PREFIX: &str = "[TEST:";

/// Seeing a line that contains this string starts the test session.
pub const SESSION_START: &str = "=== Running";

/// Prefixes of kernel debug chatter that is neither echoed nor reported as
/// unexpected.
pub const KNOWN_DEBUG_PREFIXES: [&str; 2] = ["IPC: ", "THREAD_CREATE:"];

/// Prefixes of lines echoed to the terminal once the session has started.
const ECHO_PREFIXES: [&str; 2] = ["=== ", "Test "];

/// A single marker, parsed from a line of output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Marker<'a> {
    /// `[TEST:START] <name>`
    Start(&'a str),
    /// `[TEST:RUN] <name>`
    Run(&'a str),
    /// `[TEST:PASS] <name>`
    Pass(&'a str),
    /// `[TEST:FAIL] <name>`
    Fail(&'a str),
    /// `[TEST:SKIP] <name>`
    Skip(&'a str),
    /// `[TEST:SUMMARY] passed=P failed=F skipped=S`
    Summary(SummaryCounts),
    /// `[TEST:EXIT] <code>`
    Exit(i32),
}

impl<'a> Marker<'a> {
    /// Parses a marker from a line. Surrounding whitespace is ignored.
    ///
    /// Returns `None` for lines that are not markers, including marker tags
    /// missing their required field.
    pub fn parse(line: &'a str) -> Option<Self> {
        let line = line.trim();
        let rest = line.strip_prefix(MARKER_PREFIX)?;
        let (tag, rest) = rest.split_once(']')?;

        // The tag must be followed by at least one whitespace character.
        if !rest.starts_with(char::is_whitespace) {
            return None;
        }
        let mut fields = rest.split_whitespace();
        let first = fields.next()?;

        match tag {
            "START" => Some(Self::Start(first)),
            "RUN" => Some(Self::Run(first)),
            "PASS" => Some(Self::Pass(first)),
            "FAIL" => Some(Self::Fail(first)),
            "SKIP" => Some(Self::Skip(first)),
            "SUMMARY" => {
                let passed = key_value(first, "passed")?;
                let failed = key_value(fields.next()?, "failed")?;
                let skipped = key_value(fields.next()?, "skipped")?;
                Some(Self::Summary(SummaryCounts {
                    passed,
                    failed,
                    skipped,
                }))
            }
            "EXIT" => leading_digits(first)?.parse().ok().map(Self::Exit),
            _ => None,
        }
    }
}

/// Parses `key=<digits>`, ignoring anything after the digits.
fn key_value(field: &str, key: &str) -> Option<usize> {
    let value = field.strip_prefix(key)?.strip_prefix('=')?;
    leading_digits(value)?.parse().ok()
}

fn leading_digits(s: &str) -> Option<&str> {
    let end = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    (end > 0).then(|| &s[..end])
}

/// Pass, fail and skip counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SummaryCounts {
    /// The number of passed tests.
    pub passed: usize,
    /// The number of failed tests.
    pub failed: usize,
    /// The number of skipped tests.
    pub skipped: usize,
}

impl fmt::Display for SummaryCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.passed, self.failed, self.skipped)
    }
}

/// A `[TEST:SUMMARY]` line that disagreed with the tracked counts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SummaryMismatch {
    /// The counts tracked from individual markers.
    pub tracked: SummaryCounts,
    /// The counts the firmware reported.
    pub reported: SummaryCounts,
}

/// Results accumulated from a test-suite run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TestResults {
    /// The number of `[TEST:PASS]` markers seen.
    pub passed: usize,
    /// The number of `[TEST:FAIL]` markers seen.
    pub failed: usize,
    /// The number of `[TEST:SKIP]` markers seen.
    pub skipped: usize,
    /// Tests announced by `[TEST:RUN]`, in order.
    pub tests_run: Vec<String>,
    /// The code from the first `[TEST:EXIT]` marker, if any.
    pub exit_code: Option<i32>,
    /// Output after the session started that was not recognized.
    pub unexpected_output: BoundedLines,
    /// Summary lines that disagreed with the tracked counts.
    pub summary_mismatches: Vec<SummaryMismatch>,
}

impl TestResults {
    /// The tracked counts.
    pub fn counts(&self) -> SummaryCounts {
        SummaryCounts {
            passed: self.passed,
            failed: self.failed,
            skipped: self.skipped,
        }
    }

    /// Applies a marker, returning true if it requests the run to stop.
    pub fn apply(&mut self, marker: Marker<'_>) -> bool {
        match marker {
            Marker::Start(name) => {
                debug!("test {name} started");
            }
            Marker::Run(name) => self.tests_run.push(name.to_owned()),
            Marker::Pass(_) => self.passed += 1,
            Marker::Fail(_) => self.failed += 1,
            Marker::Skip(_) => self.skipped += 1,
            Marker::Summary(reported) => {
                let tracked = self.counts();
                if reported != tracked {
                    warn!("count mismatch: tracked {tracked}, reported {reported}");
                    self.summary_mismatches
                        .push(SummaryMismatch { tracked, reported });
                }
            }
            Marker::Exit(code) => {
                self.exit_code.get_or_insert(code);
                return true;
            }
        }
        false
    }
}

/// Consumes emulator output under the test-suite marker protocol.
#[derive(Debug, Default)]
pub struct MarkerProtocolParser {
    results: TestResults,
    session_started: bool,
}

impl MarkerProtocolParser {
    /// Creates a parser with empty results.
    pub fn new() -> Self {
        Self::default()
    }

    /// The results collected so far.
    pub fn results(&self) -> &TestResults {
        &self.results
    }

    /// Returns true once a `=== Running` line has been seen.
    pub fn session_started(&self) -> bool {
        self.session_started
    }

    /// Finishes parsing, returning the collected results.
    pub fn into_results(self) -> TestResults {
        self.results
    }
}

impl LineConsumer for MarkerProtocolParser {
    fn consume_line(&mut self, line: &str) -> LineAction {
        // Marker side effects come first, independent of display filtering.
        let stop = Marker::parse(line).is_some_and(|marker| self.results.apply(marker));

        let line = line.trim_end();
        if line.contains(SESSION_START) {
            self.session_started = true;
        }

        if stop {
            LineAction::StopRequested
        } else if !self.session_started || line.is_empty() || line.starts_with(MARKER_PREFIX) {
            LineAction::Silent
        } else if ECHO_PREFIXES.iter().any(|prefix| line.starts_with(prefix)) {
            LineAction::Echo
        } else {
            if !KNOWN_DEBUG_PREFIXES
                .iter()
                .any(|prefix| line.starts_with(prefix))
            {
                self.results.unexpected_output.push(line);
            }
            LineAction::Silent
        }
    }
}
