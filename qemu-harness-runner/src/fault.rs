// Copyright (c) The qemu-harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fault tests: runs that are expected to end in a kernel panic.
//!
//! A fault-test image announces what it is about to provoke with
//! `[FAULT:EXPECT] <fault_type>` and then triggers the fault. The run succeeds
//! if a panic shows up in the output afterwards.

use crate::{
    lines::BoundedLines,
    runner::{LineAction, LineConsumer},
};
use regex::{Regex, RegexBuilder};
use std::{collections::BTreeMap, sync::LazyLock};
use tracing::info;

/// The marker announcing which fault a test image is about to trigger.
pub const EXPECT_MARKER: &str = "[FAULT:EXPECT]";

/// The built-in table of fault types and their panic signatures.
static BUILTIN_PATTERNS: LazyLock<FaultPatternTable> = LazyLock::new(|| {
    FaultPatternTable::new([
        (
            "mpu_write_to_code",
            &["Memory fault", "MEMFAULT", "DACCVIOL"][..],
        ),
        ("stack_canary_trip", &["Stack overflow", "canary"][..]),
    ])
    .expect("built-in fault patterns are valid regexes")
});

/// A mapping from fault type to the patterns a genuine panic message for that
/// fault is expected to match.
///
/// All patterns match case-insensitively, anywhere in a line.
#[derive(Clone, Debug)]
pub struct FaultPatternTable {
    patterns: BTreeMap<String, Vec<Regex>>,
}

impl FaultPatternTable {
    /// Builds a table from `(fault_type, patterns)` pairs.
    pub fn new<'a>(
        entries: impl IntoIterator<Item = (&'a str, &'a [&'a str])>,
    ) -> Result<Self, regex::Error> {
        let patterns = entries
            .into_iter()
            .map(|(fault, patterns)| {
                let patterns = patterns
                    .iter()
                    .map(|pattern| RegexBuilder::new(pattern).case_insensitive(true).build())
                    .collect::<Result<Vec<_>, _>>()?;
                Ok::<_, regex::Error>((fault.to_owned(), patterns))
            })
            .collect::<Result<_, regex::Error>>()?;
        Ok(Self { patterns })
    }

    /// The table of fault types known to the kernel's fault tests.
    pub fn builtin() -> &'static Self {
        &BUILTIN_PATTERNS
    }

    /// The patterns registered for `fault`, or an empty slice for unknown
    /// fault types.
    pub fn patterns(&self, fault: &str) -> &[Regex] {
        self.patterns
            .get(fault)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Returns true if `message` matches any pattern registered for `fault`.
    pub fn matches(&self, fault: &str, message: &str) -> bool {
        self.patterns(fault).iter().any(|re| re.is_match(message))
    }

    /// Iterates over the known fault types.
    pub fn fault_types(&self) -> impl Iterator<Item = &str> {
        self.patterns.keys().map(String::as_str)
    }
}

/// Returns true if `line` mentions a panic, in any letter case.
pub fn mentions_panic(line: &str) -> bool {
    line.to_ascii_lowercase().contains("panic")
}

/// Results accumulated from a fault-test run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FaultTestResults {
    /// The fault type from the first `[FAULT:EXPECT]` marker.
    pub expected_fault: Option<String>,
    /// Whether a panic has been seen.
    pub panic_found: bool,
    /// The last line classified as a panic.
    pub panic_message: String,
    /// Every non-empty line of output, up to the buffer limit.
    pub all_output: BoundedLines,
}

/// Consumes emulator output for a fault test.
#[derive(Debug)]
pub struct FaultMatcher<'a> {
    table: &'a FaultPatternTable,
    results: FaultTestResults,
}

impl<'a> FaultMatcher<'a> {
    /// Creates a matcher that looks up panic signatures in `table`.
    pub fn new(table: &'a FaultPatternTable) -> Self {
        Self {
            table,
            results: FaultTestResults::default(),
        }
    }

    /// The results collected so far.
    pub fn results(&self) -> &FaultTestResults {
        &self.results
    }

    /// Finishes matching, returning the collected results.
    pub fn into_results(self) -> FaultTestResults {
        self.results
    }

    fn record_panic(&mut self, line: &str) {
        self.results.panic_found = true;
        self.results.panic_message = line.to_owned();
    }
}

impl LineConsumer for FaultMatcher<'_> {
    fn consume_line(&mut self, line: &str) -> LineAction {
        let line = line.trim_end();
        if line.is_empty() {
            return LineAction::Silent;
        }
        self.results.all_output.push(line);

        if self.results.expected_fault.is_none() {
            if let Some(fault) = parse_expect_marker(line) {
                info!("expecting fault: {fault}");
                self.results.expected_fault = Some(fault.to_owned());
            }
        }

        if mentions_panic(line) {
            self.record_panic(line);
        }

        let signature_matched = self
            .results
            .expected_fault
            .as_deref()
            .is_some_and(|fault| self.table.matches(fault, line));
        if signature_matched {
            self.record_panic(line);
        }

        LineAction::Echo
    }
}

fn parse_expect_marker(line: &str) -> Option<&str> {
    let rest = line.trim_start().strip_prefix(EXPECT_MARKER)?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    rest.split_whitespace().next()
}
