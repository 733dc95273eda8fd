// Copyright (c) The qemu-harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Human-readable output for a run.
//!
//! Everything the harness prints about a run (the banner, the echoed
//! firmware output, and the final summary) goes through a [`Reporter`].
//! Diagnostics such as timeouts are logged through `tracing` instead.

use crate::{
    emulator::EmulatorCommand,
    runner::{FaultRunReport, SuiteRunReport},
    verdict::{FaultOutcome, SuiteOutcome},
    write_str::WriteStr,
};
use owo_colors::{OwoColorize, Style};
use std::{io, time::Duration};

const SEPARATOR_WIDTH: usize = 60;

/// Which kind of run is being reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunMode {
    /// A test suite using the `[TEST:*]` marker protocol.
    Suite,
    /// A fault test expected to end in a panic.
    Fault,
}

/// Builder for [`Reporter`].
#[derive(Debug, Default)]
pub struct ReporterBuilder {
    should_colorize: bool,
    board: Option<String>,
}

impl ReporterBuilder {
    /// Sets whether the output should be colorized.
    pub fn set_colorize(&mut self, should_colorize: bool) -> &mut Self {
        self.should_colorize = should_colorize;
        self
    }

    /// Sets the board name shown in the banner.
    pub fn set_board(&mut self, board: Option<String>) -> &mut Self {
        self.board = board;
        self
    }

    /// Creates a reporter that writes to `writer`.
    pub fn build<'a>(&self, writer: &'a mut dyn WriteStr) -> Reporter<'a> {
        let mut styles = Box::default();
        if self.should_colorize {
            Styles::colorize(&mut styles);
        }
        Reporter {
            writer,
            styles,
            board: self.board.clone(),
        }
    }
}

/// Writes the human-readable account of a run.
pub struct Reporter<'a> {
    writer: &'a mut dyn WriteStr,
    styles: Box<Styles>,
    board: Option<String>,
}

impl Reporter<'_> {
    /// Prints the banner shown before the emulator starts.
    pub fn report_start(
        &mut self,
        command: &EmulatorCommand,
        timeout: Duration,
        mode: RunMode,
    ) -> io::Result<()> {
        let what = match mode {
            RunMode::Suite => "Starting",
            RunMode::Fault => "Starting fault test",
        };
        let tag = "[QEMU]".style(self.styles.tag);
        writeln!(self.writer, "{tag} {what}: {command}")?;
        writeln!(self.writer, "{tag} Timeout: {}s", timeout.as_secs())?;
        if let Some(board) = &self.board {
            writeln!(self.writer, "{tag} Board: {}", board.style(self.styles.board))?;
        }
        self.write_rule('-')?;
        self.writer.write_str_flush()
    }

    /// Echoes a line of firmware output.
    ///
    /// Output is flushed immediately so that it shows up while the emulator
    /// is still running.
    pub fn echo_line(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.writer, "  {}", line.trim_end())?;
        self.writer.write_str_flush()
    }

    /// Prints the separator shown once the emulator has stopped.
    pub fn report_end(&mut self) -> io::Result<()> {
        self.write_rule('-')?;
        self.writer.write_str_flush()
    }

    /// Prints the summary for a test-suite run.
    pub fn report_suite(&mut self, report: &SuiteRunReport) -> io::Result<()> {
        let results = &report.results;
        let verdict = &report.verdict;

        writeln!(self.writer)?;
        self.write_rule('=')?;
        writeln!(
            self.writer,
            "SUMMARY: {} passed, {} failed, {} skipped",
            results.passed.style(self.styles.pass),
            results.failed.style(self.styles.fail),
            results.skipped.style(self.styles.skip),
        )?;
        self.write_rule('=')?;

        let result = match verdict.outcome {
            SuiteOutcome::Passed => "PASSED".style(self.styles.pass),
            SuiteOutcome::Failed => "FAILED".style(self.styles.fail),
            SuiteOutcome::NoTestsRun => "NO TESTS RUN".style(self.styles.skip),
        };
        writeln!(self.writer, "[RESULT] {result}")?;

        let surfaced = verdict.surfaced_output(results);
        if !surfaced.is_empty() {
            writeln!(self.writer)?;
            writeln!(self.writer, "{}", "[DEBUG] Unexpected output:".style(self.styles.debug))?;
            for line in surfaced {
                writeln!(self.writer, "  {line}")?;
            }
        }
        self.writer.write_str_flush()
    }

    /// Prints the summary for a fault-test run.
    pub fn report_fault(&mut self, report: &FaultRunReport) -> io::Result<()> {
        let results = &report.results;

        writeln!(self.writer)?;
        self.write_rule('=')?;
        match &results.expected_fault {
            Some(fault) => writeln!(
                self.writer,
                "FAULT TEST: {}",
                fault.style(self.styles.board)
            )?,
            None => writeln!(self.writer, "FAULT TEST: (no expected fault marker found)")?,
        }
        self.write_rule('=')?;

        match &report.verdict.outcome {
            FaultOutcome::Matched => {
                writeln!(
                    self.writer,
                    "[RESULT] {} - Expected panic detected",
                    "PASSED".style(self.styles.pass)
                )?;
                if !results.panic_message.is_empty() {
                    writeln!(self.writer, "  Panic: {}", results.panic_message)?;
                }
            }
            outcome => {
                writeln!(self.writer, "[RESULT] {}", "FAILED".style(self.styles.fail))?;
                match outcome {
                    FaultOutcome::NoExpectMarker => {
                        writeln!(self.writer, "  No [FAULT:EXPECT] marker found in output")?
                    }
                    FaultOutcome::PanicNotObserved => {
                        writeln!(self.writer, "  Expected panic did not occur")?
                    }
                    FaultOutcome::PanicMismatch { message } => {
                        writeln!(self.writer, "  Panic message: {message}")?
                    }
                    FaultOutcome::Matched => {}
                }
            }
        }
        self.writer.write_str_flush()
    }

    fn write_rule(&mut self, c: char) -> io::Result<()> {
        let rule: String = std::iter::repeat_n(c, SEPARATOR_WIDTH).collect();
        writeln!(self.writer, "{rule}")
    }
}

impl std::fmt::Debug for Reporter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("styles", &self.styles)
            .field("board", &self.board)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct Styles {
    tag: Style,
    board: Style,
    pass: Style,
    fail: Style,
    skip: Style,
    debug: Style,
}

impl Styles {
    fn colorize(&mut self) {
        self.tag = Style::new().bold();
        self.board = Style::new().blue().bold();
        self.pass = Style::new().green().bold();
        self.fail = Style::new().red().bold();
        self.skip = Style::new().yellow().bold();
        self.debug = Style::new().magenta();
    }
}
