// Copyright (c) The qemu-harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The read loop that ties the emulator, the line assembler and the output
//! parsers together.
//!
//! A run boots the emulator, then loops until one of these happens:
//!
//! * the firmware prints `[TEST:EXIT]` (test suites only),
//! * the emulator closes its output,
//! * the timeout elapses,
//! * the emulator exits, or
//! * the harness receives a shutdown signal.
//!
//! Whichever way the loop ends, the emulator is torn down exactly once before
//! the verdict is computed.

use crate::{
    emulator::{EmulatorCommand, EmulatorProcess, ReadOutcome, TeardownResult},
    errors::RunError,
    fault::{FaultMatcher, FaultPatternTable, FaultTestResults},
    lines::LineAssembler,
    markers::{MarkerProtocolParser, TestResults},
    reporter::{Reporter, RunMode},
    signal::{ShutdownEvent, SignalHandler, SignalHandlerKind},
    time::{StopwatchStart, stopwatch},
    verdict::{FaultVerdict, SuiteVerdict},
};
use chrono::{DateTime, Local};
use std::{io, process::ExitStatus, time::Duration};
use tokio::runtime::Runtime;
use tracing::{debug, error, info, warn};

/// The default timeout for a run.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How long each iteration of the read loop waits for output.
pub const READINESS_WAIT: Duration = Duration::from_millis(100);

/// How long to let the emulator keep writing after `[TEST:EXIT]`.
pub const EXIT_GRACE_PERIOD: Duration = Duration::from_millis(100);

/// Something that consumes complete lines of emulator output.
pub trait LineConsumer {
    /// Processes a single line, returning what the read loop should do with
    /// it.
    ///
    /// All side effects on the consumer's results happen before this returns,
    /// so they are applied before the line is echoed.
    fn consume_line(&mut self, line: &str) -> LineAction;
}

/// What the read loop should do with a line after it has been consumed.
#[must_use]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineAction {
    /// Don't display the line.
    Silent,
    /// Echo the line to the terminal.
    Echo,
    /// Don't display the line, and stop dispatching further output.
    StopRequested,
}

/// How the read loop ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// The firmware printed its exit marker.
    ExitRequested,
    /// The emulator closed its output stream.
    Eof,
    /// The timeout elapsed.
    TimedOut,
    /// The emulator exited.
    ProcessExited(ExitStatus),
    /// A shutdown signal was received.
    Interrupted(ShutdownEvent),
}

impl RunOutcome {
    /// Returns true if the run was cut short, either by the timeout or by a
    /// signal.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::TimedOut | Self::Interrupted(_))
    }
}

/// Information about a finished read loop, common to both run modes.
#[derive(Clone, Copy, Debug)]
pub struct RunReport {
    /// How the read loop ended.
    pub outcome: RunOutcome,
    /// How the emulator was shut down.
    pub teardown: TeardownResult,
    /// When the emulator was started.
    pub start_time: DateTime<Local>,
    /// How long the read loop ran for.
    pub duration: Duration,
}

/// The result of running a test suite.
#[derive(Clone, Debug)]
pub struct SuiteRunReport {
    /// Information about the read loop.
    pub run: RunReport,
    /// The results collected from the firmware's markers.
    pub results: TestResults,
    /// The verdict.
    pub verdict: SuiteVerdict,
}

/// The result of running a fault test.
#[derive(Clone, Debug)]
pub struct FaultRunReport {
    /// Information about the read loop.
    pub run: RunReport,
    /// The results collected from the output.
    pub results: FaultTestResults,
    /// The verdict.
    pub verdict: FaultVerdict,
}

/// Options for building an [`EmulatorRunner`].
#[derive(Debug, Default)]
pub struct EmulatorRunnerBuilder {
    timeout: Option<Duration>,
}

impl EmulatorRunnerBuilder {
    /// Sets the timeout for the run. Defaults to [`DEFAULT_TIMEOUT`].
    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = Some(timeout);
        self
    }

    /// Creates a new runner.
    pub fn build(
        &self,
        command: EmulatorCommand,
        signal_handler: SignalHandlerKind,
    ) -> Result<EmulatorRunner, RunError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(RunError::TokioRuntimeCreate)?;
        let _guard = runtime.enter();

        // signal_handler.build() must be called from within the guard.
        let signal_handler = signal_handler.build()?;

        Ok(EmulatorRunner {
            command,
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            runtime,
            signal_handler,
        })
    }
}

/// Boots a firmware image under the emulator and collects its results.
///
/// Created using [`EmulatorRunnerBuilder::build`].
#[derive(Debug)]
pub struct EmulatorRunner {
    command: EmulatorCommand,
    timeout: Duration,
    runtime: Runtime,
    signal_handler: SignalHandler,
}

impl EmulatorRunner {
    /// The emulator invocation this runner uses.
    pub fn command(&self) -> &EmulatorCommand {
        &self.command
    }

    /// The timeout for the run.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs a test suite, interpreting output under the `[TEST:*]` marker
    /// protocol.
    pub fn run_suite(self, reporter: &mut Reporter<'_>) -> Result<SuiteRunReport, RunError> {
        let mut parser = MarkerProtocolParser::new();
        let run = self.run(RunMode::Suite, &mut parser, reporter)?;
        let results = parser.into_results();

        if results.exit_code.is_none() && !run.outcome.is_aborted() {
            error!("no [TEST:EXIT] marker found");
        }
        let verdict = SuiteVerdict::evaluate(&results, &run.outcome);
        Ok(SuiteRunReport {
            run,
            results,
            verdict,
        })
    }

    /// Runs a fault test, looking for the panic announced by
    /// `[FAULT:EXPECT]` using the given table of panic signatures.
    pub fn run_fault(
        self,
        table: &FaultPatternTable,
        reporter: &mut Reporter<'_>,
    ) -> Result<FaultRunReport, RunError> {
        let mut matcher = FaultMatcher::new(table);
        let run = self.run(RunMode::Fault, &mut matcher, reporter)?;
        let results = matcher.into_results();

        let verdict = FaultVerdict::evaluate(&results, table);
        Ok(FaultRunReport {
            run,
            results,
            verdict,
        })
    }

    fn run<C: LineConsumer>(
        self,
        mode: RunMode,
        consumer: &mut C,
        reporter: &mut Reporter<'_>,
    ) -> Result<RunReport, RunError> {
        let Self {
            command,
            timeout,
            runtime,
            mut signal_handler,
        } = self;

        reporter
            .report_start(&command, timeout, mode)
            .map_err(RunError::WriteOutput)?;

        let report = runtime.block_on(async {
            // Spawning needs the runtime's reactor.
            let mut process = EmulatorProcess::spawn(&command)?;
            debug!("STARTING -> READING");

            let mut ctx = ReadLoop {
                assembler: LineAssembler::new(),
                consumer,
                reporter: &mut *reporter,
                timeout,
                stopwatch: stopwatch(),
            };
            let res = ctx.run(&mut process, &mut signal_handler).await;
            let snapshot = ctx.stopwatch.snapshot();

            // Every path out of the loop goes through here, including output
            // errors.
            let teardown = process.teardown().await;
            let outcome = res.map_err(RunError::WriteOutput)?;
            debug!(?outcome, "-> DONE");

            Ok::<_, RunError>(RunReport {
                outcome,
                teardown,
                start_time: snapshot.start_time,
                duration: snapshot.duration,
            })
        })?;

        reporter.report_end().map_err(RunError::WriteOutput)?;
        Ok(report)
    }
}

struct ReadLoop<'a, 'r, C> {
    assembler: LineAssembler,
    consumer: &'a mut C,
    reporter: &'a mut Reporter<'r>,
    timeout: Duration,
    stopwatch: StopwatchStart,
}

impl<C: LineConsumer> ReadLoop<'_, '_, C> {
    async fn run(
        &mut self,
        process: &mut EmulatorProcess,
        signal_handler: &mut SignalHandler,
    ) -> io::Result<RunOutcome> {
        loop {
            let readable = tokio::select! {
                readable = process.wait_readable(READINESS_WAIT) => readable,
                Some(event) = signal_handler.recv() => {
                    warn!("received {event}, stopping emulator");
                    debug!("READING -> INTERRUPTED");
                    return Ok(RunOutcome::Interrupted(event));
                }
            };

            let mut eof = false;
            if readable {
                match process.try_read() {
                    ReadOutcome::Data(chunk) => self.assembler.feed(chunk),
                    ReadOutcome::WouldBlock => {}
                    ReadOutcome::Eof => eof = true,
                }
            }

            if self.dispatch_lines()? {
                debug!("READING -> EXIT_REQUESTED");
                tokio::time::sleep(EXIT_GRACE_PERIOD).await;
                let (rest, _) = process.drain_available();
                let discarded = rest.len() + self.assembler.pending_len();
                if discarded > 0 {
                    debug!("discarding {discarded} bytes of output after exit marker");
                }
                return Ok(RunOutcome::ExitRequested);
            }

            if eof {
                debug!("READING -> EOF");
                self.flush()?;
                return Ok(RunOutcome::Eof);
            }

            if self.stopwatch.is_expired(self.timeout) {
                error!("timeout after {}s", self.timeout.as_secs());
                debug!("READING -> TIMED_OUT");
                return Ok(RunOutcome::TimedOut);
            }

            if let Some(status) = process.try_exit_status() {
                debug!("READING -> PROCESS_EXITED");
                let (rest, _) = process.drain_available();
                self.assembler.feed(&rest);
                if !self.dispatch_lines()? {
                    self.flush()?;
                }
                info!("emulator exited with {status}");
                return Ok(RunOutcome::ProcessExited(status));
            }
        }
    }

    /// Dispatches every complete line, returning true if a consumer requested
    /// a stop. Lines after the stop are left in the assembler.
    fn dispatch_lines(&mut self) -> io::Result<bool> {
        while let Some(line) = self.assembler.next_line() {
            if self.dispatch(&line)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(line) = self.assembler.flush() {
            self.dispatch(&line)?;
        }
        Ok(())
    }

    fn dispatch(&mut self, line: &str) -> io::Result<bool> {
        match self.consumer.consume_line(line) {
            LineAction::Silent => Ok(false),
            LineAction::Echo => {
                self.reporter.echo_line(line)?;
                Ok(false)
            }
            LineAction::StopRequested => Ok(true),
        }
    }
}
