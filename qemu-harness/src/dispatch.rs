// Copyright (c) The qemu-harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::{ExpectedError, Result},
    output::{OutputContext, OutputOpts, OutputWriter, clap_styles},
};
use camino::Utf8PathBuf;
use clap::Parser;
use qemu_harness_runner::{
    board::BoardConfig,
    emulator::{DEFAULT_MACHINE, EmulatorConfig},
    fault::FaultPatternTable,
    reporter::ReporterBuilder,
    runner::EmulatorRunnerBuilder,
    signal::SignalHandlerKind,
};
use std::time::Duration;
use tracing::{debug, info};

/// Boot a firmware test image under QEMU and report the results.
///
/// The emulator binary is taken from the QEMU environment variable, and
/// defaults to qemu-system-arm.
#[derive(Debug, Parser)]
#[command(
    name = "qemu-harness",
    version,
    styles = clap_styles::style(),
    max_term_width = 100
)]
pub struct QemuHarnessApp {
    /// Path to the firmware image to boot
    #[arg(value_name = "IMAGE")]
    image: Utf8PathBuf,

    /// Timeout in seconds
    #[arg(
        long,
        short,
        value_name = "SECS",
        default_value_t = 30,
        allow_negative_numbers = true
    )]
    timeout: i64,

    /// Run as a fault test (expect a kernel panic)
    #[arg(long)]
    fault: bool,

    /// QEMU machine profile [default: netduinoplus2]
    #[arg(long, value_name = "NAME")]
    machine: Option<String>,

    /// Project directory to read the board configuration from
    #[arg(long, value_name = "DIR")]
    board_dir: Option<Utf8PathBuf>,

    #[command(flatten)]
    output: OutputOpts,
}

impl QemuHarnessApp {
    /// Initializes the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app, returning the exit code for the process.
    pub fn exec(self, output: OutputContext, output_writer: &mut OutputWriter) -> Result<i32> {
        let timeout = self.validate_timeout()?;
        if !self.image.exists() {
            return Err(ExpectedError::ImageNotFound { path: self.image });
        }

        let board = match &self.board_dir {
            Some(dir) => BoardConfig::load(dir)?,
            None => BoardConfig::default(),
        };
        if output.verbose {
            if let Some(cross_compile) = &board.cross_compile {
                info!("toolchain prefix: {cross_compile}");
            }
        }

        let machine = self
            .machine
            .or_else(|| board.machine.clone())
            .unwrap_or_else(|| DEFAULT_MACHINE.to_owned());
        let command = EmulatorConfig::from_env(machine).command(self.image);
        debug!("emulator command: {command}");

        let runner = EmulatorRunnerBuilder::default()
            .set_timeout(timeout)
            .build(command, SignalHandlerKind::Standard)?;

        let mut writer = output_writer.stdout_writer();
        let mut reporter = ReporterBuilder::default()
            .set_colorize(output.should_colorize_stdout())
            .set_board(board.board)
            .build(&mut writer);

        let exit_code = if self.fault {
            let report = runner.run_fault(FaultPatternTable::builtin(), &mut reporter)?;
            reporter
                .report_fault(&report)
                .map_err(|err| ExpectedError::WriteSummary { err })?;
            report.verdict.exit_code
        } else {
            let report = runner.run_suite(&mut reporter)?;
            reporter
                .report_suite(&report)
                .map_err(|err| ExpectedError::WriteSummary { err })?;
            report.verdict.exit_code
        };
        Ok(exit_code)
    }

    fn validate_timeout(&self) -> Result<Duration> {
        match u64::try_from(self.timeout) {
            Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
            _ => Err(ExpectedError::InvalidTimeout {
                timeout: self.timeout,
            }),
        }
    }
}
