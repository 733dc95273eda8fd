// Copyright (c) The qemu-harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::Utf8TempDir;
use qemu_harness_runner::{
    emulator::{DEFAULT_MACHINE, EmulatorCommand, EmulatorConfig},
    errors::RunError,
    fault::FaultPatternTable,
    reporter::ReporterBuilder,
    runner::{EmulatorRunner, EmulatorRunnerBuilder, FaultRunReport, SuiteRunReport},
    signal::SignalHandlerKind,
};
use std::{fs, os::unix::fs::PermissionsExt, sync::LazyLock, time::Duration};

/// QEMU passes the image as the seventh argument:
/// `-M <machine> -nographic -serial mon:stdio -kernel <image>`.
const FAKE_EMULATOR_SCRIPT: &str = "#!/bin/sh\nexec /bin/sh \"$7\"\n";

/// The fake emulator is written exactly once, before any test spawns it.
/// Writing an executable while other threads fork can otherwise fail with
/// ETXTBSY.
static FAKE_EMULATOR: LazyLock<FakeEmulator> = LazyLock::new(FakeEmulator::new);

struct FakeEmulator {
    // Held so the directory outlives every test.
    _dir: Utf8TempDir,
    program: Utf8PathBuf,
}

impl FakeEmulator {
    fn new() -> Self {
        let dir = Utf8TempDir::with_prefix("qemu-harness-fake-").expect("created temp dir");
        let program = dir.path().join("qemu-system-arm");
        fs::write(&program, FAKE_EMULATOR_SCRIPT).expect("wrote fake emulator");
        fs::set_permissions(&program, fs::Permissions::from_mode(0o755))
            .expect("made fake emulator executable");
        Self { _dir: dir, program }
    }
}

/// A firmware image: a shell script run by the fake emulator.
pub(crate) struct Firmware {
    _dir: Utf8TempDir,
    path: Utf8PathBuf,
}

impl Firmware {
    pub(crate) fn new(script: &str) -> Self {
        let dir = Utf8TempDir::with_prefix("qemu-harness-image-").expect("created temp dir");
        let path = dir.path().join("f9.elf");
        fs::write(&path, script).expect("wrote image");
        Self { _dir: dir, path }
    }

    pub(crate) fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub(crate) fn command(&self) -> EmulatorCommand {
        EmulatorConfig::new(FAKE_EMULATOR.program.as_str(), DEFAULT_MACHINE).command(self.path.clone())
    }
}

pub(crate) fn build_runner(command: EmulatorCommand, timeout: Duration) -> EmulatorRunner {
    EmulatorRunnerBuilder::default()
        .set_timeout(timeout)
        .build(command, SignalHandlerKind::Noop)
        .expect("runner builds")
}

/// Runs a test suite, returning the report and everything the reporter
/// printed.
pub(crate) fn run_suite(
    firmware: &Firmware,
    timeout: Duration,
) -> (Result<SuiteRunReport, RunError>, String) {
    let runner = build_runner(firmware.command(), timeout);
    let mut out = String::new();
    let res = runner.run_suite(&mut ReporterBuilder::default().build(&mut out));
    (res, out)
}

/// Runs a fault test with the built-in pattern table.
pub(crate) fn run_fault(
    firmware: &Firmware,
    timeout: Duration,
) -> (Result<FaultRunReport, RunError>, String) {
    let runner = build_runner(firmware.command(), timeout);
    let mut out = String::new();
    let res = runner.run_fault(
        FaultPatternTable::builtin(),
        &mut ReporterBuilder::default().build(&mut out),
    );
    (res, out)
}
