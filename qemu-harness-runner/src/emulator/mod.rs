// Copyright (c) The qemu-harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Launching and supervising the emulator process.
//!
//! The emulator is always invoked the same way: headless, with the guest's
//! serial port wired to stdio and the firmware image passed as the kernel.
//! Only the binary and the machine profile vary.

mod imp;

pub use imp::*;

use camino::{Utf8Path, Utf8PathBuf};
use std::{ffi::OsString, fmt};

/// The environment variable that overrides the emulator binary.
pub const EMULATOR_ENV: &str = "QEMU";

/// The emulator binary used when [`EMULATOR_ENV`] is not set.
pub const DEFAULT_EMULATOR: &str = "qemu-system-arm";

/// The machine profile used when none is configured.
pub const DEFAULT_MACHINE: &str = "netduinoplus2";

/// Which emulator to run, and how to configure its machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmulatorConfig {
    program: String,
    machine: String,
}

impl EmulatorConfig {
    /// Creates a new config with an explicit program and machine.
    pub fn new(program: impl Into<String>, machine: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            machine: machine.into(),
        }
    }

    /// Resolves the emulator from the [`EMULATOR_ENV`] environment variable.
    pub fn from_env(machine: impl Into<String>) -> Self {
        Self::from_env_value(std::env::var_os(EMULATOR_ENV), machine)
    }

    /// Resolves the emulator from a value of [`EMULATOR_ENV`].
    ///
    /// A missing or empty value selects [`DEFAULT_EMULATOR`].
    pub fn from_env_value(value: Option<OsString>, machine: impl Into<String>) -> Self {
        let program = value
            .map(|value| value.to_string_lossy().into_owned())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_EMULATOR.to_owned());
        Self::new(program, machine)
    }

    /// The emulator binary.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// The machine profile.
    pub fn machine(&self) -> &str {
        &self.machine
    }

    /// Builds the full command line for booting `image`.
    pub fn command(&self, image: impl Into<Utf8PathBuf>) -> EmulatorCommand {
        EmulatorCommand {
            program: self.program.clone(),
            machine: self.machine.clone(),
            image: image.into(),
        }
    }
}

/// A fully resolved emulator invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmulatorCommand {
    program: String,
    machine: String,
    image: Utf8PathBuf,
}

impl EmulatorCommand {
    /// The emulator binary.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// The firmware image being booted.
    pub fn image(&self) -> &Utf8Path {
        &self.image
    }

    /// The arguments passed to the emulator.
    pub fn args(&self) -> [&str; 7] {
        [
            "-M",
            &self.machine,
            "-nographic",
            "-serial",
            "mon:stdio",
            "-kernel",
            self.image.as_str(),
        ]
    }
}

impl fmt::Display for EmulatorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in self.args() {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}
