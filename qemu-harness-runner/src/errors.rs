// Copyright (c) The qemu-harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by the harness.

use camino::Utf8PathBuf;
use qemu_harness_metadata::HarnessExitCode;
use std::io;
use thiserror::Error;

/// An error that occurred while launching the emulator.
///
/// No process is running once this error has been returned, and the read loop
/// was never entered.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LaunchError {
    /// The emulator binary does not exist.
    #[error("emulator `{program}` not found (install QEMU or set the QEMU environment variable)")]
    NotFound {
        /// The program that was looked up.
        program: String,

        /// The underlying error.
        #[source]
        err: io::Error,
    },

    /// Creating the pipe that collects the emulator's output failed.
    #[error("failed to create output pipe for emulator `{program}`")]
    Pipe {
        /// The program being launched.
        program: String,

        /// The underlying error.
        #[source]
        err: io::Error,
    },

    /// Spawning the emulator failed for a reason other than a missing binary.
    #[error("failed to spawn emulator `{program}`")]
    Spawn {
        /// The program being launched.
        program: String,

        /// The underlying error.
        #[source]
        err: io::Error,
    },
}

impl LaunchError {
    /// Returns the process exit code the harness should exit with.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::NotFound { .. } => HarnessExitCode::EMULATOR_NOT_FOUND,
            Self::Pipe { .. } | Self::Spawn { .. } => HarnessExitCode::FAILURE,
        }
    }
}

/// An error that occurred while setting up signal handlers.
#[derive(Debug, Error)]
#[error("error setting up signal handler")]
pub struct SignalHandlerSetupError(#[from] io::Error);

/// An error that occurred while loading the board configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BoardConfigError {
    /// A configuration file could not be read.
    #[error("failed to read board config file `{path}`")]
    Read {
        /// The file being read.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: io::Error,
    },

    /// A line in a configuration file could not be parsed.
    #[error("{path}:{line_number}: expected `KEY=value`, found `{line}`")]
    Syntax {
        /// The file being parsed.
        path: Utf8PathBuf,

        /// The 1-based line number.
        line_number: usize,

        /// The offending line.
        line: String,
    },
}

/// An error that occurred while running the emulator.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunError {
    /// Creating the Tokio runtime failed.
    #[error("error creating Tokio runtime")]
    TokioRuntimeCreate(#[source] io::Error),

    /// Setting up signal handlers failed.
    #[error(transparent)]
    SignalHandlerSetup(#[from] SignalHandlerSetupError),

    /// The emulator could not be launched.
    #[error(transparent)]
    Launch(#[from] LaunchError),

    /// Writing output to the terminal failed.
    #[error("error writing harness output")]
    WriteOutput(#[source] io::Error),
}

impl RunError {
    /// Returns the process exit code the harness should exit with.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::Launch(err) => err.process_exit_code(),
            Self::TokioRuntimeCreate(_) | Self::SignalHandlerSetup(_) | Self::WriteOutput(_) => {
                HarnessExitCode::FAILURE
            }
        }
    }
}
