// Copyright (c) The qemu-harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING_TARGET, StderrStyles};
use camino::Utf8PathBuf;
use owo_colors::OwoColorize;
use qemu_harness_metadata::HarnessExitCode;
use qemu_harness_runner::errors::{BoardConfigError, LaunchError, RunError};
use std::error::Error;
use thiserror::Error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

// The #[error()] strings are mostly placeholder messages: the expected way to
// print out errors is with the display_to_stderr method, which colorizes
// errors.

/// An error the harness knows how to report.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("timeout must be positive")]
    InvalidTimeout { timeout: i64 },
    #[error("image not found")]
    ImageNotFound { path: Utf8PathBuf },
    #[error("board config error")]
    BoardConfig {
        #[from]
        err: BoardConfigError,
    },
    #[error("run failed")]
    Run {
        #[from]
        err: RunError,
    },
    #[error("error writing summary")]
    WriteSummary {
        #[source]
        err: std::io::Error,
    },
}

impl ExpectedError {
    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::InvalidTimeout { .. }
            | Self::ImageNotFound { .. }
            | Self::BoardConfig { .. }
            | Self::WriteSummary { .. } => HarnessExitCode::FAILURE,
            Self::Run { err } => err.process_exit_code(),
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match self {
            Self::InvalidTimeout { timeout } => {
                tracing::error!(
                    "timeout must be positive, got {}",
                    timeout.style(styles.bold)
                );
                None
            }
            Self::ImageNotFound { path } => {
                tracing::error!("firmware image not found: {}", path.style(styles.bold));
                None
            }
            Self::BoardConfig { err } => {
                tracing::error!("{err}");
                err.source()
            }
            Self::Run { err } => match err {
                RunError::Launch(LaunchError::NotFound { program, .. }) => {
                    // The io::Error adds nothing to "not found".
                    tracing::error!("QEMU not found: {}", program.style(styles.bold));
                    tracing::error!("install QEMU or set the QEMU environment variable");
                    None
                }
                RunError::Launch(launch) => {
                    tracing::error!("{launch}");
                    launch.source()
                }
                other => {
                    tracing::error!("{other}");
                    other.source()
                }
            },
            Self::WriteSummary { err } => {
                tracing::error!("error writing run summary");
                Some(err as &dyn Error)
            }
        };

        while let Some(err) = next_error {
            tracing::error!(target: NO_HEADING_TARGET, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}
