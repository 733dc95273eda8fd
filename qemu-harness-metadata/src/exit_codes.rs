// Copyright (c) The qemu-harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `qemu-harness` runs.
///
/// The harness deliberately keeps this set small: everything that is not a
/// success or a missing emulator collapses into [`Self::FAILURE`], matching what
/// shell-based CI pipelines expect from a test step.
pub enum HarnessExitCode {}

impl HarnessExitCode {
    /// The firmware test suite passed, or the expected fault was observed.
    pub const OK: i32 = 0;

    /// Generic failure.
    ///
    /// Covers failed assertions, timeouts, runs where no tests were executed,
    /// a missing `[TEST:EXIT]` marker, invalid arguments, and fault tests
    /// where the expected panic did not occur.
    pub const FAILURE: i32 = 1;

    /// The emulator binary could not be found.
    ///
    /// This matches the shell convention for "command not found".
    pub const EMULATOR_NOT_FOUND: i32 = 127;
}
