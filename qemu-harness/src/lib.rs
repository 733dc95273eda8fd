// Copyright (c) The qemu-harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runs firmware test images under QEMU and turns their serial output into a
//! pass/fail verdict.
//!
//! Two kinds of images are supported:
//!
//! * Test suites report each test with `[TEST:*]` markers and finish with
//!   `[TEST:EXIT] <code>`.
//! * Fault tests (`--fault`) announce a fault with `[FAULT:EXPECT] <type>`
//!   and are expected to end in a kernel panic.
//!
//! The emulator binary is taken from the `QEMU` environment variable,
//! defaulting to `qemu-system-arm`.

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod output;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::{OutputContext, OutputWriter};
