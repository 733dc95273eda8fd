// Copyright (c) The qemu-harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for `qemu-harness`.
//!
//! A run boots a firmware image under QEMU and turns its serial console into a
//! verdict. The pieces, leaves first:
//!
//! * [`lines::LineAssembler`] reassembles raw output chunks into lines.
//! * [`markers::MarkerProtocolParser`] tracks `[TEST:*]` markers for ordinary
//!   test suites.
//! * [`fault::FaultMatcher`] watches for the panic a fault test is expected to
//!   provoke.
//! * [`emulator::EmulatorProcess`] owns the QEMU child process and its pipes.
//! * [`verdict`] turns the collected results into an exit code.
//!
//! [`runner::EmulatorRunner`] drives the read loop that ties them together.

pub mod board;
pub mod emulator;
pub mod errors;
pub mod fault;
pub mod lines;
pub mod markers;
pub mod reporter;
pub mod runner;
pub mod signal;
mod time;
pub mod verdict;
pub mod write_str;
