// Copyright (c) The qemu-harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests for the read loop.
//!
//! These run the real loop against a stand-in for QEMU: a shell script that
//! accepts QEMU's command line and runs the "firmware image" (itself a shell
//! script) with `/bin/sh`.

mod fault;
mod fixtures;
mod suite;
