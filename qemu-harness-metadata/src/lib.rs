// Copyright (c) The qemu-harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Exit codes and other stable interface details of `qemu-harness`.
//!
//! CI scripts key off the harness exit code, so the values documented here are
//! part of the public interface and do not change between releases.

mod exit_codes;

pub use exit_codes::*;
