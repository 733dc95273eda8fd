// Copyright (c) The qemu-harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{io::PipeReader, os::fd::OwnedFd};
use tokio::net::unix::pipe;

/// Registers the read end of the output pipe with the Tokio reactor.
///
/// This also switches the pipe to non-blocking mode.
pub(super) fn pipe_receiver(reader: PipeReader) -> std::io::Result<pipe::Receiver> {
    pipe::Receiver::from_owned_fd(OwnedFd::from(reader))
}

/// Asks the emulator to exit.
pub(super) fn terminate(pid: u32) {
    // A failure here means the process already exited, which teardown
    // observes through wait().
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGTERM);
    }
}
