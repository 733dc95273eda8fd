// Copyright (c) The qemu-harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::EmulatorCommand;
use crate::errors::LaunchError;
use std::{
    io,
    process::{ExitStatus, Stdio},
    time::Duration,
};
use tokio::{
    net::unix::pipe,
    process::{Child, ChildStdin},
};
use tracing::{debug, warn};

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        #[path = "unix.rs"]
        mod unix;
        use unix as os;
    } else {
        compile_error!("the QEMU harness only supports Unix hosts");
    }
}

/// The maximum number of bytes returned by a single read.
///
/// This is the (normal) page size on most systems.
pub const READ_CHUNK_SIZE: usize = 4 * 1024;

/// How long to wait for a terminated emulator to exit before killing it.
pub const TERMINATE_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// The most chunks read when draining output that is still buffered in the
/// pipe. Bounds the drain if the emulator keeps writing.
const MAX_DRAIN_CHUNKS: usize = 256;

/// The result of a non-blocking read.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome<'a> {
    /// Some output was read.
    Data(&'a [u8]),
    /// No data is available right now.
    WouldBlock,
    /// The emulator closed its end of the pipe.
    Eof,
}

/// How the emulator went away during teardown.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TeardownResult {
    /// The emulator had already exited.
    AlreadyExited(ExitStatus),
    /// The emulator exited after being asked to terminate.
    Terminated(ExitStatus),
    /// The emulator had to be killed.
    Killed,
}

/// A running emulator along with its stdio handles.
///
/// stdout and stderr share a single pipe, so the serial console and any
/// diagnostics QEMU prints arrive interleaved in the order they were written.
/// stdin is piped but never written to.
///
/// Dropping an `EmulatorProcess` kills the emulator, but the read loop always
/// calls [`teardown`](Self::teardown) instead, which gives the emulator a
/// chance to exit cleanly first.
#[derive(Debug)]
pub struct EmulatorProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    output: pipe::Receiver,
    buf: Box<[u8; READ_CHUNK_SIZE]>,
}

impl EmulatorProcess {
    /// Spawns the emulator.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(command: &EmulatorCommand) -> Result<Self, LaunchError> {
        let program = command.program();
        let pipe_error = |err| LaunchError::Pipe {
            program: program.to_owned(),
            err,
        };

        let (reader, writer) = io::pipe().map_err(pipe_error)?;
        let stderr_writer = writer.try_clone().map_err(pipe_error)?;

        let mut cmd = std::process::Command::new(program);
        cmd.args(command.args())
            .stdin(Stdio::piped())
            .stdout(writer)
            .stderr(stderr_writer);

        let mut cmd = tokio::process::Command::from(cmd);
        cmd.kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(LaunchError::NotFound {
                    program: program.to_owned(),
                    err,
                });
            }
            Err(err) => {
                return Err(LaunchError::Spawn {
                    program: program.to_owned(),
                    err,
                });
            }
        };
        // The command still holds our copies of the pipe's write end. Close
        // them, otherwise the pipe never reports EOF.
        drop(cmd);

        let output = os::pipe_receiver(reader).map_err(pipe_error)?;
        debug!(pid = ?child.id(), "spawned `{command}`");

        Ok(Self {
            stdin: child.stdin.take(),
            child,
            output,
            buf: Box::new([0; READ_CHUNK_SIZE]),
        })
    }

    /// The process ID of the emulator, if it hasn't been reaped yet.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Waits up to `timeout` for output to become readable.
    ///
    /// Returns false if the timeout elapsed first. A true return does not
    /// guarantee that a subsequent [`try_read`](Self::try_read) returns data.
    pub async fn wait_readable(&self, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, self.output.readable()).await {
            Ok(Ok(())) => true,
            Ok(Err(error)) => {
                // Let try_read surface the error.
                debug!("error waiting for emulator output: {error}");
                true
            }
            Err(_elapsed) => false,
        }
    }

    /// Reads up to [`READ_CHUNK_SIZE`] bytes without blocking.
    pub fn try_read(&mut self) -> ReadOutcome<'_> {
        match self.output.try_read(&mut self.buf[..]) {
            Ok(0) => ReadOutcome::Eof,
            Ok(n) => ReadOutcome::Data(&self.buf[..n]),
            Err(error)
                if matches!(
                    error.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                ReadOutcome::WouldBlock
            }
            Err(error) => {
                warn!("error reading emulator output, treating as end of stream: {error}");
                ReadOutcome::Eof
            }
        }
    }

    /// Reads everything currently buffered in the pipe, without blocking.
    ///
    /// Returns the data read, and whether the end of the stream was reached.
    pub fn drain_available(&mut self) -> (Vec<u8>, bool) {
        let mut data = Vec::new();
        for _ in 0..MAX_DRAIN_CHUNKS {
            match self.try_read() {
                ReadOutcome::Data(chunk) => data.extend_from_slice(chunk),
                ReadOutcome::WouldBlock => return (data, false),
                ReadOutcome::Eof => return (data, true),
            }
        }
        (data, false)
    }

    /// Returns the emulator's exit status if it has already exited.
    pub fn try_exit_status(&mut self) -> Option<ExitStatus> {
        match self.child.try_wait() {
            Ok(status) => status,
            Err(error) => {
                warn!("error checking whether the emulator exited: {error}");
                None
            }
        }
    }

    /// Shuts the emulator down and closes its stdio handles.
    ///
    /// A running emulator is sent SIGTERM and given
    /// [`TERMINATE_GRACE_PERIOD`] to exit before it is killed.
    pub async fn teardown(mut self) -> TeardownResult {
        let result = match self.try_exit_status() {
            Some(status) => TeardownResult::AlreadyExited(status),
            None => self.terminate().await,
        };

        let Self {
            stdin,
            output,
            child,
            ..
        } = self;
        drop(stdin);
        drop(output);
        drop(child);

        debug!(?result, "emulator torn down");
        result
    }

    async fn terminate(&mut self) -> TeardownResult {
        let Some(pid) = self.child.id() else {
            // Already reaped.
            return match self.child.wait().await {
                Ok(status) => TeardownResult::AlreadyExited(status),
                Err(_) => TeardownResult::Killed,
            };
        };

        os::terminate(pid);

        match tokio::time::timeout(TERMINATE_GRACE_PERIOD, self.child.wait()).await {
            Ok(Ok(status)) => TeardownResult::Terminated(status),
            Ok(Err(error)) => {
                warn!("error waiting for emulator to exit: {error}");
                self.kill().await
            }
            Err(_elapsed) => {
                warn!(
                    "emulator did not exit within {:?} of SIGTERM, killing it",
                    TERMINATE_GRACE_PERIOD
                );
                self.kill().await
            }
        }
    }

    async fn kill(&mut self) -> TeardownResult {
        if let Err(error) = self.child.kill().await {
            warn!("error killing emulator: {error}");
        }
        TeardownResult::Killed
    }
}
