// Copyright (c) The qemu-harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reassembly of the emulator's byte stream into lines.
//!
//! Serial output arrives in arbitrary chunks: a read can end in the middle of a
//! line, or even in the middle of a multi-byte character. [`LineAssembler`]
//! buffers raw bytes and only decodes once a full line is available, so chunk
//! boundaries never affect what the parsers see.

use bstr::ByteSlice;
use bytes::BytesMut;
use std::borrow::Cow;
use tracing::warn;

/// The maximum number of lines kept by a [`BoundedLines`] buffer.
pub const MAX_BUFFERED_LINES: usize = 100;

/// Turns byte chunks into complete, decoded lines.
#[derive(Debug, Default)]
pub struct LineAssembler {
    buf: BytesMut,
    decode_errors: usize,
}

impl LineAssembler {
    /// Creates an empty assembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk of raw output.
    pub fn feed(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Returns the next complete line, if one is buffered.
    ///
    /// The newline and a trailing carriage return are not part of the returned
    /// line.
    pub fn next_line(&mut self) -> Option<String> {
        let newline = self.buf.find_byte(b'\n')?;
        let line = self.buf.split_to(newline + 1);
        let line = &line[..newline];
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        Some(self.decode(line))
    }

    /// Yields every complete line currently buffered, in arrival order.
    ///
    /// A trailing partial line stays buffered. Dropping the iterator early
    /// leaves the remaining lines buffered as well.
    pub fn drain_lines(&mut self) -> impl Iterator<Item = String> + '_ {
        std::iter::from_fn(move || self.next_line())
    }

    /// Returns whatever is left in the buffer as a final line.
    ///
    /// Called once the stream has ended, so output without a trailing newline
    /// is not lost. Returns `None` if the buffer is empty.
    pub fn flush(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = self.buf.split();
        let rest = rest.strip_suffix(b"\r").unwrap_or(&rest[..]);
        Some(self.decode(rest))
    }

    /// The number of bytes buffered but not yet returned as a line.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }

    /// The number of lines that contained malformed UTF-8.
    pub fn decode_errors(&self) -> usize {
        self.decode_errors
    }

    fn decode(&mut self, line: &[u8]) -> String {
        match line.to_str_lossy() {
            Cow::Borrowed(s) => s.to_owned(),
            Cow::Owned(s) => {
                self.decode_errors += 1;
                warn!("replaced malformed UTF-8 in emulator output: {s}");
                s
            }
        }
    }
}

/// A line buffer that stops accepting lines once it holds
/// [`MAX_BUFFERED_LINES`] entries.
///
/// Lines offered after that are dropped, never rotated in: the buffer always
/// holds the *first* lines it was given.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BoundedLines {
    lines: Vec<String>,
    dropped: usize,
}

impl BoundedLines {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a line, returning `false` if the buffer was already full.
    pub fn push(&mut self, line: impl Into<String>) -> bool {
        if self.lines.len() >= MAX_BUFFERED_LINES {
            self.dropped += 1;
            return false;
        }
        self.lines.push(line.into());
        true
    }

    /// The number of buffered lines.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Returns true if no lines are buffered.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The number of lines dropped because the buffer was full.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// The buffered lines, oldest first.
    pub fn as_slice(&self) -> &[String] {
        &self.lines
    }

    /// The last `n` buffered lines (or all of them, if fewer are buffered).
    pub fn tail(&self, n: usize) -> &[String] {
        &self.lines[self.lines.len().saturating_sub(n)..]
    }
}
