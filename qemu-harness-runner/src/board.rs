// Copyright (c) The qemu-harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Board configuration read from a firmware project directory.
//!
//! The harness only needs a handful of values from the build configuration:
//! the board name, the toolchain prefix and optionally the QEMU machine. They
//! come from two places, in order of precedence:
//!
//! 1. The Kconfig output in `.config`, where `CONFIG_BOARD_<NAME>=y` selects
//!    the board.
//! 2. `KEY ?= value` defaults in the top-level `Makefile` and in
//!    `mk/toolchain.mk`.
//!
//! A value already set is never overwritten by a later source.

use crate::errors::BoardConfigError;
use camino::Utf8Path;
use std::io;
use tracing::debug;

/// The Kconfig output file, relative to the project directory.
pub const KCONFIG_FILE: &str = ".config";

/// Makefiles whose `?=` defaults are read, relative to the project directory.
pub const MAKEFILES: [&str; 2] = ["Makefile", "mk/toolchain.mk"];

const BOARD_KEY_PREFIX: &str = "CONFIG_BOARD_";

/// Build configuration values used by the harness.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BoardConfig {
    /// The board being built for, e.g. `discoveryf4`.
    pub board: Option<String>,
    /// The cross-compiler prefix, e.g. `arm-none-eabi-`.
    pub cross_compile: Option<String>,
    /// The QEMU machine profile for the board.
    pub machine: Option<String>,
}

impl BoardConfig {
    /// Loads the configuration from a project directory.
    ///
    /// Missing files are skipped.
    pub fn load(project_dir: &Utf8Path) -> Result<Self, BoardConfigError> {
        let mut config = Self::default();

        let kconfig = project_dir.join(KCONFIG_FILE);
        if let Some(contents) = read_optional(&kconfig)? {
            config.merge_if_absent(Self::parse_kconfig(&kconfig, &contents)?);
        }

        for makefile in MAKEFILES {
            let makefile = project_dir.join(makefile);
            if let Some(contents) = read_optional(&makefile)? {
                config.merge_if_absent(Self::parse_makefile(&contents));
            }
        }

        debug!(?config, "loaded board config from {project_dir}");
        Ok(config)
    }

    /// Parses the contents of a Kconfig `.config` file.
    ///
    /// Empty lines and `#` comments are skipped; every other line must be a
    /// `KEY=value` assignment.
    pub fn parse_kconfig(path: &Utf8Path, contents: &str) -> Result<Self, BoardConfigError> {
        let mut config = Self::default();
        for (idx, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(BoardConfigError::Syntax {
                    path: path.to_owned(),
                    line_number: idx + 1,
                    line: line.to_owned(),
                });
            };
            if let Some(board) = key.strip_prefix(BOARD_KEY_PREFIX) {
                if value == "y" && !board.is_empty() {
                    set_if_absent(&mut config.board, board.to_ascii_lowercase());
                }
            }
        }
        Ok(config)
    }

    /// Parses the `KEY ?= value` defaults of a Makefile.
    ///
    /// All other lines are ignored, as are unknown keys.
    pub fn parse_makefile(contents: &str) -> Self {
        let mut config = Self::default();
        for line in contents.lines() {
            let Some((key, value)) = line.split_once("?=") else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim());
            if value.is_empty() {
                continue;
            }
            let slot = match key {
                "BOARD" => &mut config.board,
                "CROSS_COMPILE" => &mut config.cross_compile,
                "QEMU_MACHINE" => &mut config.machine,
                _ => continue,
            };
            set_if_absent(slot, value.to_owned());
        }
        config
    }

    /// Fills in every value that is unset in `self` from `other`.
    pub fn merge_if_absent(&mut self, other: Self) {
        let Self {
            board,
            cross_compile,
            machine,
        } = other;
        if let Some(board) = board {
            set_if_absent(&mut self.board, board);
        }
        if let Some(cross_compile) = cross_compile {
            set_if_absent(&mut self.cross_compile, cross_compile);
        }
        if let Some(machine) = machine {
            set_if_absent(&mut self.machine, machine);
        }
    }
}

fn set_if_absent(slot: &mut Option<String>, value: String) {
    slot.get_or_insert(value);
}

fn read_optional(path: &Utf8Path) -> Result<Option<String>, BoardConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(BoardConfigError::Read {
            path: path.to_owned(),
            err,
        }),
    }
}
