// Copyright (c) The qemu-harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use clap::Parser;
use color_eyre::Result;
use qemu_harness::{OutputWriter, QemuHarnessApp};
use qemu_harness_metadata::HarnessExitCode;

fn main() -> Result<()> {
    color_eyre::install()?;

    let app = match QemuHarnessApp::try_parse() {
        Ok(app) => app,
        Err(err) => {
            // --help and --version are reported as errors too, but go to
            // stdout and should exit successfully.
            let code = if err.use_stderr() {
                HarnessExitCode::FAILURE
            } else {
                HarnessExitCode::OK
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };
    let output = app.init_output();

    match app.exec(output, &mut OutputWriter::default()) {
        Ok(code) => std::process::exit(code),
        Err(error) => {
            error.display_to_stderr(&output.stderr_styles());
            std::process::exit(error.process_exit_code())
        }
    }
}
