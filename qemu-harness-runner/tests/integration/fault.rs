// Copyright (c) The qemu-harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use color_eyre::eyre::Result;
use indoc::indoc;
use pretty_assertions::assert_eq;
use qemu_harness_runner::{runner::RunOutcome, verdict::FaultOutcome};
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(20);

#[test]
fn expected_fault_observed() -> Result<()> {
    let firmware = Firmware::new(indoc! {r#"
        cat <<'OUT'
        F9 microkernel booting
        [FAULT:EXPECT] mpu_write_to_code

        writing to 0x08000100
        MemManage: MEMFAULT DACCVIOL at 0x08000100
        OUT
    "#});

    let (report, out) = run_fault(&firmware, TIMEOUT);
    let report = report?;

    assert_eq!(
        report.results.expected_fault.as_deref(),
        Some("mpu_write_to_code")
    );
    assert!(report.results.panic_found);
    assert_eq!(
        report.results.panic_message,
        "MemManage: MEMFAULT DACCVIOL at 0x08000100"
    );
    // The empty line is neither stored nor echoed.
    assert_eq!(report.results.all_output.len(), 4);
    assert_eq!(report.verdict.outcome, FaultOutcome::Matched);
    assert_eq!(report.verdict.exit_code, 0);

    // Every line is echoed in fault mode, session or not.
    assert!(out.contains("  F9 microkernel booting\n"));
    assert!(out.contains("  [FAULT:EXPECT] mpu_write_to_code\n"));
    Ok(())
}

#[test]
fn expected_fault_not_observed() -> Result<()> {
    let firmware = Firmware::new(indoc! {r#"
        echo "[FAULT:EXPECT] mpu_write_to_code"
        echo "write completed normally"
    "#});

    let (report, _) = run_fault(&firmware, TIMEOUT);
    let report = report?;

    assert!(!report.results.panic_found);
    assert_eq!(report.verdict.outcome, FaultOutcome::PanicNotObserved);
    assert_eq!(report.verdict.exit_code, 1);
    Ok(())
}

#[test]
fn panic_without_expect_marker() -> Result<()> {
    let firmware = Firmware::new("echo 'PANIC: unexpected fault'\n");

    let (report, _) = run_fault(&firmware, TIMEOUT);
    let report = report?;

    assert!(report.results.panic_found);
    assert_eq!(report.verdict.outcome, FaultOutcome::NoExpectMarker);
    assert_eq!(report.verdict.exit_code, 1);
    Ok(())
}

#[test]
fn panic_then_hang_until_timeout() -> Result<()> {
    // A panicking kernel usually spins forever; the verdict still counts the
    // panic.
    let firmware = Firmware::new(indoc! {r#"
        echo "[FAULT:EXPECT] stack_canary_trip"
        echo "Kernel panic: Stack overflow in thread 2"
        exec sleep 30
    "#});

    let (report, _) = run_fault(&firmware, Duration::from_secs(1));
    let report = report?;

    assert_eq!(report.run.outcome, RunOutcome::TimedOut);
    assert_eq!(report.verdict.outcome, FaultOutcome::Matched);
    assert_eq!(report.verdict.exit_code, 0);
    Ok(())
}
