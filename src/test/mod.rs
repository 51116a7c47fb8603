//! Test support for pico488 - a simulated bus and clock, so the protocol code
//! can be exercised on the host.

// Copyright (c) 2025 Piers Finlayson <piers@piers.rocks>
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

pub mod sim;

/// Routes `log` output from the code under test to the test harness.  Use
/// `RUST_LOG=trace` to see it.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
