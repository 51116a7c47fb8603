//! The byte level GPIB three-wire handshake.
//!
//! Source (talker) side, per byte:
//! - data lines driven with the inverted byte
//! - wait for NRFD to be released by every listener
//! - optionally assert EOI, then assert DAV
//! - wait for NDAC to be released by every listener
//! - release DAV
//!
//! Acceptor (listener) side, per byte:
//! - release NRFD, hold NDAC
//! - wait for DAV to be asserted
//! - assert NRFD, latch the data lines and EOI
//! - release NDAC, wait for DAV to be released, then assert NDAC again
//!
//! Every wait is bounded by the configured timeout, and re-armed at its
//! start.  On a timeout the lines this side was driving are put back into
//! their released state before the error is returned.

// Copyright (c) 2025 Piers Finlayson <piers@piers.rocks>
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

#[allow(unused_imports)]
use crate::util::log::{debug, error, info, trace, warn};

use super::bus::{self, GpibBus, Lines};
use super::driver::{DriverError, Result};
use super::types::Role;
use crate::util::time::{BoundedWait, Clock};

/// Drives a GPIB interface.  Methods making up the higher level operations
/// are spread across this file, `write.rs`, `read.rs`, `controller.rs`,
/// `device.rs` and `listen_only.rs`.
pub struct GpibDriver<B: GpibBus, C: Clock> {
    pub(super) bus: B,
    pub(super) clock: C,
}

impl<B: GpibBus, C: Clock> GpibDriver<B, C> {
    pub fn new(bus: B, clock: C) -> Self {
        Self { bus, clock }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Puts the lines into their idle state for `role`.
    pub fn init_pins(&mut self, role: Role) {
        debug!("Initializing bus lines for {:?}", role);
        bus::init_pins(&mut self.bus, role);
    }

    /// Whether `line` is being pulled low (asserted) by anyone.
    #[inline]
    pub fn is_asserted(&mut self, line: Lines) -> bool {
        self.bus.is_low(line)
    }

    // Waits for `line` to become asserted, or released, within `timeout_ms`.
    // The line is always checked at least once.
    fn wait_for(&mut self, line: Lines, asserted: bool, timeout_ms: u32) -> Result<()> {
        let wait = BoundedWait::start(&self.clock, timeout_ms);
        loop {
            if self.bus.is_low(line) == asserted {
                return Ok(());
            }
            if wait.expired() {
                trace!("Timed out after {}ms", wait.elapsed_ms());
                return Err(DriverError::HandshakeTimeout);
            }
        }
    }

    /// Configures this side to source bytes.  As controller ATN is driven
    /// to select command or data mode.  As device ATN belongs to the
    /// controller and is left alone.
    pub(crate) fn begin_send(&mut self, role: Role, command: bool) {
        self.bus.float(Lines::NDAC | Lines::NRFD);
        if role.is_controller() {
            if command {
                self.bus.drive_low(Lines::ATN);
            } else {
                self.bus.drive_high(Lines::ATN);
            }
        }
        self.bus.drive_high(Lines::TE);
        self.bus.drive_high(Lines::DAV | Lines::EOI);
    }

    /// Configures this side to accept bytes, and signals ready for data.
    pub(crate) fn configure_listen(&mut self, role: Role) {
        self.bus.float_data();
        self.bus.float(Lines::DAV | Lines::EOI);
        if role.is_controller() {
            self.bus.drive_high(Lines::ATN);
        }
        self.bus.drive_low(Lines::TE);
        self.bus.drive_low(Lines::NDAC);
        self.bus.drive_high(Lines::NRFD);
    }

    /// Sources one byte.  [`begin_send`](Self::begin_send) must have been
    /// called first.
    ///
    /// Fails with `BusContention` if NRFD and NDAC both read released on
    /// entry, as that means there is nobody on the bus to accept the byte.
    pub fn send_byte(&mut self, value: u8, assert_eoi: bool, timeout_ms: u32) -> Result<()> {
        if self.bus.is_high(Lines::NRFD) && self.bus.is_high(Lines::NDAC) {
            debug!("NRFD and NDAC both high - no listeners");
            return Err(DriverError::BusContention);
        }

        // Data lines are active low.
        self.bus.drive_data(!value);

        // Wait for all listeners to be ready.
        self.wait_for(Lines::NRFD, false, timeout_ms)
            .inspect_err(|_| debug!("Timeout waiting for NRFD to go high"))?;

        if assert_eoi {
            self.bus.drive_low(Lines::EOI);
        }
        self.bus.drive_low(Lines::DAV);

        // Wait for all listeners to accept.  DAV must not be left asserted
        // if they don't.
        let accepted = self.wait_for(Lines::NDAC, false, timeout_ms);
        self.bus.drive_high(Lines::DAV | Lines::EOI);
        accepted.inspect_err(|_| debug!("Timeout waiting for NDAC to go high"))?;

        trace!("Sent byte 0x{:02x} eoi {}", value, assert_eoi);
        Ok(())
    }

    /// Accepts one byte, returning it and whether EOI was asserted with it.
    pub fn receive_byte(&mut self, role: Role, timeout_ms: u32) -> Result<(u8, bool)> {
        self.configure_listen(role);

        if let Err(e) = self.wait_for(Lines::DAV, true, timeout_ms) {
            self.bus.drive_low(Lines::NRFD);
            trace!("Timeout waiting for DAV to go low");
            return Err(e);
        }

        // Not ready for another byte until this one is finished with.
        self.bus.drive_low(Lines::NRFD);

        let byte = !self.bus.read_data();
        let eoi = self.bus.is_low(Lines::EOI);

        // Accept it, then wait for the talker to drop DAV.
        self.bus.drive_high(Lines::NDAC);
        let released = self.wait_for(Lines::DAV, false, timeout_ms);
        self.bus.drive_low(Lines::NDAC);
        released.inspect_err(|_| debug!("Timeout waiting for DAV to go high"))?;

        trace!("Received byte 0x{:02x} eoi {}", byte, eoi);
        Ok((byte, eoi))
    }
}
