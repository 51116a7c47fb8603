//! The hardware seam between the GPIB protocol code and the pins.
//!
//! Every method works in electrical levels, not logical assertion.  GPIB
//! lines are active low, so "assert DAV" is `drive_low(Lines::DAV)` and a
//! line reading high is released by everyone.  The data lines are inverted
//! too - the byte 0x41 is put on the bus as 0xBE.
//!
//! The 74xx488-style transceivers are controlled by four local pins which are
//! not bus lines at all, but share the same [`Lines`] type for convenience:
//!
//! - TE - talk enable, high to transmit on the data and handshake lines
//! - PE - pull-up enable for the data lines
//! - SC - system controller, high to transmit on REN and IFC
//! - DC - direction control, low to transmit on ATN and receive SRQ

// Copyright (c) 2025 Piers Finlayson <piers@piers.rocks>
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

use bitflags::bitflags;

use super::types::Role;

bitflags! {
    /// GPIB control lines, and the local transceiver control pins.
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Lines: u16 {
        const DAV = 1 << 0;
        const NRFD = 1 << 1;
        const NDAC = 1 << 2;
        const EOI = 1 << 3;
        const ATN = 1 << 4;
        const SRQ = 1 << 5;
        const IFC = 1 << 6;
        const REN = 1 << 7;
        const TE = 1 << 8;
        const PE = 1 << 9;
        const SC = 1 << 10;
        const DC = 1 << 11;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Lines {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "Lines({=u16:#x})", self.bits())
    }
}

/// Pin level access for a GPIB interface.
///
/// Implementations must apply changes immediately - the handshake relies on
/// the order in which lines change.
pub trait GpibBus {
    /// Drives `lines` low.
    fn drive_low(&mut self, lines: Lines);

    /// Drives `lines` high.
    fn drive_high(&mut self, lines: Lines);

    /// Makes `lines` inputs with pull-ups, so they read high unless something
    /// else on the bus pulls them low.
    fn float(&mut self, lines: Lines);

    /// Whether a single line currently reads high.
    fn is_high(&mut self, line: Lines) -> bool;

    /// Drives the eight data lines with `port` (bit 0 = DIO1).  The caller
    /// has already inverted the byte.
    fn drive_data(&mut self, port: u8);

    /// Makes the data lines inputs with pull-ups.
    fn float_data(&mut self);

    /// Reads the eight data lines, not inverted.
    fn read_data(&mut self) -> u8;

    /// Whether a single line is being pulled low by someone.
    #[inline]
    fn is_low(&mut self, line: Lines) -> bool {
        !self.is_high(line)
    }
}

/// Puts the bus into its idle state for `role`.
///
/// As controller the adapter owns ATN, IFC and REN, asserting REN.  As
/// device it owns SRQ.  Either way it comes up not talking, with NDAC and
/// NRFD held low, so nothing is sent to it until it is ready.
pub fn init_pins<B: GpibBus + ?Sized>(bus: &mut B, role: Role) {
    match role {
        Role::Controller => {
            bus.drive_low(Lines::TE | Lines::DC);
            bus.drive_high(Lines::PE | Lines::SC);
            bus.float_data();
            bus.drive_high(Lines::ATN);
            bus.float(Lines::SRQ);
            bus.drive_low(Lines::REN);
            bus.drive_high(Lines::IFC | Lines::EOI);
            bus.float(Lines::DAV);
            bus.drive_low(Lines::NDAC | Lines::NRFD);
        }
        Role::Device => {
            bus.drive_low(Lines::TE | Lines::SC);
            bus.drive_high(Lines::PE | Lines::DC);
            bus.float_data();
            bus.float(Lines::ATN);
            bus.drive_high(Lines::SRQ);
            bus.float(Lines::REN | Lines::IFC | Lines::EOI | Lines::DAV);
            bus.drive_low(Lines::NDAC | Lines::NRFD);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::sim::{Drive, SimBus};

    #[test]
    fn controller_pins() {
        let mut bus = SimBus::new();
        init_pins(&mut bus, Role::Controller);

        assert_eq!(bus.drive_of(Lines::TE), Drive::Low);
        assert_eq!(bus.drive_of(Lines::PE), Drive::High);
        assert_eq!(bus.drive_of(Lines::SC), Drive::High);
        assert_eq!(bus.drive_of(Lines::DC), Drive::Low);
        assert_eq!(bus.drive_of(Lines::ATN), Drive::High);
        assert_eq!(bus.drive_of(Lines::SRQ), Drive::Float);
        assert_eq!(bus.drive_of(Lines::REN), Drive::Low);
        assert_eq!(bus.drive_of(Lines::IFC), Drive::High);
        assert_eq!(bus.drive_of(Lines::EOI), Drive::High);
        assert_eq!(bus.drive_of(Lines::DAV), Drive::Float);
        assert_eq!(bus.drive_of(Lines::NDAC), Drive::Low);
        assert_eq!(bus.drive_of(Lines::NRFD), Drive::Low);
        assert_eq!(bus.data_drive(), None);
    }

    #[test]
    fn device_pins() {
        let mut bus = SimBus::new();
        init_pins(&mut bus, Role::Controller);
        init_pins(&mut bus, Role::Device);

        assert_eq!(bus.drive_of(Lines::SC), Drive::Low);
        assert_eq!(bus.drive_of(Lines::DC), Drive::High);
        assert_eq!(bus.drive_of(Lines::ATN), Drive::Float);
        assert_eq!(bus.drive_of(Lines::SRQ), Drive::High);
        assert_eq!(bus.drive_of(Lines::REN), Drive::Float);
        assert_eq!(bus.drive_of(Lines::IFC), Drive::Float);
        assert_eq!(bus.drive_of(Lines::NDAC), Drive::Low);
        assert_eq!(bus.drive_of(Lines::NRFD), Drive::Low);
    }
}
