//! This file handles GPIO pin allocation, and implements [`GpibBus`] on the
//! RP2040/RP235x pins.
//!
//! The source code serves as the master list of pin assignments for the
//! hardware.  The bus is wired to a pair of 75160/75162-style transceivers,
//! so every GPIB line maps to a single GPIO, and four further GPIOs control
//! the transceivers.

// Copyright (c) 2025 Piers Finlayson <piers@piers.rocks>
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

#[allow(unused_imports)]
use crate::util::log::{debug, error, info, trace, warn};
use embassy_rp::gpio::{AnyPin, Flex, Level, Pull};

use crate::protocol::{GpibBus, Lines};

/// Number of control lines and transceiver pins, one per [`Lines`] flag.
const LINE_COUNT: usize = 12;

/// Pin assignments.  DIO1-8 go to consecutive GPIOs starting at
/// `DATA_BASE`.
pub mod config {
    pub const DATA_BASE: u8 = 2;

    pub const DAV: u8 = 10;
    pub const NRFD: u8 = 11;
    pub const NDAC: u8 = 12;
    pub const EOI: u8 = 13;
    pub const ATN: u8 = 14;
    pub const SRQ: u8 = 15;
    pub const IFC: u8 = 16;
    pub const REN: u8 = 17;

    pub const TE: u8 = 18;
    pub const PE: u8 = 19;
    pub const SC: u8 = 20;
    pub const DC: u8 = 21;
}

/// The pins handed over to [`RpBus`].  The line pins are in [`Lines`] bit
/// order - DAV, NRFD, NDAC, EOI, ATN, SRQ, IFC, REN, TE, PE, SC, DC.
pub struct BusPins {
    pub lines: [AnyPin; LINE_COUNT],
    pub data: [AnyPin; 8],
}

/// [`GpibBus`] on real pins.
///
/// A line driven high is actively driven, not just released.  The
/// transceivers turn that into the open-collector or totem-pole output the
/// bus needs depending on TE and DC.
pub struct RpBus {
    lines: [Flex<'static>; LINE_COUNT],
    data: [Flex<'static>; 8],
}

impl RpBus {
    pub fn new(pins: BusPins) -> Self {
        let mut bus = Self {
            lines: pins.lines.map(Flex::new),
            data: pins.data.map(Flex::new),
        };

        // Until init_pins() runs, leave everything released.
        bus.float(Lines::all());
        bus.float_data();

        debug!(
            "GPIB pins: data {}-{}, DAV {}, TE {}",
            config::DATA_BASE,
            config::DATA_BASE + 7,
            config::DAV,
            config::TE
        );
        bus
    }

    #[inline(always)]
    fn line(&mut self, line: Lines) -> &mut Flex<'static> {
        // Each flag is a single bit, which is its index.
        &mut self.lines[line.bits().trailing_zeros() as usize]
    }

    #[inline(always)]
    fn drive(&mut self, lines: Lines, level: Level) {
        for line in lines.iter() {
            let pin = self.line(line);
            pin.set_level(level);
            pin.set_as_output();
        }
    }
}

impl GpibBus for RpBus {
    #[inline(always)]
    fn drive_low(&mut self, lines: Lines) {
        self.drive(lines, Level::Low);
    }

    #[inline(always)]
    fn drive_high(&mut self, lines: Lines) {
        self.drive(lines, Level::High);
    }

    #[inline(always)]
    fn float(&mut self, lines: Lines) {
        for line in lines.iter() {
            let pin = self.line(line);
            pin.set_as_input();
            pin.set_pull(Pull::Up);
        }
    }

    #[inline(always)]
    fn is_high(&mut self, line: Lines) -> bool {
        self.line(line).is_high()
    }

    #[inline(always)]
    fn drive_data(&mut self, port: u8) {
        for (bit, pin) in self.data.iter_mut().enumerate() {
            pin.set_level(Level::from(port & (1 << bit) != 0));
            pin.set_as_output();
        }
    }

    #[inline(always)]
    fn float_data(&mut self) {
        for pin in self.data.iter_mut() {
            pin.set_as_input();
            pin.set_pull(Pull::Up);
        }
    }

    #[inline(always)]
    fn read_data(&mut self) -> u8 {
        self.data
            .iter()
            .enumerate()
            .fold(0, |port, (bit, pin)| port | ((pin.is_high() as u8) << bit))
    }
}
