//! Operations only the system controller performs: addressing devices,
//! serial polling them, triggering them and clearing the interface.
//!
//! Multi-step operations stop at the first step to fail, and return that
//! error.  The bus is left in whatever addressed state the completed steps
//! put it in.

// Copyright (c) 2025 Piers Finlayson <piers@piers.rocks>
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

#[allow(unused_imports)]
use crate::util::log::{debug, error, info, trace, warn};

use super::bus::{GpibBus, Lines};
use super::command::BusCommand;
use super::driver::{DriverError, Result};
use super::gpib::GpibDriver;
use super::types::{Address, Direction};
use crate::config::Config;
use crate::constants::{CONTROLLER_ADDR, IFC_PULSE_US, MAX_TRIGGER_ADDRESSES};
use crate::util::time::Clock;

/// Result of a group trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TriggerReport {
    /// Addresses which were sent GET.
    pub triggered: u8,

    /// The first failure, if any address failed.
    pub first_error: Option<DriverError>,
}

impl TriggerReport {
    pub fn result(&self) -> Result<()> {
        match self.first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl<B: GpibBus, C: Clock> GpibDriver<B, C> {
    fn require_controller(cfg: &Config) -> Result<()> {
        if cfg.mode.is_controller() {
            Ok(())
        } else {
            Err(DriverError::RoleViolation)
        }
    }

    /// Addresses the device at `addr` for a transfer.
    ///
    /// - [`Direction::Out`] - SEND SETUP: MTA (controller), UNL, device
    ///   listen address, SAD.
    /// - [`Direction::In`] - RECEIVE SETUP: UNL, MLA (controller), device
    ///   talk address, SAD.
    ///
    /// The address is checked before anything is put on the bus.
    pub fn addressing_setup(&mut self, cfg: &Config, addr: Address, direction: Direction) -> Result<()> {
        Self::require_controller(cfg)?;
        addr.validate()
            .inspect_err(|_| debug!("Device address out of range: {:?}", addr))?;

        trace!("Addressing setup {:?} {:?}", direction, addr);
        match direction {
            Direction::Out => {
                self.send_command(cfg, BusCommand::Talk(CONTROLLER_ADDR))?;
                self.send_command(cfg, BusCommand::Unlisten)?;
                self.send_command(cfg, BusCommand::Listen(addr.pad))?;
            }
            Direction::In => {
                self.send_command(cfg, BusCommand::Unlisten)?;
                self.send_command(cfg, BusCommand::Listen(CONTROLLER_ADDR))?;
                self.send_command(cfg, BusCommand::Talk(addr.pad))?;
            }
        }
        if let Some(sad) = addr.sad {
            self.send_command(cfg, BusCommand::Secondary(sad))?;
        }
        Ok(())
    }

    /// Serial polls the device at `addr`, returning its status byte.
    pub fn read_status_byte(&mut self, cfg: &Config, addr: Address) -> Result<u8> {
        Self::require_controller(cfg)?;
        addr.validate()?;

        self.send_command(cfg, BusCommand::Unlisten)?;
        self.send_command(cfg, BusCommand::Listen(CONTROLLER_ADDR))?;
        self.send_command(cfg, BusCommand::Spe)?;
        self.send_command(cfg, BusCommand::Talk(addr.pad))?;
        if let Some(sad) = addr.sad {
            self.send_command(cfg, BusCommand::Secondary(sad))?;
        }

        let (status, _eoi) = self.receive_byte(cfg.mode, cfg.timeout())?;

        self.send_command(cfg, BusCommand::Spd)?;
        self.send_command(cfg, BusCommand::Untalk)?;

        debug!("Status byte from {}: 0x{:02x}", addr.pad, status);
        Ok(status)
    }

    /// Pulses IFC, unaddressing every device and making this adapter
    /// controller in charge.
    pub fn send_interface_clear(&mut self, cfg: &Config) -> Result<()> {
        Self::require_controller(cfg)
            .inspect_err(|_| debug!("Cannot send IFC while not in controller mode"))?;

        self.bus.drive_low(Lines::IFC);
        self.clock.delay_us(IFC_PULSE_US);
        self.bus.drive_high(Lines::IFC);
        Ok(())
    }

    /// Addresses the device at `addr` to listen, then sends it `command`.
    pub fn send_addressed_command(
        &mut self,
        cfg: &Config,
        addr: Address,
        command: BusCommand,
    ) -> Result<()> {
        self.addressing_setup(cfg, addr, Direction::Out)?;
        self.send_command(cfg, command)
    }

    /// Sends GET to each address in turn.
    ///
    /// A failure on one address skips the rest of that address only, and the
    /// list carries on.  The report counts the addresses triggered and
    /// holds the first failure.  Only the first [`MAX_TRIGGER_ADDRESSES`]
    /// entries are used.
    pub fn send_group_trigger(&mut self, cfg: &Config, addrs: &[Address]) -> TriggerReport {
        let mut report = TriggerReport::default();

        if let Err(e) = Self::require_controller(cfg) {
            report.first_error = Some(e);
            return report;
        }

        if addrs.len() > MAX_TRIGGER_ADDRESSES {
            debug!("Trigger list of {} truncated", addrs.len());
        }

        for &addr in addrs.iter().take(MAX_TRIGGER_ADDRESSES) {
            match self.send_addressed_command(cfg, addr, BusCommand::Get) {
                Ok(()) => report.triggered += 1,
                Err(e) => {
                    debug!("Trigger failed for {:?}: {}", addr, e);
                    report.first_error.get_or_insert(e);
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::Role;
    use crate::test::sim::{Drive, SimBus, SimClock, Sourced};

    fn driver() -> GpibDriver<SimBus, SimClock> {
        let mut driver = GpibDriver::new(SimBus::new(), SimClock::new());
        driver.init_pins(Role::Controller);
        driver
    }

    fn cfg() -> Config {
        Config {
            timeout_ms: 20,
            ..Config::default()
        }
    }

    fn device_cfg() -> Config {
        Config {
            mode: Role::Device,
            ..cfg()
        }
    }

    #[test]
    fn send_setup_sequence() {
        let mut d = driver();
        d.addressing_setup(&cfg(), Address::primary(5), Direction::Out)
            .unwrap();
        assert_eq!(d.bus().accepted_commands(), vec![0x40, 0x3f, 0x25]);
    }

    #[test]
    fn receive_setup_with_secondary() {
        let mut d = driver();
        d.addressing_setup(&cfg(), Address::new(9, Some(2)), Direction::In)
            .unwrap();
        assert_eq!(d.bus().accepted_commands(), vec![0x3f, 0x20, 0x49, 0x62]);
    }

    #[test]
    fn out_of_range_address_sends_nothing() {
        let mut d = driver();
        assert_eq!(
            d.addressing_setup(&cfg(), Address::primary(31), Direction::Out),
            Err(DriverError::InvalidAddress)
        );
        assert_eq!(
            d.addressing_setup(&cfg(), Address::new(3, Some(31)), Direction::In),
            Err(DriverError::InvalidAddress)
        );
        assert!(d.bus().peer.accepted.is_empty());
        assert_eq!(d.bus().steps(), 0);
    }

    #[test]
    fn setup_needs_controller() {
        let mut d = driver();
        assert_eq!(
            d.addressing_setup(&device_cfg(), Address::primary(1), Direction::Out),
            Err(DriverError::RoleViolation)
        );
        assert!(d.bus().peer.accepted.is_empty());
    }

    #[test]
    fn serial_poll() {
        let mut d = driver();
        d.bus_mut().peer.queue.push_back(Sourced::data(0x41));
        assert_eq!(d.read_status_byte(&cfg(), Address::primary(7)), Ok(0x41));
        assert_eq!(
            d.bus().accepted_commands(),
            vec![0x3f, 0x20, 0x18, 0x47, 0x19, 0x5f]
        );
    }

    #[test]
    fn serial_poll_stops_at_silent_device() {
        let mut d = driver();
        assert_eq!(
            d.read_status_byte(&cfg(), Address::new(7, Some(1))),
            Err(DriverError::HandshakeTimeout)
        );
        // No SPD or UNT after the failed read.
        assert_eq!(
            d.bus().accepted_commands(),
            vec![0x3f, 0x20, 0x18, 0x47, 0x61]
        );
    }

    #[test]
    fn interface_clear_pulse() {
        let mut d = driver();
        d.send_interface_clear(&cfg()).unwrap();
        assert_eq!(d.bus().ifc_pulses(), 1);
        assert_eq!(d.clock().delayed_us(), 150);
        assert_eq!(d.bus().drive_of(Lines::IFC), Drive::High);
    }

    #[test]
    fn interface_clear_refused_as_device() {
        let mut d = driver();
        assert_eq!(
            d.send_interface_clear(&device_cfg()),
            Err(DriverError::RoleViolation)
        );
        assert_eq!(d.bus().ifc_pulses(), 0);
    }

    #[test]
    fn group_trigger_continues_past_bad_address() {
        let mut d = driver();
        let addrs = [
            Address::primary(3),
            Address::primary(40),
            Address::new(4, Some(1)),
        ];
        let report = d.send_group_trigger(&cfg(), &addrs);
        assert_eq!(report.triggered, 2);
        assert_eq!(report.first_error, Some(DriverError::InvalidAddress));
        assert_eq!(
            d.bus().accepted_commands(),
            vec![0x40, 0x3f, 0x23, 0x08, 0x40, 0x3f, 0x24, 0x61, 0x08]
        );
    }

    #[test]
    fn group_trigger_uses_at_most_fifteen_addresses() {
        let mut d = driver();
        let addrs: Vec<Address> = (1..=20).map(Address::primary).collect();
        let report = d.send_group_trigger(&cfg(), &addrs);
        assert_eq!(report.triggered as usize, MAX_TRIGGER_ADDRESSES);
        assert_eq!(report.first_error, None);

        let commands = d.bus().accepted_commands();
        let gets = commands.iter().filter(|&&c| c == 0x08).count();
        assert_eq!(gets, MAX_TRIGGER_ADDRESSES);
        // The last LAD sent is for address 15.
        assert_eq!(commands[commands.len() - 2], 0x2f);
    }

    #[test]
    fn group_trigger_first_error_wins() {
        let mut d = driver();
        d.bus_mut().peer.never_ready = true;
        let report = d.send_group_trigger(&cfg(), &[Address::primary(1), Address::primary(0)]);
        assert_eq!(report.triggered, 0);
        assert_eq!(report.first_error, Some(DriverError::HandshakeTimeout));
        assert!(report.result().is_err());
    }
}
