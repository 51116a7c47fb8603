//! Device role - the adapter is addressed by another controller.
//!
//! [`GpibDriver::device_poll`] is called once per main loop iteration.  It
//! never waits for the controller to do anything: if there is nothing on
//! the bus it returns straight away.
//!
//! Listening and talking are tracked as flags rather than a single state, as
//! is serial poll, which may be armed in either.  Addressing this adapter to
//! listen unaddresses it as a talker and vice versa.

// Copyright (c) 2025 Piers Finlayson <piers@piers.rocks>
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

#[allow(unused_imports)]
use crate::util::log::{debug, error, info, trace, warn};

use super::bus::{GpibBus, Lines};
use super::command::BusCommand;
use super::driver::Result;
use super::gpib::GpibDriver;
use super::types::{ReadMode, ReadOutcome};
use crate::config::Config;
use crate::link::{LinkWriter, eot_write};
use crate::util::time::Clock;

/// Bit in the status byte which requests service.
pub const STATUS_RQS: u8 = 0x40;

/// What the controller has told this adapter to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceState {
    pub listening: bool,
    pub talking: bool,
    pub serial_poll: bool,

    /// Sent in response to the next serial poll.
    pub status_byte: u8,
}

impl DeviceState {
    pub const fn new() -> Self {
        Self {
            listening: false,
            talking: false,
            serial_poll: false,
            status_byte: 0,
        }
    }

    /// Back to idle, unaddressed, with a clear status byte.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Something which happened during a device or listen-only poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceEvent {
    /// IFC is asserted.  Reported on every poll for as long as it is.
    InterfaceClear,

    /// A command byte was received under ATN.
    Command(BusCommand),

    /// A serial poll was answered, or the attempt to answer failed.
    StatusByte(Result<u8>),

    /// A data message was received and forwarded to the host.
    DataReceived(ReadOutcome),
}

impl<B: GpibBus, C: Clock> GpibDriver<B, C> {
    /// Runs one pass of the device role.
    ///
    /// - IFC asserted resets everything, before anything else is looked at.
    /// - ATN asserted - if the controller is sending a command byte, it is
    ///   received and acted on.
    /// - ATN released - talk or listen, as addressed.  An armed serial poll
    ///   is answered with exactly one status byte.
    pub fn device_poll<L: LinkWriter + ?Sized>(
        &mut self,
        cfg: &Config,
        state: &mut DeviceState,
        link: &mut L,
    ) -> Option<DeviceEvent> {
        if self.bus.is_low(Lines::IFC) {
            if *state != DeviceState::new() {
                debug!("IFC asserted, resetting device state");
            }
            self.reset_device(state);
            return Some(DeviceEvent::InterfaceClear);
        }

        if self.bus.is_low(Lines::ATN) {
            self.configure_listen(cfg.mode);

            // Controller hasn't sent anything yet.
            if self.bus.is_high(Lines::DAV) {
                return None;
            }

            let (byte, _eoi) = self
                .receive_byte(cfg.mode, cfg.timeout())
                .inspect_err(|e| debug!("Failed to receive command byte: {}", e))
                .ok()?;
            let command = BusCommand::from_byte(byte);
            self.handle_bus_command(cfg, state, command, link);
            return Some(DeviceEvent::Command(command));
        }

        if state.talking {
            self.begin_send(cfg.mode, false);
        } else if state.listening {
            self.configure_listen(cfg.mode);
        }

        let mut event = None;

        if state.talking && state.serial_poll {
            let status = state.status_byte;
            let result = self.send(cfg, &[status], false, false);

            // Only ever one byte per SPE.
            state.status_byte = 0;
            state.serial_poll = false;
            self.bus.drive_high(Lines::SRQ);

            debug!("Serial polled, status byte 0x{:02x}", status);
            event = Some(DeviceEvent::StatusByte(result.map(|()| status)));
        }

        if state.listening && self.bus.is_low(Lines::DAV) {
            let outcome = self.receive_message(cfg, ReadMode::UntilEoi, link);
            event = Some(DeviceEvent::DataReceived(outcome));
        }

        event
    }

    /// Sets the byte returned by the next serial poll.  If it has the RQS bit
    /// set service is requested by asserting SRQ, otherwise SRQ is released.
    pub fn set_status_byte(&mut self, state: &mut DeviceState, status: u8) {
        state.status_byte = status;
        if status & STATUS_RQS != 0 {
            self.bus.drive_low(Lines::SRQ);
        } else {
            self.bus.drive_high(Lines::SRQ);
        }
    }

    fn reset_device(&mut self, state: &mut DeviceState) {
        state.reset();
        self.bus.drive_high(Lines::SRQ);
    }

    fn handle_bus_command<L: LinkWriter + ?Sized>(
        &mut self,
        cfg: &Config,
        state: &mut DeviceState,
        command: BusCommand,
        link: &mut L,
    ) {
        trace!("Bus command {:?}", command);

        match command {
            BusCommand::Gtl | BusCommand::Get | BusCommand::Llo if state.listening => {
                Self::notify(cfg, command, link);
            }
            BusCommand::Sdc if state.listening => {
                Self::notify(cfg, command, link);
                self.reset_device(state);
            }
            BusCommand::Dcl => {
                Self::notify(cfg, command, link);
                self.reset_device(state);
            }
            BusCommand::Spe => state.serial_poll = true,
            BusCommand::Spd => state.serial_poll = false,
            BusCommand::Listen(pad) => {
                if pad == cfg.pad {
                    state.listening = true;
                    state.talking = false;
                }
            }
            BusCommand::Talk(pad) => {
                if pad == cfg.pad {
                    state.talking = true;
                    state.listening = false;
                } else {
                    // Another device is now the talker.
                    state.talking = false;
                }
            }
            BusCommand::Unlisten => state.listening = false,
            BusCommand::Untalk => state.talking = false,
            _ => {}
        }
    }

    fn notify<L: LinkWriter + ?Sized>(cfg: &Config, command: BusCommand, link: &mut L) {
        if let Some(name) = command.name() {
            eot_write(link, cfg.eot(), format_args!("{}", name));
        }
    }
}
