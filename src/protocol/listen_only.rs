//! Listen-only mode, a variant of the device role which receives everything
//! on the bus whether or not this adapter is addressed.  Commands are
//! reported to the host rather than acted on.  Nothing is ever sent.

// Copyright (c) 2025 Piers Finlayson <piers@piers.rocks>
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

#[allow(unused_imports)]
use crate::util::log::{debug, error, info, trace, warn};

use super::bus::{GpibBus, Lines};
use super::command::BusCommand;
use super::device::{DeviceEvent, DeviceState};
use super::gpib::GpibDriver;
use super::types::ReadMode;
use crate::config::Config;
use crate::link::{LinkWriter, eot_write};
use crate::util::time::Clock;

impl<B: GpibBus, C: Clock> GpibDriver<B, C> {
    /// Runs one pass of listen-only mode.
    pub fn listen_only_poll<L: LinkWriter + ?Sized>(
        &mut self,
        cfg: &Config,
        state: &mut DeviceState,
        link: &mut L,
    ) -> Option<DeviceEvent> {
        // Addressing means nothing here.  The status byte is kept, for when
        // listen-only is turned off again.
        state.listening = false;
        state.talking = false;
        state.serial_poll = false;

        self.configure_listen(cfg.mode);

        if self.bus.is_low(Lines::ATN) {
            if self.bus.is_high(Lines::DAV) {
                return None;
            }

            let (byte, _eoi) = self.receive_byte(cfg.mode, cfg.timeout()).ok()?;
            let command = BusCommand::from_byte(byte);
            match command.name() {
                Some(name) => eot_write(link, cfg.eot(), format_args!("{} (0x{:x})", name, byte)),
                None => eot_write(link, cfg.eot(), format_args!("GPIB_COMMAND (0x{:x})", byte)),
            }
            Some(DeviceEvent::Command(command))
        } else if self.bus.is_low(Lines::DAV) {
            let outcome = self.receive_message(cfg, ReadMode::UntilEoi, link);
            Some(DeviceEvent::DataReceived(outcome))
        } else {
            None
        }
    }
}
