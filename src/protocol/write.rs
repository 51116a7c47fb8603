//! This file implements sending bytes to the bus, as commands (under ATN) or
//! as data.

// Copyright (c) 2025 Piers Finlayson <piers@piers.rocks>
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

#[allow(unused_imports)]
use crate::util::log::{debug, error, info, trace, warn};

use super::bus::GpibBus;
use super::command::BusCommand;
use super::driver::{DriverError, Result};
use super::gpib::GpibDriver;
use super::types::EosMode;
use crate::config::Config;
use crate::util::time::Clock;

impl<B: GpibBus, C: Clock> GpibDriver<B, C> {
    /// Sends a run of bytes.
    ///
    /// - `command` - send under ATN.  Only the controller may do this.  EOI
    ///   is never asserted with commands.
    /// - `use_eoi` - assert EOI with the last byte.
    ///
    /// Stops at the first byte to fail.  An empty run sends nothing and
    /// doesn't touch the bus.
    pub fn send(&mut self, cfg: &Config, bytes: &[u8], command: bool, use_eoi: bool) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        if command && !cfg.mode.is_controller() {
            debug!("Refusing to send command bytes as device");
            return Err(DriverError::RoleViolation);
        }
        let use_eoi = use_eoi && !command;

        self.begin_send(cfg.mode, command);

        let last = bytes.len() - 1;
        for (ii, &byte) in bytes.iter().enumerate() {
            self.send_byte(byte, use_eoi && ii == last, cfg.timeout())
                .inspect_err(|e| debug!("Send failed at byte {} of {}: {}", ii, bytes.len(), e))?;
        }

        trace!(
            "Sent {} {} bytes",
            bytes.len(),
            if command { "command" } else { "data" }
        );
        Ok(())
    }

    /// Sends a single command byte.
    pub fn send_command(&mut self, cfg: &Config, command: BusCommand) -> Result<()> {
        self.send(cfg, &[command.to_byte()], true, false)
    }

    /// Sends a data message, followed by the configured EOS sequence.  If EOI
    /// is used it goes with the last byte of the whole message, which is the
    /// last EOS byte if there is one.
    pub fn send_data(&mut self, cfg: &Config, data: &[u8], use_eoi: bool) -> Result<()> {
        if cfg.eos == EosMode::None {
            return self.send(cfg, data, false, use_eoi);
        }
        self.send(cfg, data, false, false)?;
        self.send(cfg, cfg.eos.bytes(), false, use_eoi)
    }
}
