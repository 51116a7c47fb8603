//! This module implements the Protocol handler, which takes records framed
//! from the host link, actions them on the GPIB bus, and returns anything
//! received from the bus to the host.
//!
//! The handler is the single owner of the bus and of the device role state.
//! It is driven by calling [`ProtocolHandler::run_once`] in a loop.  Each
//! call handles at most one record, then, in the device role, polls the bus
//! once.  Nothing blocks for longer than the configured handshake timeout.

// Copyright (c) 2025 Piers Finlayson <piers@piers.rocks>
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

pub mod bus;
pub mod command;
mod controller;
mod device;
mod driver;
mod gpib;
mod listen_only;
mod read;
pub mod types;
mod write;

pub use bus::{GpibBus, Lines};
pub use command::BusCommand;
pub use controller::TriggerReport;
pub use device::{DeviceEvent, DeviceState, STATUS_RQS};
pub use driver::{DriverError, Result};
pub use gpib::GpibDriver;
pub use types::{Address, Direction, EosMode, ReadEnd, ReadMode, ReadOutcome, Role};

#[allow(unused_imports)]
use crate::util::log::{debug, error, info, trace, warn};

use crate::commands::Command;
use crate::config::{Config, ConfigStore};
use crate::link::{Consumer, LinkWriter, RecordBuf, eot_write};
use crate::util::time::Clock;

/// What the caller of [`ProtocolHandler::run_once`] should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LoopOutcome {
    /// Call again.
    Continue,

    /// The host asked for the adapter to be reset.
    Reset,
}

/// See the module documentation.
pub struct ProtocolHandler<B: GpibBus, C: Clock> {
    pub(crate) driver: GpibDriver<B, C>,
    pub(crate) device: DeviceState,

    // Last record popped from the ring.
    record: RecordBuf,
}

impl<B: GpibBus, C: Clock> ProtocolHandler<B, C> {
    pub fn new(bus: B, clock: C) -> Self {
        Self {
            driver: GpibDriver::new(bus, clock),
            device: DeviceState::new(),
            record: RecordBuf::new(),
        }
    }

    /// Brings the bus up in the configured role.  As controller, IFC is sent
    /// so every device starts out unaddressed.
    pub fn boot(&mut self, cfg: &Config) {
        info!("Starting as {:?}", cfg.mode);
        self.driver.init_pins(cfg.mode);
        if cfg.mode.is_controller() {
            // Can't fail, we're the controller.
            let _ = self.driver.send_interface_clear(cfg);
        }
    }

    pub fn driver(&self) -> &GpibDriver<B, C> {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut GpibDriver<B, C> {
        &mut self.driver
    }

    pub fn device_state(&self) -> &DeviceState {
        &self.device
    }

    /// Handles at most one record from the host, then in the device role
    /// polls the bus.
    pub fn run_once<S, L>(
        &mut self,
        records: &mut Consumer<'_>,
        cfg: &mut Config,
        store: &mut S,
        link: &mut L,
    ) -> LoopOutcome
    where
        S: ConfigStore + ?Sized,
        L: LinkWriter + ?Sized,
    {
        let mut outcome = LoopOutcome::Continue;

        if records.pop_record(&mut self.record) {
            if self.record.is_command() {
                outcome = match Command::parse(self.record.payload()) {
                    Some(command) => self.execute(command, cfg, store, link),
                    None => {
                        debug!("Unrecognized command");
                        Self::report_text(cfg, link, "Unrecognized command.");
                        LoopOutcome::Continue
                    }
                };
            } else {
                self.handle_data(cfg, link);
            }
        }

        if !cfg.mode.is_controller() {
            if cfg.listen_only {
                self.driver.listen_only_poll(cfg, &mut self.device, link);
            } else {
                self.driver.device_poll(cfg, &mut self.device, link);
            }
        }

        outcome
    }

    // Sends a data record to the bus.
    fn handle_data<L: LinkWriter + ?Sized>(&mut self, cfg: &Config, link: &mut L) {
        let data = self.record.payload();

        if cfg.mode.is_controller() {
            let result = Self::send_to_device(&mut self.driver, cfg, data, link);
            Self::report(cfg, link, result);
            return;
        }

        // Only when addressed to talk, and not mid serial poll or command.
        let device = &self.device;
        if device.talking && !device.serial_poll && !self.driver.is_asserted(Lines::ATN) {
            let result = self.driver.send_data(cfg, data, cfg.use_eoi);
            Self::report(cfg, link, result);
        } else {
            trace!("Dropping {} data bytes, not addressed to talk", data.len());
        }
    }

    fn send_to_device<L: LinkWriter + ?Sized>(
        driver: &mut GpibDriver<B, C>,
        cfg: &Config,
        data: &[u8],
        link: &mut L,
    ) -> Result<()> {
        let addr = cfg.address();
        driver.addressing_setup(cfg, addr, Direction::Out)?;
        driver.send_data(cfg, data, cfg.use_eoi)?;

        if cfg.auto_read {
            driver.addressing_setup(cfg, addr, Direction::In)?;
            driver.receive_message(cfg, ReadMode::UntilEoi, link);
        }
        Ok(())
    }

    /// Switches role.  Does nothing if `role` is the current one.
    pub fn change_role<S: ConfigStore + ?Sized>(&mut self, cfg: &mut Config, store: &mut S, role: Role) {
        if cfg.mode == role {
            return;
        }

        info!("Changing role from {:?} to {:?}", cfg.mode, role);
        cfg.mode = role;
        cfg.listen_only = false;
        self.device.reset();
        self.driver.init_pins(role);

        // cfg.mode is already the controller, so this can't be refused.
        if role.is_controller() {
            if let Err(e) = self.driver.send_interface_clear(cfg) {
                warn!("Interface clear after role change failed: {}", e);
            }
        }

        cfg.changed(store);
    }

    /// Tells the host about a failure, if it has asked to be told.
    pub(crate) fn report<L: LinkWriter + ?Sized, T>(cfg: &Config, link: &mut L, result: Result<T>) {
        if let Err(e) = result {
            debug!("Operation failed: {}", e);
            if cfg.debug {
                eot_write(link, cfg.eot(), format_args!("{}", e));
            }
        }
    }

    pub(crate) fn report_text<L: LinkWriter + ?Sized>(cfg: &Config, link: &mut L, text: &str) {
        if cfg.debug {
            eot_write(link, cfg.eot(), format_args!("{}", text));
        }
    }
}
