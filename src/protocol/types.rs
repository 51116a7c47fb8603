//! This module contains general types used by the GPIB protocol code.

// Copyright (c) 2025 Piers Finlayson <piers@piers.rocks>
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

use super::driver::{DriverError, Result};
use crate::constants::{MAX_PAD, MAX_SAD, MIN_PAD, SAD_USER_OFFSET};

/// Which side of the bus the adapter is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    /// The adapter is a device, addressed by some other controller.
    Device,

    /// The adapter is the system controller.
    #[default]
    Controller,
}

impl Role {
    /// The value used by `++mode` and the config image.
    pub const fn as_u8(self) -> u8 {
        match self {
            Role::Device => 0,
            Role::Controller => 1,
        }
    }

    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Role::Device),
            1 => Some(Role::Controller),
            _ => None,
        }
    }

    pub const fn is_controller(self) -> bool {
        matches!(self, Role::Controller)
    }
}

/// End of string sequence appended to data sent to the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EosMode {
    #[default]
    CrLf,
    Cr,
    Lf,
    None,
}

impl EosMode {
    pub const fn as_u8(self) -> u8 {
        match self {
            EosMode::CrLf => 0,
            EosMode::Cr => 1,
            EosMode::Lf => 2,
            EosMode::None => 3,
        }
    }

    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(EosMode::CrLf),
            1 => Some(EosMode::Cr),
            2 => Some(EosMode::Lf),
            3 => Some(EosMode::None),
            _ => None,
        }
    }

    /// The bytes to append.
    pub const fn bytes(self) -> &'static [u8] {
        match self {
            EosMode::CrLf => b"\r\n",
            EosMode::Cr => b"\r",
            EosMode::Lf => b"\n",
            EosMode::None => b"",
        }
    }
}

/// When to stop receiving a message.  A timeout always stops it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReadMode {
    /// Keep going until the talker stops.
    UntilTimeout,

    /// Stop after a byte sent with EOI.
    UntilEoi,

    /// Stop after this byte.
    UntilChar(u8),
}

/// Why a message receive stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReadEnd {
    Timeout,
    Eoi,
    Char,
}

/// Summary of a message receive.  The bytes themselves have already been
/// forwarded to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReadOutcome {
    pub bytes: u16,
    pub end: ReadEnd,
}

/// Direction of a controller addressing setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// From the device to the controller - RECEIVE SETUP.
    In,

    /// From the controller to the device - SEND SETUP.
    Out,
}

/// A device's bus address.  There is no range checking on construction -
/// use [`Address::validate`] before putting one on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Address {
    /// Primary address, 1-30.
    pub pad: u8,

    /// Secondary address, 0-30, if the device uses one.
    pub sad: Option<u8>,
}

impl Address {
    pub const fn new(pad: u8, sad: Option<u8>) -> Self {
        Self { pad, sad }
    }

    pub const fn primary(pad: u8) -> Self {
        Self { pad, sad: None }
    }

    /// Checks the address can be used on the bus.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_PAD..=MAX_PAD).contains(&self.pad) {
            return Err(DriverError::InvalidAddress);
        }
        match self.sad {
            Some(sad) if sad > MAX_SAD => Err(DriverError::InvalidAddress),
            _ => Ok(()),
        }
    }

    /// The secondary address as the user types it, 96-126.
    pub fn user_sad(&self) -> Option<u8> {
        self.sad.map(|sad| sad.saturating_add(SAD_USER_OFFSET))
    }
}
